// crates/afu9-server/src/snapshot.rs
// ============================================================================
// Module: Deploy Status Snapshots
// Description: Periodic environment health snapshots with a short TTL cache.
// Purpose: Derive GREEN/YELLOW/RED deterministically from stored deploy events.
// Dependencies: afu9-core, serde_json
// ============================================================================

//! ## Overview
//! Deploy health is a deterministic function of the newest stored deploy
//! events for an environment. Snapshots are cached per environment with a
//! short TTL; `staleness_seconds` reports the cache age so consumers can
//! reason about freshness.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::json;

use afu9_core::DeployEvent;
use afu9_core::DeployHealth;
use afu9_core::DeployStatusSnapshot;
use afu9_core::OperationalStore;
use afu9_core::SnapshotReason;
use afu9_core::StoreError;
use afu9_core::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Snapshot cache TTL in milliseconds.
const SNAPSHOT_TTL_MS: i64 = 15_000;

/// Deploy events considered per snapshot.
const SNAPSHOT_WINDOW: u32 = 20;

// ============================================================================
// SECTION: Computation
// ============================================================================

/// Computes a snapshot from the newest deploy events (newest first).
#[must_use]
pub fn compute_snapshot(env: &str, events: &[DeployEvent], now: Timestamp) -> DeployStatusSnapshot {
    let mut reasons = Vec::new();
    let status = match events.first() {
        None => {
            reasons.push(SnapshotReason {
                code: "NO_DEPLOY_EVENTS".to_string(),
                severity: "warning".to_string(),
                message: format!("no deploy events recorded for {env}"),
                evidence: json!(null),
            });
            DeployHealth::Yellow
        }
        Some(latest) => match latest.status.as_str() {
            "succeeded" => DeployHealth::Green,
            "failed" => {
                reasons.push(SnapshotReason {
                    code: "LAST_DEPLOY_FAILED".to_string(),
                    severity: "critical".to_string(),
                    message: format!(
                        "last deploy of {} version {} failed",
                        latest.service, latest.version
                    ),
                    evidence: json!({ "deployId": latest.id, "commitHash": latest.commit_hash }),
                });
                DeployHealth::Red
            }
            other => {
                reasons.push(SnapshotReason {
                    code: "DEPLOY_IN_FLIGHT".to_string(),
                    severity: "info".to_string(),
                    message: format!("deploy of {} is {other}", latest.service),
                    evidence: json!({ "deployId": latest.id }),
                });
                DeployHealth::Yellow
            }
        },
    };
    let failed_in_window =
        events.iter().filter(|event| event.status == "failed").count();
    DeployStatusSnapshot {
        env: env.to_string(),
        status,
        reasons,
        signals: json!({
            "eventCount": events.len(),
            "failedInWindow": failed_in_window,
            "lastStatus": events.first().map(|event| event.status.clone()),
        }),
        observed_at: now,
        correlation_id: None,
    }
}

// ============================================================================
// SECTION: TTL Cache
// ============================================================================

/// Cached snapshot entry.
struct CacheEntry {
    /// Cached snapshot.
    snapshot: DeployStatusSnapshot,
}

/// Per-environment snapshot cache with a short TTL.
pub struct SnapshotCache {
    /// Operational store supplying deploy events.
    operational: Arc<dyn OperationalStore>,
    /// Cache entries keyed by environment.
    entries: Mutex<HashMap<String, CacheEntry>>,
}

/// Snapshot plus its cache age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotWithAge {
    /// The snapshot (possibly cached).
    pub snapshot: DeployStatusSnapshot,
    /// Seconds since the snapshot was observed.
    pub staleness_seconds: i64,
}

impl SnapshotCache {
    /// Creates a cache over an operational store.
    #[must_use]
    pub fn new(operational: Arc<dyn OperationalStore>) -> Self {
        Self {
            operational,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the snapshot for an environment, recomputing past the TTL.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the deploy event query fails.
    pub fn snapshot_for(&self, env: &str, now: Timestamp) -> Result<SnapshotWithAge, StoreError> {
        if let Ok(entries) = self.entries.lock()
            && let Some(entry) = entries.get(env)
            && now.millis_since(entry.snapshot.observed_at) < SNAPSHOT_TTL_MS
        {
            return Ok(SnapshotWithAge {
                staleness_seconds: now.millis_since(entry.snapshot.observed_at) / 1_000,
                snapshot: entry.snapshot.clone(),
            });
        }
        let events = self.operational.recent_deploy_events(env, SNAPSHOT_WINDOW)?;
        let snapshot = compute_snapshot(env, &events, now);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                env.to_string(),
                CacheEntry {
                    snapshot: snapshot.clone(),
                },
            );
        }
        Ok(SnapshotWithAge {
            snapshot,
            staleness_seconds: 0,
        })
    }
}
