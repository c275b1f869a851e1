// crates/afu9-sync/src/job.rs
// ============================================================================
// Module: Sync Sweep Runner
// Description: Periodic sweep over open Issues with bounded fan-out.
// Purpose: Reconcile every linked Issue; per-issue failures never abort the run.
// Dependencies: afu9-core, crate::engine, serde
// ============================================================================

//! ## Overview
//! The sweep is a plain periodic driver, not a durable queue: each tick walks
//! every Forge-linked open Issue, syncing each inside its own isolation
//! boundary. The engine's idempotency makes at-least-once execution
//! sufficient. Worker threads are bounded by the configured fan-out; there is
//! no inter-Issue ordering guarantee.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;

use serde::Deserialize;
use serde::Serialize;

use afu9_core::IssueId;
use afu9_core::Timestamp;

use crate::engine::SyncEngine;
use crate::engine::SyncOptions;

// ============================================================================
// SECTION: Sweep Types
// ============================================================================

/// One Issue scheduled for a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepTarget {
    /// Local Issue identifier.
    pub issue_id: IssueId,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Forge issue number.
    pub forge_issue_number: i64,
}

/// Aggregate result of one sweep tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SweepSummary {
    /// Issues synced (written or confirmed converged).
    pub synced_issues: u64,
    /// Issues whose sync raised an error.
    pub failed_issues: u64,
    /// Conflicts persisted during the sweep.
    pub conflicts_detected: u64,
    /// Transitions blocked by the state graph.
    pub transitions_blocked: u64,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Sweep runner over a shared sync engine.
pub struct SyncJobRunner {
    /// Shared engine.
    engine: Arc<SyncEngine>,
    /// Maximum concurrent per-issue tasks.
    fan_out: usize,
}

impl SyncJobRunner {
    /// Creates a runner with a bounded fan-out (minimum one worker).
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>, fan_out: usize) -> Self {
        Self {
            engine,
            fan_out: fan_out.max(1),
        }
    }

    /// Sweeps all targets; per-issue failures are counted, never propagated.
    #[must_use]
    pub fn run_sweep(
        &self,
        targets: Vec<SweepTarget>,
        opts: &SyncOptions,
        now: Timestamp,
    ) -> SweepSummary {
        let queue = Mutex::new(targets.into_iter().collect::<VecDeque<_>>());
        let summary = Mutex::new(SweepSummary::default());
        let workers = self.fan_out;

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let target = {
                            let Ok(mut queue) = queue.lock() else {
                                return;
                            };
                            queue.pop_front()
                        };
                        let Some(target) = target else {
                            return;
                        };
                        let result = self.engine.sync_forge_to_local(
                            &target.issue_id,
                            &target.owner,
                            &target.repo,
                            target.forge_issue_number,
                            opts,
                            now,
                        );
                        let Ok(mut summary) = summary.lock() else {
                            return;
                        };
                        match result {
                            Ok(outcome) => {
                                match outcome.conflict {
                                    Some(crate::engine::ConflictType::TransitionNotAllowed) => {
                                        summary.conflicts_detected += 1;
                                        summary.transitions_blocked += 1;
                                    }
                                    Some(_) => summary.conflicts_detected += 1,
                                    None => summary.synced_issues += 1,
                                }
                            }
                            Err(_) => summary.failed_issues += 1,
                        }
                    }
                });
            }
        });

        summary.into_inner().unwrap_or_default()
    }
}
