// crates/afu9-sync/src/engine.rs
// ============================================================================
// Module: Bidirectional Sync Engine
// Description: Deterministic, idempotent reconciliation between local and Forge state.
// Purpose: Validate every sync against the state machine; conflicts persist, never auto-resolve.
// Dependencies: afu9-core, crate::{classify, forge}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Both sync directions default to dry-run. Forge→local derives a target
//! status from PR evidence, validates it against the state graph, checks
//! evidence preconditions and the manual-override flag, and only then writes.
//! Every decision produces a [`SyncAuditEvent`] whose hash buckets timestamps
//! into five-minute windows, so re-deliveries and periodic sweeps deduplicate.
//! Conflicts are persisted and surface to operators; the engine never resolves
//! them on its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use afu9_core::Actor;
use afu9_core::IssueId;
use afu9_core::IssueEventType;
use afu9_core::IssuePatch;
use afu9_core::IssueStore;
use afu9_core::LocalStatus;
use afu9_core::OperationalStore;
use afu9_core::StoreError;
use afu9_core::Timestamp;
use afu9_core::VerificationStatus;
use afu9_core::hashing::HashError;
use afu9_core::hashing::sha256_hex_canonical;
use afu9_core::is_valid;

use crate::classify::PullRequestEvidence;
use crate::classify::determine_target_status;
use crate::classify::extract_mirror_status;
use crate::classify::status_label_diff;
use crate::forge::ForgeClient;
use crate::forge::ForgeError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Idempotency bucket width for audit event hashes, in seconds.
pub const AUDIT_BUCKET_SECONDS: i64 = 300;

// ============================================================================
// SECTION: Audit and Conflict Rows
// ============================================================================

/// Direction of a sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Forge state reconciled into the local store.
    ForgeToLocal,
    /// Local state mirrored out to the Forge.
    LocalToForge,
}

/// Conflict classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Local and Forge disagree without a valid reconciliation.
    StateDivergence,
    /// Derived target is not reachable in the state graph.
    TransitionNotAllowed,
    /// Transition preconditions are unmet.
    PreconditionFailed,
    /// Required evidence is missing.
    EvidenceMissing,
    /// Manual override blocked the automated write.
    ManualOverrideBlocked,
}

/// Persisted sync conflict.
///
/// # Invariants
/// - Conflicts are never auto-resolved; `resolved_at` is set by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Issue in conflict.
    pub issue_id: IssueId,
    /// Conflict classification.
    pub conflict_type: ConflictType,
    /// Human-readable description.
    pub description: String,
    /// Detection timestamp.
    pub detected_at: Timestamp,
    /// Resolution timestamp, when resolved by an operator.
    pub resolved_at: Option<Timestamp>,
    /// Operator resolution notes.
    pub resolution_notes: Option<String>,
}

/// Audit row for one sync decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAuditEvent {
    /// Event type label (e.g. `sync_applied`, `sync_conflict`).
    pub event_type: String,
    /// Sync direction.
    pub direction: SyncDirection,
    /// Issue the event concerns.
    pub issue_id: IssueId,
    /// Forge issue number, when linked.
    pub forge_issue_number: Option<i64>,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// Structured payload.
    pub payload: Value,
    /// Deduplication hash over the five-minute bucket.
    pub event_hash: String,
}

/// Computes the bucketed deduplication hash for an audit event.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn compute_event_hash(
    event_type: &str,
    issue_id: &IssueId,
    forge_issue_number: Option<i64>,
    timestamp: Timestamp,
    payload: &Value,
) -> Result<String, HashError> {
    sha256_hex_canonical(&json!({
        "eventType": event_type,
        "issueId": issue_id.as_str(),
        "forgeIssueNumber": forge_issue_number,
        "bucket": timestamp.bucket(AUDIT_BUCKET_SECONDS),
        "payload": payload,
    }))
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Errors raised by sync audit stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncStoreError {
    /// Underlying store failure.
    #[error("sync audit store error: {0}")]
    Store(String),
}

/// Store for sync audit events and conflicts.
pub trait SyncAuditStore: Send + Sync {
    /// Records an audit event; duplicate hashes inside the bucket are
    /// swallowed. Returns `true` when the row was new.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStoreError`] when persistence fails.
    fn record_audit(&self, event: &SyncAuditEvent) -> Result<bool, SyncStoreError>;

    /// Persists a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStoreError`] when persistence fails.
    fn record_conflict(&self, conflict: &SyncConflict) -> Result<(), SyncStoreError>;

    /// Returns conflicts for an Issue in detection order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStoreError`] when the query fails.
    fn conflicts_for(&self, issue_id: &IssueId) -> Result<Vec<SyncConflict>, SyncStoreError>;
}

/// Mutex-guarded in-memory sync audit store.
#[derive(Debug, Default)]
pub struct InMemorySyncAuditStore {
    /// Audit rows in insertion order.
    audits: Mutex<Vec<SyncAuditEvent>>,
    /// Conflict rows in insertion order.
    conflicts: Mutex<Vec<SyncConflict>>,
}

impl InMemorySyncAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all audit rows.
    ///
    /// # Errors
    ///
    /// Returns [`SyncStoreError`] when the store mutex is poisoned.
    pub fn audits(&self) -> Result<Vec<SyncAuditEvent>, SyncStoreError> {
        let audits = self
            .audits
            .lock()
            .map_err(|_| SyncStoreError::Store("sync audit store poisoned".to_string()))?;
        Ok(audits.clone())
    }
}

impl SyncAuditStore for InMemorySyncAuditStore {
    fn record_audit(&self, event: &SyncAuditEvent) -> Result<bool, SyncStoreError> {
        let mut audits = self
            .audits
            .lock()
            .map_err(|_| SyncStoreError::Store("sync audit store poisoned".to_string()))?;
        if audits.iter().any(|existing| existing.event_hash == event.event_hash) {
            return Ok(false);
        }
        audits.push(event.clone());
        Ok(true)
    }

    fn record_conflict(&self, conflict: &SyncConflict) -> Result<(), SyncStoreError> {
        let mut conflicts = self
            .conflicts
            .lock()
            .map_err(|_| SyncStoreError::Store("sync audit store poisoned".to_string()))?;
        conflicts.push(conflict.clone());
        Ok(())
    }

    fn conflicts_for(&self, issue_id: &IssueId) -> Result<Vec<SyncConflict>, SyncStoreError> {
        let conflicts = self
            .conflicts
            .lock()
            .map_err(|_| SyncStoreError::Store("sync audit store poisoned".to_string()))?;
        Ok(conflicts
            .iter()
            .filter(|conflict| conflict.issue_id == *issue_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Engine Types
// ============================================================================

/// Options controlling a sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// When true (the default), nothing is written.
    pub dry_run: bool,
    /// Permits syncing Issues whose `execution_override` flag is set.
    pub allow_manual_override: bool,
    /// Actor recorded on events.
    pub actor: Actor,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            allow_manual_override: false,
            actor: Actor::system(),
        }
    }
}

/// Result of one sync call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Issue synced.
    pub issue_id: IssueId,
    /// Status before the sync.
    pub from_status: LocalStatus,
    /// Derived target, when the evidence produced an opinion.
    pub target_status: Option<LocalStatus>,
    /// True when the Issue was actually written.
    pub applied: bool,
    /// True when the call ran in dry-run mode.
    pub dry_run: bool,
    /// Conflict classification, when one was detected.
    pub conflict: Option<ConflictType>,
}

/// Errors raised by sync calls.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Issue does not exist locally.
    #[error("issue not found: {0}")]
    IssueNotFound(IssueId),
    /// Forge client failure.
    #[error(transparent)]
    Forge(#[from] ForgeError),
    /// Issue store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Audit store failure.
    #[error(transparent)]
    Audit(#[from] SyncStoreError),
    /// Canonical hashing failure.
    #[error(transparent)]
    Hash(#[from] HashError),
}

// ============================================================================
// SECTION: Sync Engine
// ============================================================================

/// Bidirectional sync engine over the issue store and a guarded Forge client.
pub struct SyncEngine {
    /// Local issue store.
    issues: Arc<dyn IssueStore>,
    /// Operational store for evidence preconditions.
    operational: Arc<dyn OperationalStore>,
    /// Audit and conflict store.
    audit: Arc<dyn SyncAuditStore>,
    /// Access-guarded Forge client.
    forge: Arc<dyn ForgeClient>,
}

impl SyncEngine {
    /// Creates a sync engine.
    #[must_use]
    pub fn new(
        issues: Arc<dyn IssueStore>,
        operational: Arc<dyn OperationalStore>,
        audit: Arc<dyn SyncAuditStore>,
        forge: Arc<dyn ForgeClient>,
    ) -> Self {
        Self {
            issues,
            operational,
            audit,
            forge,
        }
    }

    /// Reconciles Forge state into the local Issue.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on store or Forge failures; detected conflicts
    /// are not errors and are reported in the outcome.
    pub fn sync_forge_to_local(
        &self,
        issue_id: &IssueId,
        owner: &str,
        repo: &str,
        forge_issue_number: i64,
        opts: &SyncOptions,
        now: Timestamp,
    ) -> Result<SyncOutcome, SyncError> {
        let issue = self
            .issues
            .get_issue(issue_id)?
            .ok_or_else(|| SyncError::IssueNotFound(issue_id.clone()))?;

        let snapshot = self.forge.issue(owner, repo, forge_issue_number)?;
        let evidence = self.collect_pr_evidence(owner, repo, issue.forge.pr_number)?;
        let mirror =
            extract_mirror_status(snapshot.project_status.as_deref(), &snapshot.labels, &snapshot.state);
        let target = determine_target_status(&evidence, mirror);

        let base_payload = json!({
            "mirror": mirror,
            "target": target,
            "from": issue.local_status,
            "dryRun": opts.dry_run,
        });

        // No opinion, or already converged: record the sweep and stop.
        let Some(target) = target else {
            self.record_audit_event(
                "sync_noop",
                SyncDirection::ForgeToLocal,
                issue_id,
                Some(forge_issue_number),
                base_payload,
                now,
            )?;
            return Ok(outcome(&issue, None, false, opts, None));
        };
        if target == issue.local_status {
            self.record_audit_event(
                "sync_noop",
                SyncDirection::ForgeToLocal,
                issue_id,
                Some(forge_issue_number),
                base_payload,
                now,
            )?;
            return Ok(outcome(&issue, Some(target), false, opts, None));
        }

        // Transition must exist in the state graph.
        if !is_valid(issue.local_status, target) {
            return self.conflict(
                &issue,
                forge_issue_number,
                ConflictType::TransitionNotAllowed,
                format!(
                    "forge state implies {target} but {} cannot reach it",
                    issue.local_status
                ),
                Some(target),
                opts,
                now,
            );
        }

        // Evidence preconditions. VERIFIED always demands a passed
        // verification report; DONE demands one too unless the PR merge state
        // itself is the completion evidence.
        let via_merged_pr =
            evidence.pull_request.as_ref().is_some_and(|pr| pr.merged);
        let needs_report = target == LocalStatus::Verified
            || (target == LocalStatus::Done && !via_merged_pr);
        if needs_report {
            let report = self.operational.latest_verification_for_issue(issue_id)?;
            match report {
                Some(report) if report.status == VerificationStatus::Pass => {}
                Some(_) => {
                    return self.conflict(
                        &issue,
                        forge_issue_number,
                        ConflictType::PreconditionFailed,
                        format!("{target} requires a passed verification report; latest did not pass"),
                        Some(target),
                        opts,
                        now,
                    );
                }
                None => {
                    return self.conflict(
                        &issue,
                        forge_issue_number,
                        ConflictType::EvidenceMissing,
                        format!("{target} requires a passed verification report hash"),
                        Some(target),
                        opts,
                        now,
                    );
                }
            }
        }

        // Manual override blocks automated writes unless explicitly allowed.
        if issue.execution_override && !opts.allow_manual_override {
            return self.conflict(
                &issue,
                forge_issue_number,
                ConflictType::ManualOverrideBlocked,
                "execution override is set; pass allow_manual_override to sync".to_string(),
                Some(target),
                opts,
                now,
            );
        }

        if opts.dry_run {
            self.record_audit_event(
                "sync_dry_run",
                SyncDirection::ForgeToLocal,
                issue_id,
                Some(forge_issue_number),
                base_payload,
                now,
            )?;
            return Ok(outcome(&issue, Some(target), false, opts, None));
        }

        // Live write: mirror status, then the validated transition.
        self.issues.patch_issue(
            issue_id,
            &IssuePatch {
                forge_mirror_status: Some(mirror),
                ..IssuePatch::default()
            },
            &opts.actor,
            now,
        )?;
        self.issues.transition_issue(
            issue_id,
            target,
            &opts.actor,
            json!({ "cause": "sync", "forgeIssueNumber": forge_issue_number }),
            now,
        )?;
        self.issues.append_event(
            issue_id,
            IssueEventType::SyncApplied,
            &opts.actor,
            base_payload.clone(),
            now,
        )?;
        self.record_audit_event(
            "sync_applied",
            SyncDirection::ForgeToLocal,
            issue_id,
            Some(forge_issue_number),
            base_payload,
            now,
        )?;
        Ok(outcome(&issue, Some(target), true, opts, None))
    }

    /// Mirrors the local status out to Forge labels.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] on store or Forge failures.
    pub fn sync_local_to_forge(
        &self,
        issue_id: &IssueId,
        owner: &str,
        repo: &str,
        forge_issue_number: i64,
        opts: &SyncOptions,
        now: Timestamp,
    ) -> Result<SyncOutcome, SyncError> {
        let issue = self
            .issues
            .get_issue(issue_id)?
            .ok_or_else(|| SyncError::IssueNotFound(issue_id.clone()))?;

        let current_labels = self.forge.labels(owner, repo, forge_issue_number)?;
        let (additions, removals) = status_label_diff(issue.local_status, &current_labels);
        let changed = !additions.is_empty() || !removals.is_empty();

        if changed && !opts.dry_run {
            self.forge.set_labels(owner, repo, forge_issue_number, &additions, &removals)?;
        }
        self.record_audit_event(
            if changed { "labels_mirrored" } else { "labels_in_sync" },
            SyncDirection::LocalToForge,
            issue_id,
            Some(forge_issue_number),
            json!({
                "status": issue.local_status,
                "additions": additions,
                "removals": removals,
                "dryRun": opts.dry_run,
            }),
            now,
        )?;
        Ok(outcome(&issue, None, changed && !opts.dry_run, opts, None))
    }

    /// Fetches PR evidence when the Issue links a pull request.
    fn collect_pr_evidence(
        &self,
        owner: &str,
        repo: &str,
        pr_number: Option<i64>,
    ) -> Result<PullRequestEvidence, SyncError> {
        let Some(number) = pr_number else {
            return Ok(PullRequestEvidence::default());
        };
        let Some(pull_request) = self.forge.pull_request(owner, repo, number)? else {
            return Ok(PullRequestEvidence::default());
        };
        let reviews = self.forge.reviews(owner, repo, number)?;
        let checks = self.forge.check_runs(owner, repo, number)?;
        Ok(PullRequestEvidence {
            pull_request: Some(pull_request),
            reviews,
            checks,
        })
    }

    /// Persists a conflict plus its audit and Issue events; never mutates status.
    #[allow(clippy::too_many_arguments, reason = "conflict context is irreducible")]
    fn conflict(
        &self,
        issue: &afu9_core::Issue,
        forge_issue_number: i64,
        conflict_type: ConflictType,
        description: String,
        target: Option<LocalStatus>,
        opts: &SyncOptions,
        now: Timestamp,
    ) -> Result<SyncOutcome, SyncError> {
        self.audit.record_conflict(&SyncConflict {
            issue_id: issue.id.clone(),
            conflict_type,
            description: description.clone(),
            detected_at: now,
            resolved_at: None,
            resolution_notes: None,
        })?;
        self.issues.append_event(
            &issue.id,
            IssueEventType::SyncConflict,
            &opts.actor,
            json!({ "conflictType": conflict_type, "description": description }),
            now,
        )?;
        self.record_audit_event(
            "sync_conflict",
            SyncDirection::ForgeToLocal,
            &issue.id,
            Some(forge_issue_number),
            json!({ "conflictType": conflict_type, "target": target }),
            now,
        )?;
        Ok(outcome(issue, target, false, opts, Some(conflict_type)))
    }

    /// Builds and records one audit event with its bucketed hash.
    fn record_audit_event(
        &self,
        event_type: &str,
        direction: SyncDirection,
        issue_id: &IssueId,
        forge_issue_number: Option<i64>,
        payload: Value,
        now: Timestamp,
    ) -> Result<(), SyncError> {
        let event_hash =
            compute_event_hash(event_type, issue_id, forge_issue_number, now, &payload)?;
        self.audit.record_audit(&SyncAuditEvent {
            event_type: event_type.to_string(),
            direction,
            issue_id: issue_id.clone(),
            forge_issue_number,
            timestamp: now,
            payload,
            event_hash,
        })?;
        Ok(())
    }
}

/// Assembles a sync outcome.
fn outcome(
    issue: &afu9_core::Issue,
    target: Option<LocalStatus>,
    applied: bool,
    opts: &SyncOptions,
    conflict: Option<ConflictType>,
) -> SyncOutcome {
    SyncOutcome {
        issue_id: issue.id.clone(),
        from_status: issue.local_status,
        target_status: target,
        applied,
        dry_run: opts.dry_run,
        conflict,
    }
}
