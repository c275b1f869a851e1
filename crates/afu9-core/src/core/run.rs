// crates/afu9-core/src/core/run.rs
// ============================================================================
// Module: AFU-9 Operational Records
// Description: Runs, steps, artifacts, deploys, verdicts, and verification reports.
// Purpose: Model the immutable operational rows that evidence ingestion projects.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! Operational records are immutable after completion. Evidence ingestion
//! reads them, never writes them; the Timeline store carries projections with
//! canonical-JSON source hashes so the originals stay authoritative.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::IssueId;
use crate::core::identifiers::RunId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Runs
// ============================================================================

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Queued for a worker.
    Queued,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

/// Step lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
    /// Skipped by the workflow.
    Skipped,
}

/// A run groups ordered steps and produced artifacts.
///
/// # Invariants
/// - Immutable once `status` is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// Issue the run was executed for, when known.
    pub issue_id: Option<IssueId>,
    /// Workflow kind label (e.g. `s3-implement`).
    pub kind: String,
    /// Run status.
    pub status: RunStatus,
    /// Start timestamp.
    pub started_at: Timestamp,
    /// Finish timestamp, when terminal.
    pub finished_at: Option<Timestamp>,
}

/// Ordered step within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStep {
    /// Owning run identifier.
    pub run_id: RunId,
    /// Zero-based step index.
    pub idx: u32,
    /// Step name.
    pub name: String,
    /// Step status.
    pub status: StepStatus,
    /// Process exit code, when the step ran a process.
    pub exit_code: Option<i32>,
    /// Step duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Trimmed stdout tail.
    pub stdout_tail: String,
    /// Trimmed stderr tail.
    pub stderr_tail: String,
}

/// Artifact produced by a run.
///
/// # Invariants
/// - `sha256` is the lowercase hex digest of the artifact bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifact {
    /// Artifact identifier.
    pub id: String,
    /// Owning run identifier.
    pub run_id: RunId,
    /// Artifact kind label (e.g. `log`, `diff`, `report`).
    pub kind: String,
    /// Content digest of the artifact bytes.
    pub sha256: String,
    /// Artifact size in bytes.
    pub bytes: i64,
}

/// A run with its steps and artifacts, as read for ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBundle {
    /// The run row.
    pub run: Run,
    /// Ordered steps.
    pub steps: Vec<RunStep>,
    /// Produced artifacts.
    pub artifacts: Vec<RunArtifact>,
}

// ============================================================================
// SECTION: Deploys
// ============================================================================

/// Deploy event row; never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployEvent {
    /// Deploy event identifier.
    pub id: i64,
    /// Target environment.
    pub env: String,
    /// Service name.
    pub service: String,
    /// Deployed version label.
    pub version: String,
    /// Commit hash deployed.
    pub commit_hash: String,
    /// Deploy status label (e.g. `started`, `succeeded`, `failed`).
    pub status: String,
    /// Free-form message.
    pub message: Option<String>,
    /// Insertion timestamp.
    pub created_at: Timestamp,
}

/// Aggregated environment health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeployHealth {
    /// All signals nominal.
    Green,
    /// Degraded but serving.
    Yellow,
    /// Failing.
    Red,
}

/// Reason entry attached to a deploy status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReason {
    /// Stable reason code.
    pub code: String,
    /// Severity label.
    pub severity: String,
    /// Human-readable message.
    pub message: String,
    /// Evidence pointer backing the reason.
    pub evidence: Value,
}

/// Periodically computed deploy health snapshot; cached with a short TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatusSnapshot {
    /// Target environment.
    pub env: String,
    /// Aggregated health.
    pub status: DeployHealth,
    /// Reasons contributing to the health verdict.
    pub reasons: Vec<SnapshotReason>,
    /// Raw signal values the verdict was computed from.
    pub signals: Value,
    /// Observation timestamp.
    pub observed_at: Timestamp,
    /// Ties the snapshot to the verification run that produced it.
    pub correlation_id: Option<String>,
}

// ============================================================================
// SECTION: Verdicts
// ============================================================================

/// Immutable record of the rulebook version in effect for a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Snapshot identifier.
    pub id: String,
    /// Rulebook version captured.
    pub version: String,
    /// Canonical content hash of the rulebook.
    pub content_hash: String,
    /// Capture timestamp.
    pub created_at: Timestamp,
}

/// Stored verdict row referencing an immutable policy snapshot.
///
/// # Invariants
/// - `confidence_score` is in `[0, 100]` and is a deterministic function of
///   stored signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    /// Execution identifier the verdict was rendered for.
    pub execution_id: String,
    /// Policy snapshot in effect.
    pub policy_snapshot_id: String,
    /// Failure fingerprint identifier.
    pub fingerprint_id: Option<String>,
    /// Error classification label.
    pub error_class: Option<String>,
    /// Service the verdict concerns.
    pub service: String,
    /// Deterministic confidence score.
    pub confidence_score: u8,
    /// Proposed follow-up action label.
    pub proposed_action: String,
    /// Signal tokens contributing to the verdict.
    pub tokens: Vec<String>,
    /// Raw signal values.
    pub signals: Value,
    /// Verdict timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Verification Reports
// ============================================================================

/// Verification result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Verification passed.
    Pass,
    /// Verification failed.
    Fail,
    /// Verification could not be determined.
    Unknown,
}

/// Verification report row produced by the verify stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Report identifier.
    pub id: String,
    /// Issue the verification ran for.
    pub issue_id: IssueId,
    /// Run that produced the report, when known.
    pub run_id: Option<RunId>,
    /// Verification status.
    pub status: VerificationStatus,
    /// Canonical content hash of the report payload.
    pub report_hash: String,
    /// Report timestamp.
    pub created_at: Timestamp,
}
