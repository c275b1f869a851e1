// crates/afu9-sync/src/lib.rs
// ============================================================================
// Module: AFU-9 Sync Library
// Description: Bidirectional Forge reconciliation for the AFU-9 control plane.
// Purpose: Expose the Forge contract, classifier, sync engine, and sweep runner.
// Dependencies: crate::{classify, engine, forge, http, job}
// ============================================================================

//! ## Overview
//! Sync is pull-based and idempotent: a sweep can be re-run against any point
//! in history and converge to the same state. All Forge access goes through
//! the repo-access-guarded client; all decisions are validated against the
//! state machine and audited with bucketed deduplication hashes.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod classify;
pub mod engine;
pub mod forge;
pub mod http;
pub mod job;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use classify::PullRequestEvidence;
pub use classify::STATUS_LABEL_PREFIX;
pub use classify::determine_target_status;
pub use classify::extract_mirror_status;
pub use classify::status_label;
pub use classify::status_label_diff;
pub use engine::AUDIT_BUCKET_SECONDS;
pub use engine::ConflictType;
pub use engine::InMemorySyncAuditStore;
pub use engine::SyncAuditEvent;
pub use engine::SyncAuditStore;
pub use engine::SyncConflict;
pub use engine::SyncDirection;
pub use engine::SyncEngine;
pub use engine::SyncError;
pub use engine::SyncOptions;
pub use engine::SyncOutcome;
pub use engine::SyncStoreError;
pub use engine::compute_event_hash;
pub use forge::CheckConclusion;
pub use forge::CheckStatus;
pub use forge::ForgeCheckRun;
pub use forge::ForgeClient;
pub use forge::ForgeError;
pub use forge::ForgeIssueSnapshot;
pub use forge::ForgePullRequest;
pub use forge::ForgeReview;
pub use forge::GuardedForgeClient;
pub use forge::InstallationTokenProvider;
pub use forge::ReviewState;
pub use forge::StaticTokenProvider;
pub use http::HttpForgeClient;
pub use http::authenticated_client;
pub use job::SweepSummary;
pub use job::SweepTarget;
pub use job::SyncJobRunner;
