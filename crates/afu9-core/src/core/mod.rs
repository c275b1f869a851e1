// crates/afu9-core/src/core/mod.rs
// ============================================================================
// Module: AFU-9 Core Domain
// Description: Domain types for Issues, statuses, operational records, and hashing.
// Purpose: Group the pure domain layer beneath interfaces and runtime helpers.
// Dependencies: crate::core::*
// ============================================================================

//! ## Overview
//! The core domain layer is pure data plus pure functions: no I/O, no clocks,
//! no globals. Stores and services build on these types.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod errors;
pub mod hashing;
pub mod identifiers;
pub mod issue;
pub mod run;
pub mod status;
pub mod time;
pub mod verdict;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use errors::ErrorCode;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::CanonicalId;
pub use identifiers::DeliveryId;
pub use identifiers::IdentifierError;
pub use identifiers::IncidentId;
pub use identifiers::IssueId;
pub use identifiers::LawbookId;
pub use identifiers::RequestId;
pub use identifiers::RunId;
pub use issue::Actor;
pub use issue::ForgeLink;
pub use issue::HandoffPacket;
pub use issue::HandoffState;
pub use issue::Issue;
pub use issue::IssueDraft;
pub use issue::IssueEvent;
pub use issue::IssueEventType;
pub use issue::IssuePatch;
pub use issue::Priority;
pub use issue::SpecFields;
pub use run::DeployEvent;
pub use run::DeployHealth;
pub use run::DeployStatusSnapshot;
pub use run::PolicySnapshot;
pub use run::Run;
pub use run::RunArtifact;
pub use run::RunBundle;
pub use run::RunStatus;
pub use run::RunStep;
pub use run::SnapshotReason;
pub use run::StepStatus;
pub use run::VerdictRecord;
pub use run::VerificationReport;
pub use run::VerificationStatus;
pub use status::ALL_LOCAL_STATUSES;
pub use status::ExecutionState;
pub use status::ForgeMirrorStatus;
pub use status::LocalStatus;
pub use status::effective_status;
pub use status::is_valid;
pub use status::map_mirror_to_local;
pub use time::Timestamp;
pub use verdict::VerdictApplication;
pub use verdict::VerdictError;
pub use verdict::VerdictSignal;
pub use verdict::apply_verdict;
pub use verdict::verdict_target;
