// crates/afu9-core/src/core/errors.rs
// ============================================================================
// Module: AFU-9 Error Code Registry
// Description: Stable machine-readable error codes surfaced at every API boundary.
// Purpose: Keep error identity stable across components, transports, and stores.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every error that crosses a component boundary carries one of these codes.
//! Codes are part of the public contract: the API returns them verbatim, the
//! UI renders them as badges, and gating write paths key fail-closed behavior
//! off them. Display and serde forms are the SCREAMING_SNAKE_CASE strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable machine-readable error code.
///
/// # Invariants
/// - String forms never change once released; new failures add new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request payload failed validation.
    InvalidInput,
    /// Spec save requires at least one acceptance criterion.
    AcceptanceCriteriaRequired,
    /// Deployment environment is not recognized.
    InvalidEnv,
    /// Path value failed validation.
    InvalidPath,
    /// No active rulebook is configured (fail-closed).
    LawbookNotConfigured,
    /// Repository access denied by the allowlist.
    RepoNotAllowed,
    /// Repository allowlist configuration is invalid.
    PolicyConfigError,
    /// The active rulebook denied the action.
    LawbookDenied,
    /// Action target is not allowed by policy.
    TargetNotAllowed,
    /// Action requires explicit approval.
    ApprovalRequired,
    /// Action is within its cooldown window.
    CooldownActive,
    /// Action exceeded its rate-limit window.
    RateLimitExceeded,
    /// A second Issue attempted to become ACTIVE.
    SingleActiveViolation,
    /// Requested state transition is not in the state graph.
    InvalidTransition,
    /// Transition preconditions are unmet.
    TransitionPreconditionFailed,
    /// Entity not found.
    NotFound,
    /// Storage conflict (unique key or concurrent update).
    Conflict,
    /// Store is disabled or unreachable.
    Unavailable,
    /// Sync detected a persisted conflict.
    SyncConflict,
    /// Required evidence is missing for the transition.
    EvidenceMissing,
    /// Manual override present but not permitted by the caller.
    ManualOverrideBlocked,
    /// Evidence ingestion failed.
    IngestionFailed,
    /// Run row not found during ingestion.
    RunNotFound,
    /// Deploy event row not found during ingestion.
    DeployNotFound,
    /// Verdict row not found during ingestion.
    VerdictNotFound,
    /// Verification report row not found during ingestion.
    VerificationNotFound,
    /// Webhook signature verification failed.
    SignatureInvalid,
    /// Caller is authenticated but lacks the required role.
    Forbidden,
    /// Operation exceeded its deadline.
    Timeout,
    /// Internal error (details withheld from callers).
    Internal,
}

impl ErrorCode {
    /// Returns the stable string form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::AcceptanceCriteriaRequired => "ACCEPTANCE_CRITERIA_REQUIRED",
            Self::InvalidEnv => "INVALID_ENV",
            Self::InvalidPath => "INVALID_PATH",
            Self::LawbookNotConfigured => "LAWBOOK_NOT_CONFIGURED",
            Self::RepoNotAllowed => "REPO_NOT_ALLOWED",
            Self::PolicyConfigError => "POLICY_CONFIG_ERROR",
            Self::LawbookDenied => "LAWBOOK_DENIED",
            Self::TargetNotAllowed => "TARGET_NOT_ALLOWED",
            Self::ApprovalRequired => "APPROVAL_REQUIRED",
            Self::CooldownActive => "COOLDOWN_ACTIVE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SingleActiveViolation => "SINGLE_ACTIVE_VIOLATION",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::TransitionPreconditionFailed => "TRANSITION_PRECONDITION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Unavailable => "UNAVAILABLE",
            Self::SyncConflict => "SYNC_CONFLICT",
            Self::EvidenceMissing => "EVIDENCE_MISSING",
            Self::ManualOverrideBlocked => "MANUAL_OVERRIDE_BLOCKED",
            Self::IngestionFailed => "INGESTION_FAILED",
            Self::RunNotFound => "RUN_NOT_FOUND",
            Self::DeployNotFound => "DEPLOY_NOT_FOUND",
            Self::VerdictNotFound => "VERDICT_NOT_FOUND",
            Self::VerificationNotFound => "VERIFICATION_NOT_FOUND",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::Forbidden => "FORBIDDEN",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
