// crates/afu9-core/src/interfaces/mod.rs
// ============================================================================
// Module: AFU-9 Store Interfaces
// Description: Backend-agnostic contracts for Issue and operational storage.
// Purpose: Define the seams the runtime, sync, and evidence layers depend on.
// Dependencies: crate::core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the control plane integrates with storage without
//! embedding backend specifics. Implementations must be deterministic, enforce
//! the single-active and transition invariants, and fail closed on invalid
//! data. The in-memory implementations live in [`crate::runtime`]; durable
//! SQLite implementations live in the store crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::errors::ErrorCode;
use crate::core::identifiers::CanonicalId;
use crate::core::identifiers::IssueId;
use crate::core::identifiers::RunId;
use crate::core::issue::Actor;
use crate::core::issue::HandoffPacket;
use crate::core::issue::Issue;
use crate::core::issue::IssueDraft;
use crate::core::issue::IssueEvent;
use crate::core::issue::IssueEventType;
use crate::core::issue::IssuePatch;
use crate::core::run::DeployEvent;
use crate::core::run::PolicySnapshot;
use crate::core::run::RunBundle;
use crate::core::run::VerdictRecord;
use crate::core::run::VerificationReport;
use crate::core::status::LocalStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors surfaced by Issue and operational stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unique key or concurrent-update conflict.
    #[error("conflict: {0}")]
    Conflict(String),
    /// A second Issue attempted to become ACTIVE.
    #[error("single-active violation: {current_active} is already active")]
    SingleActiveViolation {
        /// Canonical or UUID identifier of the currently active Issue.
        current_active: String,
    },
    /// Requested transition is not in the state graph.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the Issue is in.
        from: LocalStatus,
        /// Status the caller requested.
        to: LocalStatus,
    },
    /// Data failed validation.
    #[error("invalid store data: {0}")]
    Invalid(String),
    /// Store is disabled or unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Underlying I/O or engine error.
    #[error("store io error: {0}")]
    Io(String),
}

impl StoreError {
    /// Returns the stable error code for API surfacing.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict(_) => ErrorCode::Conflict,
            Self::SingleActiveViolation { .. } => ErrorCode::SingleActiveViolation,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Invalid(_) => ErrorCode::InvalidInput,
            Self::Unavailable(_) => ErrorCode::Unavailable,
            Self::Io(_) => ErrorCode::Internal,
        }
    }
}

// ============================================================================
// SECTION: Issue Queries
// ============================================================================

/// Hard cap on page sizes for Issue listings.
pub const MAX_LIST_LIMIT: u32 = 500;

/// Filter for Issue listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IssueFilter {
    /// Restrict to a local status.
    pub status: Option<LocalStatus>,
    /// Restrict to a canonical identifier.
    pub canonical_id: Option<CanonicalId>,
    /// Maximum rows to return (clamped to [`MAX_LIST_LIMIT`]).
    pub limit: Option<u32>,
    /// Offset into the result set.
    pub offset: Option<u32>,
}

impl IssueFilter {
    /// Returns the effective page size after clamping.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(MAX_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }

    /// Returns the effective offset.
    #[must_use]
    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// One page of Issue listing results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePage {
    /// Issues in stable `public_id` order.
    pub issues: Vec<Issue>,
    /// Total matching rows before pagination.
    pub total: u64,
}

/// Activation semantics for [`IssueStore::activate_issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Fail with a single-active violation when another Issue is ACTIVE.
    Exclusive,
    /// Atomically move the currently active Issue to HOLD, then activate.
    Takeover,
}

// ============================================================================
// SECTION: Issue Store
// ============================================================================

/// Issue store owning Issues and their append-only event log.
///
/// Implementations enforce Invariants I-1 through I-3 at the storage layer;
/// application-level checks exist only to produce friendlier errors.
pub trait IssueStore: Send + Sync {
    /// Creates an Issue from a draft and synthesizes a `CREATED` event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the canonical id is taken.
    fn create_issue(
        &self,
        draft: &IssueDraft,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError>;

    /// Loads an Issue by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>, StoreError>;

    /// Loads an Issue by canonical identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_issue_by_canonical(&self, id: &CanonicalId) -> Result<Option<Issue>, StoreError>;

    /// Applies a field-level patch that does not cross status boundaries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the Issue does not exist.
    fn patch_issue(
        &self,
        id: &IssueId,
        patch: &IssuePatch,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError>;

    /// Activates an Issue under the single-active invariant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SingleActiveViolation`] in exclusive mode when
    /// another Issue is ACTIVE, and [`StoreError::InvalidTransition`] when the
    /// Issue cannot enter ACTIVE from its current status.
    fn activate_issue(
        &self,
        id: &IssueId,
        mode: ActivationMode,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError>;

    /// Applies a state-machine-validated status transition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] when the move is not in the
    /// state graph.
    fn transition_issue(
        &self,
        id: &IssueId,
        to: LocalStatus,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> Result<Issue, StoreError>;

    /// Lists Issues with offset pagination.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn list_issues(&self, filter: &IssueFilter) -> Result<IssuePage, StoreError>;

    /// Returns the newest events for an Issue, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn issue_events(&self, id: &IssueId, limit: u32) -> Result<Vec<IssueEvent>, StoreError>;

    /// Appends an event without mutating the Issue row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the Issue does not exist.
    fn append_event(
        &self,
        id: &IssueId,
        event_type: IssueEventType,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> Result<IssueEvent, StoreError>;

    /// Builds the handoff projection used to mirror the Issue to the Forge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the Issue does not exist.
    fn for_handoff(&self, id: &IssueId) -> Result<HandoffPacket, StoreError>;
}

// ============================================================================
// SECTION: Operational Store
// ============================================================================

/// Read-only access to operational rows consumed by evidence ingestion.
///
/// Implementations never expose mutation; ingestion projects these rows into
/// the Timeline without touching the originals.
pub trait OperationalStore: Send + Sync {
    /// Loads a run with its steps and artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn run(&self, id: &RunId) -> Result<Option<RunBundle>, StoreError>;

    /// Loads a deploy event by row identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn deploy_event(&self, id: i64) -> Result<Option<DeployEvent>, StoreError>;

    /// Returns the newest deploy events for an environment, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn recent_deploy_events(&self, env: &str, limit: u32)
    -> Result<Vec<DeployEvent>, StoreError>;

    /// Loads a verdict by execution identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn verdict(&self, execution_id: &str) -> Result<Option<VerdictRecord>, StoreError>;

    /// Loads a policy snapshot by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn policy_snapshot(&self, id: &str) -> Result<Option<PolicySnapshot>, StoreError>;

    /// Loads a verification report by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn verification_report(&self, id: &str) -> Result<Option<VerificationReport>, StoreError>;

    /// Loads the newest verification report for an Issue.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn latest_verification_for_issue(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<VerificationReport>, StoreError>;
}
