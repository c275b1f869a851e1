// crates/afu9-core/src/core/status.rs
// ============================================================================
// Module: AFU-9 State Machine Core
// Description: Status alphabets, the transition graph, and effective-status derivation.
// Purpose: Keep every status change inside one declarative, fail-closed graph.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The state machine is a pure function layer: [`is_valid`] decides whether a
//! transition appears in the graph, [`map_mirror_to_local`] translates Forge
//! mirror states, and [`effective_status`] derives the UI-facing status from
//! the (local, mirror, execution) triple with fixed precedence. Stores and
//! sync both delegate here so the graph cannot be bypassed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Local Status
// ============================================================================

/// Local workflow status of an Issue.
///
/// # Invariants
/// - `Done` and `Killed` are terminal; `Hold` is terminal-until-unblock.
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocalStatus {
    /// Issue exists but has not been picked.
    Created,
    /// Spec saved with at least one acceptance criterion.
    SpecReady,
    /// Issue is the single active work item.
    Active,
    /// Implementation started (PR branch being prepared).
    ImplementingPrep,
    /// Implementation in progress.
    Implementing,
    /// Review requested (S4 gate).
    ReviewReady,
    /// Verification passed.
    Verified,
    /// Approved and mergeable.
    MergeReady,
    /// Work completed.
    Done,
    /// Blocked pending explicit unblock.
    Hold,
    /// Abandoned; strictly terminal.
    Killed,
}

impl LocalStatus {
    /// Returns true for strictly terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Killed)
    }

    /// Returns the stable string form of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::SpecReady => "SPEC_READY",
            Self::Active => "ACTIVE",
            Self::ImplementingPrep => "IMPLEMENTING_PREP",
            Self::Implementing => "IMPLEMENTING",
            Self::ReviewReady => "REVIEW_READY",
            Self::Verified => "VERIFIED",
            Self::MergeReady => "MERGE_READY",
            Self::Done => "DONE",
            Self::Hold => "HOLD",
            Self::Killed => "KILLED",
        }
    }
}

impl fmt::Display for LocalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Forge Mirror Status
// ============================================================================

/// Raw classifier output describing the Forge-side state of an Issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForgeMirrorStatus {
    /// Project status column "todo".
    Todo,
    /// Project status column "in progress".
    InProgress,
    /// Project status column "in review".
    InReview,
    /// Explicit completion signal.
    Done,
    /// Explicit blocked signal.
    Blocked,
    /// Issue is open with no project signal.
    Open,
    /// Issue is closed with no completion signal.
    Closed,
    /// Classifier failed.
    Error,
    /// No Forge linkage or no signal.
    #[default]
    Unknown,
}

/// Maps a mirror status onto a local status opinion.
///
/// `Open`, `Closed`, `Error`, and `Unknown` yield no opinion. `Closed` in
/// particular never maps to [`LocalStatus::Done`]: a closed Forge issue alone
/// is not a completion signal.
#[must_use]
pub const fn map_mirror_to_local(mirror: ForgeMirrorStatus) -> Option<LocalStatus> {
    match mirror {
        ForgeMirrorStatus::Todo => Some(LocalStatus::SpecReady),
        ForgeMirrorStatus::InProgress => Some(LocalStatus::Implementing),
        ForgeMirrorStatus::InReview => Some(LocalStatus::MergeReady),
        ForgeMirrorStatus::Done => Some(LocalStatus::Done),
        ForgeMirrorStatus::Blocked => Some(LocalStatus::Hold),
        ForgeMirrorStatus::Open
        | ForgeMirrorStatus::Closed
        | ForgeMirrorStatus::Error
        | ForgeMirrorStatus::Unknown => None,
    }
}

// ============================================================================
// SECTION: Execution State
// ============================================================================

/// Execution state of the Issue's current automation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// No automation scheduled.
    #[default]
    Idle,
    /// Automation dispatched but not started.
    Ready,
    /// Automation currently running.
    Running,
    /// Automation failed.
    Failed,
}

// ============================================================================
// SECTION: Transition Graph
// ============================================================================

/// Returns true when `from → to` appears in the state graph.
///
/// The graph is closed and fail-closed: self-transitions are not transitions,
/// terminal states never transition, and every non-terminal state may move to
/// `Hold` (verdict RED/HOLD) or `Killed` (explicit kill).
#[must_use]
pub const fn is_valid(from: LocalStatus, to: LocalStatus) -> bool {
    use LocalStatus as S;
    if from.is_terminal() {
        return false;
    }
    // Universal exits from non-terminal states.
    if matches!(to, S::Killed) {
        return true;
    }
    if matches!(to, S::Hold) {
        return !matches!(from, S::Hold);
    }
    matches!(
        (from, to),
        (S::Created, S::Active | S::SpecReady)
            | (S::Active, S::SpecReady)
            | (S::SpecReady, S::ImplementingPrep | S::Implementing)
            | (S::ImplementingPrep, S::Implementing | S::ReviewReady)
            | (S::Implementing, S::ReviewReady | S::Verified)
            | (S::ReviewReady, S::Verified | S::MergeReady)
            | (S::Verified, S::MergeReady | S::Done)
            | (S::MergeReady, S::Done)
            | (S::Hold, S::Active)
    )
}

// ============================================================================
// SECTION: Effective Status
// ============================================================================

/// Derives the UI-facing status from the status triple.
///
/// Precedence, top wins:
/// 1. A running execution pins the local status.
/// 2. A mirror status with a local mapping overrides.
/// 3. Otherwise the local status stands.
#[must_use]
pub const fn effective_status(
    local: LocalStatus,
    mirror: ForgeMirrorStatus,
    execution: ExecutionState,
) -> LocalStatus {
    if matches!(execution, ExecutionState::Running) {
        return local;
    }
    match map_mirror_to_local(mirror) {
        Some(mapped) => mapped,
        None => local,
    }
}

/// Enumerates all local statuses (used by exhaustive graph checks).
pub const ALL_LOCAL_STATUSES: [LocalStatus; 11] = [
    LocalStatus::Created,
    LocalStatus::SpecReady,
    LocalStatus::Active,
    LocalStatus::ImplementingPrep,
    LocalStatus::Implementing,
    LocalStatus::ReviewReady,
    LocalStatus::Verified,
    LocalStatus::MergeReady,
    LocalStatus::Done,
    LocalStatus::Hold,
    LocalStatus::Killed,
];
