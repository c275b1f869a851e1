// crates/afu9-core/src/core/verdict.rs
// ============================================================================
// Module: AFU-9 Verdict Service
// Description: Maps GREEN/HOLD/RED verdicts onto Issue status transitions.
// Purpose: Drive state advancement from verification verdicts, never heuristics.
// Dependencies: crate::core::{issue, status, time}, crate::interfaces, serde, thiserror
// ============================================================================

//! ## Overview
//! The verdict service is the only path from a verdict to a status change.
//! RED and HOLD park the Issue in `HOLD`; GREEN climbs the
//! `IMPLEMENTING → VERIFIED → DONE` ladder and is a no-op elsewhere. A
//! `VERDICT_SET` event is always recorded; `STATUS_CHANGED` is synthesized by
//! the store only when the status actually moves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::core::identifiers::IssueId;
use crate::core::issue::Actor;
use crate::core::issue::IssueEventType;
use crate::core::status::LocalStatus;
use crate::core::time::Timestamp;
use crate::interfaces::IssueStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Verdict Signals
// ============================================================================

/// Verdict signal driving state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictSignal {
    /// Verification passed; advance.
    Green,
    /// Verification inconclusive; hold.
    Hold,
    /// Verification failed; hold.
    Red,
}

impl VerdictSignal {
    /// Returns the stable string form of the signal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Hold => "HOLD",
            Self::Red => "RED",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when applying a verdict.
#[derive(Debug, Error)]
pub enum VerdictError {
    /// Verdicts never move terminal Issues.
    #[error("issue {0} is terminal ({1}) and refuses verdicts")]
    TerminalStatus(IssueId, LocalStatus),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Outcome of applying a verdict to an Issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictApplication {
    /// Status after application.
    pub new_status: LocalStatus,
    /// True when the status actually moved.
    pub state_changed: bool,
}

/// Computes the status a verdict maps to from the current status.
///
/// Pure decision function: RED/HOLD map every non-terminal status to `HOLD`;
/// GREEN advances `IMPLEMENTING / REVIEW_READY → VERIFIED` and
/// `VERIFIED → DONE` and leaves everything else unchanged.
#[must_use]
pub const fn verdict_target(current: LocalStatus, signal: VerdictSignal) -> LocalStatus {
    match signal {
        VerdictSignal::Red | VerdictSignal::Hold => LocalStatus::Hold,
        VerdictSignal::Green => match current {
            LocalStatus::Implementing | LocalStatus::ReviewReady => LocalStatus::Verified,
            LocalStatus::Verified => LocalStatus::Done,
            other => other,
        },
    }
}

/// Applies a verdict to an Issue through the store.
///
/// Always records a `VERDICT_SET` event; transitions the Issue only when the
/// target differs from the current status (the store then synthesizes the
/// matching `STATUS_CHANGED` event).
///
/// # Errors
///
/// Returns [`VerdictError::TerminalStatus`] for DONE/KILLED Issues and
/// [`VerdictError::Store`] when persistence fails.
pub fn apply_verdict(
    store: &dyn IssueStore,
    issue_id: &IssueId,
    signal: VerdictSignal,
    actor: &Actor,
    now: Timestamp,
) -> Result<VerdictApplication, VerdictError> {
    let issue = store
        .get_issue(issue_id)?
        .ok_or_else(|| StoreError::NotFound(format!("issue {issue_id}")))?;
    if issue.local_status.is_terminal() {
        return Err(VerdictError::TerminalStatus(issue.id, issue.local_status));
    }

    let target = verdict_target(issue.local_status, signal);
    let state_changed = target != issue.local_status;

    store.append_event(
        issue_id,
        IssueEventType::VerdictSet,
        actor,
        json!({
            "verdict": signal.as_str(),
            "from": issue.local_status.as_str(),
            "to": target.as_str(),
        }),
        now,
    )?;

    if state_changed {
        store.transition_issue(
            issue_id,
            target,
            actor,
            json!({ "cause": "verdict", "verdict": signal.as_str() }),
            now,
        )?;
    }

    Ok(VerdictApplication {
        new_status: target,
        state_changed,
    })
}
