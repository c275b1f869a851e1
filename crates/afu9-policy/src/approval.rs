// crates/afu9-policy/src/approval.rs
// ============================================================================
// Module: Approval Gates
// Description: Explicit approval records consumed by the policy evaluator.
// Purpose: Persist who approved what, so approval is evidence rather than a flag.
// Dependencies: afu9-core, serde, thiserror
// ============================================================================

//! ## Overview
//! Approval gates record explicit human decisions for gated action types. The
//! evaluator receives `has_approval` as an input; callers derive it from the
//! latest gate for `(action_type, target)` so the approval trail is auditable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use afu9_core::Actor;
use afu9_core::RequestId;
use afu9_core::Timestamp;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Decision captured by an approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    /// Action approved.
    Approved,
    /// Action denied.
    Denied,
    /// Request withdrawn.
    Cancelled,
}

/// Approval gate row.
///
/// # Invariants
/// - Rows are append-only; a newer gate supersedes older ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalGate {
    /// Request identifier the approval responds to.
    pub request_id: RequestId,
    /// Action type being approved.
    pub action_type: String,
    /// Target identifier being approved.
    pub target: String,
    /// Deciding actor.
    pub actor: Actor,
    /// Recorded decision.
    pub decision: ApprovalDecision,
    /// Optional signed confirmation phrase.
    pub signed_phrase: Option<String>,
    /// Decision timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Errors raised by approval stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// Underlying store failure.
    #[error("approval store error: {0}")]
    Store(String),
}

/// Store for approval gate rows.
pub trait ApprovalStore: Send + Sync {
    /// Appends an approval gate.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when persistence fails.
    fn record(&self, gate: &ApprovalGate) -> Result<(), ApprovalError>;

    /// Returns the newest gate for `(action_type, target)`.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the query fails.
    fn latest(&self, action_type: &str, target: &str)
    -> Result<Option<ApprovalGate>, ApprovalError>;
}

/// Returns true when the newest gate approves the action.
///
/// # Errors
///
/// Returns [`ApprovalError`] when the store query fails.
pub fn has_approval(
    store: &dyn ApprovalStore,
    action_type: &str,
    target: &str,
) -> Result<bool, ApprovalError> {
    Ok(store
        .latest(action_type, target)?
        .is_some_and(|gate| gate.decision == ApprovalDecision::Approved))
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutex-guarded in-memory approval store.
#[derive(Debug, Default)]
pub struct InMemoryApprovalStore {
    /// Append-only approval rows.
    gates: Mutex<Vec<ApprovalGate>>,
}

impl InMemoryApprovalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn record(&self, gate: &ApprovalGate) -> Result<(), ApprovalError> {
        let mut gates = self
            .gates
            .lock()
            .map_err(|_| ApprovalError::Store("approval store poisoned".to_string()))?;
        gates.push(gate.clone());
        Ok(())
    }

    fn latest(
        &self,
        action_type: &str,
        target: &str,
    ) -> Result<Option<ApprovalGate>, ApprovalError> {
        let gates = self
            .gates
            .lock()
            .map_err(|_| ApprovalError::Store("approval store poisoned".to_string()))?;
        Ok(gates
            .iter()
            .filter(|gate| gate.action_type == action_type && gate.target == target)
            .max_by_key(|gate| gate.created_at)
            .cloned())
    }
}
