// crates/afu9-core/src/core/issue.rs
// ============================================================================
// Module: AFU-9 Issue Model
// Description: Issues, spec fields, Forge linkage, and the append-only event log.
// Purpose: Define the single mutable aggregate of the control plane.
// Dependencies: crate::core::{identifiers, status, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! An Issue is the only mutable shared aggregate in AFU-9. Everything else is
//! append-only or content-addressed. Status fields change exclusively through
//! the state machine; stores synthesize exactly one [`IssueEvent`] per status
//! or handoff change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::CanonicalId;
use crate::core::identifiers::IssueId;
use crate::core::status::ExecutionState;
use crate::core::status::ForgeMirrorStatus;
use crate::core::status::LocalStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Priority and Handoff
// ============================================================================

/// Issue priority band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    /// Drop everything.
    P0,
    /// Important.
    P1,
    /// Routine.
    #[default]
    P2,
}

/// Tracks whether an Issue has been mirrored to the Forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandoffState {
    /// Never sent to the Forge.
    #[default]
    NotSent,
    /// Sent; acknowledgement pending.
    Sent,
    /// Mirrored and reconciled.
    Synced,
    /// Handoff failed; retry requires explicit action.
    Failed,
}

// ============================================================================
// SECTION: Spec Fields and Forge Linkage
// ============================================================================

/// Specification fields captured at S2.
///
/// # Invariants
/// - `acceptance_criteria` is non-empty once the Issue reaches `SPEC_READY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpecFields {
    /// Scope statement.
    pub scope: Option<String>,
    /// Acceptance criteria checked at the review gate.
    pub acceptance_criteria: Vec<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Linkage between a local Issue and its Forge mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ForgeLink {
    /// Repository in `owner/name` form.
    pub repo: Option<String>,
    /// Forge issue number.
    pub issue_number: Option<i64>,
    /// Forge issue URL.
    pub url: Option<String>,
    /// Pull request number.
    pub pr_number: Option<i64>,
    /// Pull request URL.
    pub pr_url: Option<String>,
}

// ============================================================================
// SECTION: Issue
// ============================================================================

/// The Issue aggregate.
///
/// # Invariants
/// - At most one Issue has `local_status = ACTIVE` (Invariant I-1).
/// - `canonical_id` is unique when present (Invariant I-2).
/// - `local_status` changes only via state-machine-validated transitions
///   (Invariant I-3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue identifier (UUID string).
    pub id: IssueId,
    /// Monotonic public sequence number assigned by the store.
    pub public_id: i64,
    /// Project-wide canonical identifier.
    pub canonical_id: Option<CanonicalId>,
    /// Short human title.
    pub title: String,
    /// Local workflow status.
    pub local_status: LocalStatus,
    /// Mirrored Forge status (classifier output).
    pub forge_mirror_status: ForgeMirrorStatus,
    /// Execution state of the current automation run.
    pub execution_state: ExecutionState,
    /// Priority band.
    pub priority: Priority,
    /// Free-form labels.
    pub labels: Vec<String>,
    /// Specification fields.
    pub spec: SpecFields,
    /// Forge linkage.
    pub forge: ForgeLink,
    /// Handoff state toward the Forge.
    pub handoff_state: HandoffState,
    /// User-set flag blocking automated sync writes; cleared on terminal transitions.
    pub execution_override: bool,
    /// Rulebook version stamped at the last gating write.
    pub lawbook_version: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
    /// Timestamp of the S2 spec save, when reached.
    pub spec_ready_at: Option<Timestamp>,
}

impl Issue {
    /// Applies a field-level patch in place; status fields stay untouched.
    pub fn apply_patch(&mut self, patch: &IssuePatch, now: Timestamp) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
        if let Some(spec) = &patch.spec {
            self.spec = spec.clone();
        }
        if let Some(forge) = &patch.forge {
            self.forge = forge.clone();
        }
        if let Some(execution_state) = patch.execution_state {
            self.execution_state = execution_state;
        }
        if let Some(mirror) = patch.forge_mirror_status {
            self.forge_mirror_status = mirror;
        }
        if let Some(handoff) = patch.handoff_state {
            self.handoff_state = handoff;
        }
        if let Some(execution_override) = patch.execution_override {
            self.execution_override = execution_override;
        }
        if let Some(version) = &patch.lawbook_version {
            self.lawbook_version = Some(version.clone());
        }
        if let Some(spec_ready_at) = patch.spec_ready_at {
            self.spec_ready_at = Some(spec_ready_at);
        }
        self.updated_at = now;
    }

    /// Renders the handoff projection used to mirror the Issue to the Forge.
    #[must_use]
    pub fn handoff_packet(&self) -> HandoffPacket {
        let mut body = String::new();
        if let Some(scope) = &self.spec.scope {
            body.push_str("## Scope\n\n");
            body.push_str(scope);
            body.push_str("\n\n");
        }
        if !self.spec.acceptance_criteria.is_empty() {
            body.push_str("## Acceptance Criteria\n\n");
            for criterion in &self.spec.acceptance_criteria {
                body.push_str("- [ ] ");
                body.push_str(criterion);
                body.push('\n');
            }
            body.push('\n');
        }
        if let Some(notes) = &self.spec.notes {
            body.push_str("## Notes\n\n");
            body.push_str(notes);
            body.push('\n');
        }
        HandoffPacket {
            issue_id: self.id.clone(),
            canonical_id: self.canonical_id.clone(),
            title: self.title.clone(),
            body,
            labels: self.labels.clone(),
            forge: self.forge.clone(),
            handoff_state: self.handoff_state,
        }
    }
}

/// Draft used to create an Issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IssueDraft {
    /// Short human title.
    pub title: String,
    /// Project-wide canonical identifier.
    pub canonical_id: Option<CanonicalId>,
    /// Priority band.
    pub priority: Priority,
    /// Free-form labels.
    pub labels: Vec<String>,
    /// Specification fields.
    pub spec: SpecFields,
    /// Forge linkage.
    pub forge: ForgeLink,
}

/// Field-level patch applied without crossing status boundaries.
///
/// # Invariants
/// - Patches never carry `local_status`; status moves go through
///   transition or activation operations only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IssuePatch {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement priority.
    pub priority: Option<Priority>,
    /// Replacement labels.
    pub labels: Option<Vec<String>>,
    /// Replacement spec fields.
    pub spec: Option<SpecFields>,
    /// Replacement Forge linkage.
    pub forge: Option<ForgeLink>,
    /// Replacement execution state.
    pub execution_state: Option<ExecutionState>,
    /// Replacement mirror status.
    pub forge_mirror_status: Option<ForgeMirrorStatus>,
    /// Replacement handoff state.
    pub handoff_state: Option<HandoffState>,
    /// Replacement execution-override flag.
    pub execution_override: Option<bool>,
    /// Replacement rulebook version stamp.
    pub lawbook_version: Option<String>,
    /// Timestamp of the S2 spec save.
    pub spec_ready_at: Option<Timestamp>,
}

// ============================================================================
// SECTION: Actors
// ============================================================================

/// Actor recorded on events: the system or a human identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(String);

impl Actor {
    /// Returns the system actor.
    #[must_use]
    pub fn system() -> Self {
        Self("SYSTEM".to_string())
    }

    /// Creates a human actor from an identifier.
    #[must_use]
    pub fn human(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the actor as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SECTION: Issue Events
// ============================================================================

/// Event types recorded in the append-only Issue log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueEventType {
    /// Issue row inserted.
    Created,
    /// Local status changed.
    StatusChanged,
    /// Handoff state changed.
    HandoffStateChanged,
    /// Verdict applied.
    VerdictSet,
    /// Sync wrote the Issue.
    SyncApplied,
    /// Sync detected a conflict.
    SyncConflict,
    /// Error recorded against the Issue.
    Error,
}

/// Append-only Issue event row.
///
/// # Invariants
/// - Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueEvent {
    /// Event sequence identifier assigned by the store.
    pub id: i64,
    /// Issue the event belongs to.
    pub issue_id: IssueId,
    /// Event type.
    pub event_type: IssueEventType,
    /// Actor that caused the event.
    pub actor: Actor,
    /// Structured payload.
    pub payload: Value,
    /// Event timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Handoff Packet
// ============================================================================

/// Projection of an Issue used to mirror it to the Forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffPacket {
    /// Issue identifier.
    pub issue_id: IssueId,
    /// Canonical identifier when assigned.
    pub canonical_id: Option<CanonicalId>,
    /// Issue title.
    pub title: String,
    /// Rendered body (scope, acceptance criteria, notes).
    pub body: String,
    /// Labels to mirror, including the status label.
    pub labels: Vec<String>,
    /// Current Forge linkage.
    pub forge: ForgeLink,
    /// Handoff state at packet build time.
    pub handoff_state: HandoffState,
}
