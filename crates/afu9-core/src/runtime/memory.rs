// crates/afu9-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Stores
// Description: Mutex-guarded in-memory IssueStore and OperationalStore.
// Purpose: Reference store semantics for tests and single-process deployments.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! The in-memory stores implement the exact invariant semantics the SQLite
//! store enforces with indexes and triggers: single-active activation,
//! state-graph-validated transitions, unique canonical ids, and exactly one
//! synthesized event per status or handoff change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;

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
use crate::core::status::ExecutionState;
use crate::core::status::ForgeMirrorStatus;
use crate::core::status::LocalStatus;
use crate::core::status::is_valid;
use crate::core::time::Timestamp;
use crate::interfaces::ActivationMode;
use crate::interfaces::IssueFilter;
use crate::interfaces::IssuePage;
use crate::interfaces::IssueStore;
use crate::interfaces::OperationalStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Issue Store
// ============================================================================

/// Internal mutable state behind the store mutex.
#[derive(Debug, Default)]
struct IssueStoreState {
    /// Issues keyed by identifier string.
    issues: BTreeMap<String, Issue>,
    /// Append-only event log.
    events: Vec<IssueEvent>,
    /// Next public sequence number.
    next_public_id: i64,
    /// Next event sequence number.
    next_event_id: i64,
}

impl IssueStoreState {
    /// Appends an event row and returns a clone of it.
    fn push_event(
        &mut self,
        issue_id: &IssueId,
        event_type: IssueEventType,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> IssueEvent {
        self.next_event_id += 1;
        let event = IssueEvent {
            id: self.next_event_id,
            issue_id: issue_id.clone(),
            event_type,
            actor: actor.clone(),
            payload,
            created_at: now,
        };
        self.events.push(event.clone());
        event
    }

    /// Returns the currently active Issue, if any.
    fn current_active(&self) -> Option<&Issue> {
        self.issues.values().find(|issue| issue.local_status == LocalStatus::Active)
    }

    /// Applies a validated status move and synthesizes the event.
    fn write_status(
        &mut self,
        id: &IssueId,
        to: LocalStatus,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let issue = self
            .issues
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        let from = issue.local_status;
        if !is_valid(from, to) {
            return Err(StoreError::InvalidTransition { from, to });
        }
        issue.local_status = to;
        issue.updated_at = now;
        if to.is_terminal() {
            issue.execution_override = false;
        }
        let mut body = payload;
        if let Value::Object(map) = &mut body {
            map.insert("from".to_string(), Value::String(from.as_str().to_string()));
            map.insert("to".to_string(), Value::String(to.as_str().to_string()));
        }
        self.push_event(id, IssueEventType::StatusChanged, actor, body, now);
        self.issues
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))
    }
}

/// Mutex-guarded in-memory Issue store.
///
/// # Invariants
/// - All access is serialized through one mutex; event ordering per Issue is
///   total.
#[derive(Debug, Default)]
pub struct InMemoryIssueStore {
    /// Guarded store state.
    inner: Mutex<IssueStoreState>,
}

impl InMemoryIssueStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to an unavailable error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IssueStoreState>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Unavailable("issue store poisoned".to_string()))
    }
}

impl IssueStore for InMemoryIssueStore {
    fn create_issue(
        &self,
        draft: &IssueDraft,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let mut state = self.lock()?;
        if let Some(canonical) = &draft.canonical_id
            && state.issues.values().any(|issue| issue.canonical_id.as_ref() == Some(canonical))
        {
            return Err(StoreError::Conflict(format!("canonical id {canonical} already exists")));
        }
        state.next_public_id += 1;
        let public_id = state.next_public_id;
        let id = IssueId::new(format!("issue-{public_id:08}"));
        let issue = Issue {
            id: id.clone(),
            public_id,
            canonical_id: draft.canonical_id.clone(),
            title: draft.title.clone(),
            local_status: LocalStatus::Created,
            forge_mirror_status: ForgeMirrorStatus::Unknown,
            execution_state: ExecutionState::Idle,
            priority: draft.priority,
            labels: draft.labels.clone(),
            spec: draft.spec.clone(),
            forge: draft.forge.clone(),
            handoff_state: crate::core::issue::HandoffState::NotSent,
            execution_override: false,
            lawbook_version: None,
            created_at: now,
            updated_at: now,
            spec_ready_at: None,
        };
        state.issues.insert(id.as_str().to_string(), issue.clone());
        state.push_event(
            &id,
            IssueEventType::Created,
            actor,
            json!({ "title": issue.title, "canonicalId": issue.canonical_id }),
            now,
        );
        Ok(issue)
    }

    fn get_issue(&self, id: &IssueId) -> Result<Option<Issue>, StoreError> {
        let state = self.lock()?;
        Ok(state.issues.get(id.as_str()).cloned())
    }

    fn get_issue_by_canonical(&self, id: &CanonicalId) -> Result<Option<Issue>, StoreError> {
        let state = self.lock()?;
        Ok(state.issues.values().find(|issue| issue.canonical_id.as_ref() == Some(id)).cloned())
    }

    fn patch_issue(
        &self,
        id: &IssueId,
        patch: &IssuePatch,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let mut state = self.lock()?;
        let issue = state
            .issues
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        let handoff_before = issue.handoff_state;
        issue.apply_patch(patch, now);
        let handoff_after = issue.handoff_state;
        let updated = issue.clone();
        if handoff_after != handoff_before {
            state.push_event(
                id,
                IssueEventType::HandoffStateChanged,
                actor,
                json!({ "from": handoff_before, "to": handoff_after }),
                now,
            );
        }
        Ok(updated)
    }

    fn activate_issue(
        &self,
        id: &IssueId,
        mode: ActivationMode,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let mut state = self.lock()?;
        let target = state
            .issues
            .get(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        if !is_valid(target.local_status, LocalStatus::Active) {
            return Err(StoreError::InvalidTransition {
                from: target.local_status,
                to: LocalStatus::Active,
            });
        }
        let active = state.current_active().map(|active| (active.id.clone(), active_label(active)));
        if let Some((active_id, label)) = active {
            if active_id == *id {
                return Err(StoreError::Conflict(format!("issue {id} is already active")));
            }
            match mode {
                ActivationMode::Exclusive => {
                    return Err(StoreError::SingleActiveViolation {
                        current_active: label,
                    });
                }
                ActivationMode::Takeover => {
                    state.write_status(
                        &active_id,
                        LocalStatus::Hold,
                        actor,
                        json!({ "cause": "activation_takeover" }),
                        now,
                    )?;
                }
            }
        }
        state.write_status(id, LocalStatus::Active, actor, json!({ "cause": "pick" }), now)
    }

    fn transition_issue(
        &self,
        id: &IssueId,
        to: LocalStatus,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> Result<Issue, StoreError> {
        let mut state = self.lock()?;
        if to == LocalStatus::Active
            && let Some(active) = state.current_active()
            && active.id != *id
        {
            let label = active_label(active);
            return Err(StoreError::SingleActiveViolation {
                current_active: label,
            });
        }
        state.write_status(id, to, actor, payload, now)
    }

    fn list_issues(&self, filter: &IssueFilter) -> Result<IssuePage, StoreError> {
        let state = self.lock()?;
        let mut matching: Vec<&Issue> = state
            .issues
            .values()
            .filter(|issue| filter.status.is_none_or(|status| issue.local_status == status))
            .filter(|issue| {
                filter
                    .canonical_id
                    .as_ref()
                    .is_none_or(|canonical| issue.canonical_id.as_ref() == Some(canonical))
            })
            .collect();
        matching.sort_by_key(|issue| issue.public_id);
        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(filter.effective_offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        let issues = matching.into_iter().skip(offset).take(limit).cloned().collect();
        Ok(IssuePage {
            issues,
            total,
        })
    }

    fn issue_events(&self, id: &IssueId, limit: u32) -> Result<Vec<IssueEvent>, StoreError> {
        let state = self.lock()?;
        let mut events: Vec<IssueEvent> = state
            .events
            .iter()
            .filter(|event| event.issue_id == *id)
            .cloned()
            .collect();
        events.sort_by_key(|event| std::cmp::Reverse(event.id));
        let keep = usize::try_from(limit.min(crate::interfaces::MAX_LIST_LIMIT)).unwrap_or(0);
        events.truncate(keep);
        Ok(events)
    }

    fn append_event(
        &self,
        id: &IssueId,
        event_type: IssueEventType,
        actor: &Actor,
        payload: Value,
        now: Timestamp,
    ) -> Result<IssueEvent, StoreError> {
        let mut state = self.lock()?;
        if !state.issues.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("issue {id}")));
        }
        Ok(state.push_event(id, event_type, actor, payload, now))
    }

    fn for_handoff(&self, id: &IssueId) -> Result<HandoffPacket, StoreError> {
        let state = self.lock()?;
        let issue = state
            .issues
            .get(id.as_str())
            .ok_or_else(|| StoreError::NotFound(format!("issue {id}")))?;
        Ok(issue.handoff_packet())
    }
}

/// Returns the canonical-or-UUID label used in single-active errors.
fn active_label(issue: &Issue) -> String {
    issue
        .canonical_id
        .as_ref()
        .map_or_else(|| issue.id.as_str().to_string(), ToString::to_string)
}

// ============================================================================
// SECTION: In-Memory Operational Store
// ============================================================================

/// Internal mutable state for the operational store.
#[derive(Debug, Default)]
struct OperationalState {
    /// Run bundles keyed by run id.
    runs: BTreeMap<String, RunBundle>,
    /// Deploy events keyed by row id.
    deploys: BTreeMap<i64, DeployEvent>,
    /// Verdicts keyed by execution id.
    verdicts: BTreeMap<String, VerdictRecord>,
    /// Policy snapshots keyed by snapshot id.
    snapshots: BTreeMap<String, PolicySnapshot>,
    /// Verification reports keyed by report id.
    verifications: BTreeMap<String, VerificationReport>,
}

/// Mutex-guarded in-memory operational store used by tests and ingestion.
#[derive(Debug, Default)]
pub struct InMemoryOperationalStore {
    /// Guarded store state.
    inner: Mutex<OperationalState>,
}

impl InMemoryOperationalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to an unavailable error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, OperationalState>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("operational store poisoned".to_string()))
    }

    /// Inserts a run bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store mutex is poisoned.
    pub fn put_run(&self, bundle: RunBundle) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.runs.insert(bundle.run.id.as_str().to_string(), bundle);
        Ok(())
    }

    /// Inserts a deploy event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store mutex is poisoned.
    pub fn put_deploy(&self, event: DeployEvent) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.deploys.insert(event.id, event);
        Ok(())
    }

    /// Inserts a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store mutex is poisoned.
    pub fn put_verdict(&self, verdict: VerdictRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.verdicts.insert(verdict.execution_id.clone(), verdict);
        Ok(())
    }

    /// Inserts a policy snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store mutex is poisoned.
    pub fn put_policy_snapshot(&self, snapshot: PolicySnapshot) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.snapshots.insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    /// Inserts a verification report.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] when the store mutex is poisoned.
    pub fn put_verification(&self, report: VerificationReport) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.verifications.insert(report.id.clone(), report);
        Ok(())
    }
}

impl OperationalStore for InMemoryOperationalStore {
    fn run(&self, id: &RunId) -> Result<Option<RunBundle>, StoreError> {
        let state = self.lock()?;
        Ok(state.runs.get(id.as_str()).cloned())
    }

    fn deploy_event(&self, id: i64) -> Result<Option<DeployEvent>, StoreError> {
        let state = self.lock()?;
        Ok(state.deploys.get(&id).cloned())
    }

    fn recent_deploy_events(
        &self,
        env: &str,
        limit: u32,
    ) -> Result<Vec<DeployEvent>, StoreError> {
        let state = self.lock()?;
        let mut events: Vec<DeployEvent> =
            state.deploys.values().filter(|event| event.env == env).cloned().collect();
        events.sort_by_key(|event| std::cmp::Reverse((event.created_at, event.id)));
        events.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(events)
    }

    fn verdict(&self, execution_id: &str) -> Result<Option<VerdictRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.verdicts.get(execution_id).cloned())
    }

    fn policy_snapshot(&self, id: &str) -> Result<Option<PolicySnapshot>, StoreError> {
        let state = self.lock()?;
        Ok(state.snapshots.get(id).cloned())
    }

    fn verification_report(&self, id: &str) -> Result<Option<VerificationReport>, StoreError> {
        let state = self.lock()?;
        Ok(state.verifications.get(id).cloned())
    }

    fn latest_verification_for_issue(
        &self,
        issue_id: &IssueId,
    ) -> Result<Option<VerificationReport>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .verifications
            .values()
            .filter(|report| report.issue_id == *issue_id)
            .max_by_key(|report| report.created_at)
            .cloned())
    }
}
