// crates/afu9-evidence/src/incident.rs
// ============================================================================
// Module: Incident Model
// Description: Incidents, evidence items, remediation runs, and outcome records.
// Purpose: Define the failure-classification rows the postmortem generator reads.
// Dependencies: afu9-core, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Incidents classify failures and collect hashed evidence items. Outcome
//! records are idempotent postmortem containers keyed by a deterministic
//! outcome key; regenerating a postmortem from unchanged inputs returns the
//! existing record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use afu9_core::IncidentId;
use afu9_core::RunId;
use afu9_core::Timestamp;

// ============================================================================
// SECTION: Incident Rows
// ============================================================================

/// Incident lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// Under investigation.
    Open,
    /// Mitigated but not closed.
    Mitigated,
    /// Resolved and closed.
    Closed,
}

/// Incident row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Incident identifier.
    pub id: IncidentId,
    /// Severity label (e.g. `sev1`).
    pub severity: String,
    /// Primary signal source.
    pub source_primary: String,
    /// Classification category label.
    pub category: String,
    /// Lifecycle status.
    pub status: IncidentStatus,
    /// Opening timestamp.
    pub opened_at: Timestamp,
    /// Resolution timestamp, when closed.
    pub resolved_at: Option<Timestamp>,
    /// True when an automated remediation resolved the incident.
    pub auto_fixed: bool,
}

/// Incident event row (append-only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentEvent {
    /// Owning incident.
    pub incident_id: IncidentId,
    /// Event kind label.
    pub kind: String,
    /// Structured payload.
    pub payload: Value,
    /// Event timestamp.
    pub created_at: Timestamp,
}

/// Hashed evidence item attached to an incident.
///
/// # Invariants
/// - `sha256` is the canonical-JSON hash of `payload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Evidence identifier.
    pub id: String,
    /// Owning incident.
    pub incident_id: IncidentId,
    /// Signal kind label (e.g. `deploy_status`, `verification_report`).
    pub kind: String,
    /// Evidence payload.
    pub payload: Value,
    /// Canonical-JSON SHA-256 of the payload.
    pub sha256: String,
    /// Collection timestamp.
    pub created_at: Timestamp,
}

/// Remediation run attempted for an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRun {
    /// Run identifier.
    pub run_id: RunId,
    /// Owning incident.
    pub incident_id: IncidentId,
    /// Playbook label executed.
    pub playbook: String,
    /// Run status label.
    pub status: String,
    /// Start timestamp.
    pub created_at: Timestamp,
}

/// Idempotent postmortem container.
///
/// # Invariants
/// - `outcome_key` is deterministic over (incident, primary remediation,
///   evidence pack); identical inputs yield the existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Deterministic outcome key.
    pub outcome_key: String,
    /// Owning incident.
    pub incident_id: IncidentId,
    /// Postmortem artifact.
    pub postmortem: Value,
    /// Canonical hash of the artifact (minus `generatedAt`).
    pub postmortem_hash: String,
    /// Hash of the evidence pack shape.
    pub pack_hash: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Errors raised by incident stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IncidentStoreError {
    /// Incident does not exist.
    #[error("incident not found: {0}")]
    NotFound(String),
    /// Underlying store failure.
    #[error("incident store error: {0}")]
    Store(String),
}

/// Store owning incidents, evidence, remediation runs, and outcomes.
pub trait IncidentStore: Send + Sync {
    /// Loads an incident.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the query fails.
    fn incident(&self, id: &IncidentId) -> Result<Option<Incident>, IncidentStoreError>;

    /// Returns evidence items for an incident in collection order.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the query fails.
    fn evidence_for(&self, id: &IncidentId) -> Result<Vec<EvidenceItem>, IncidentStoreError>;

    /// Returns events for an incident in order.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the query fails.
    fn events_for(&self, id: &IncidentId) -> Result<Vec<IncidentEvent>, IncidentStoreError>;

    /// Returns remediation runs for an incident in start order.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the query fails.
    fn remediations_for(&self, id: &IncidentId)
    -> Result<Vec<RemediationRun>, IncidentStoreError>;

    /// Upserts an outcome record by outcome key.
    ///
    /// Returns the stored record and `true` when the key was new.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when persistence fails.
    fn upsert_outcome(
        &self,
        record: &OutcomeRecord,
    ) -> Result<(OutcomeRecord, bool), IncidentStoreError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Internal mutable state behind the store mutex.
#[derive(Debug, Default)]
struct IncidentState {
    /// Incidents keyed by identifier.
    incidents: BTreeMap<String, Incident>,
    /// Evidence items in collection order.
    evidence: Vec<EvidenceItem>,
    /// Incident events in order.
    events: Vec<IncidentEvent>,
    /// Remediation runs in start order.
    remediations: Vec<RemediationRun>,
    /// Outcome records keyed by outcome key.
    outcomes: BTreeMap<String, OutcomeRecord>,
}

/// Mutex-guarded in-memory incident store.
#[derive(Debug, Default)]
pub struct InMemoryIncidentStore {
    /// Guarded store state.
    inner: Mutex<IncidentState>,
}

impl InMemoryIncidentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, IncidentState>, IncidentStoreError> {
        self.inner
            .lock()
            .map_err(|_| IncidentStoreError::Store("incident store poisoned".to_string()))
    }

    /// Inserts an incident.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the store mutex is poisoned.
    pub fn put_incident(&self, incident: Incident) -> Result<(), IncidentStoreError> {
        let mut state = self.lock()?;
        state.incidents.insert(incident.id.as_str().to_string(), incident);
        Ok(())
    }

    /// Appends an evidence item.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the store mutex is poisoned.
    pub fn put_evidence(&self, item: EvidenceItem) -> Result<(), IncidentStoreError> {
        let mut state = self.lock()?;
        state.evidence.push(item);
        Ok(())
    }

    /// Appends an incident event.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the store mutex is poisoned.
    pub fn put_event(&self, event: IncidentEvent) -> Result<(), IncidentStoreError> {
        let mut state = self.lock()?;
        state.events.push(event);
        Ok(())
    }

    /// Appends a remediation run.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the store mutex is poisoned.
    pub fn put_remediation(&self, run: RemediationRun) -> Result<(), IncidentStoreError> {
        let mut state = self.lock()?;
        state.remediations.push(run);
        Ok(())
    }

    /// Returns the number of stored outcome records.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentStoreError`] when the store mutex is poisoned.
    pub fn outcome_count(&self) -> Result<usize, IncidentStoreError> {
        let state = self.lock()?;
        Ok(state.outcomes.len())
    }
}

impl IncidentStore for InMemoryIncidentStore {
    fn incident(&self, id: &IncidentId) -> Result<Option<Incident>, IncidentStoreError> {
        let state = self.lock()?;
        Ok(state.incidents.get(id.as_str()).cloned())
    }

    fn evidence_for(&self, id: &IncidentId) -> Result<Vec<EvidenceItem>, IncidentStoreError> {
        let state = self.lock()?;
        Ok(state
            .evidence
            .iter()
            .filter(|item| item.incident_id == *id)
            .cloned()
            .collect())
    }

    fn events_for(&self, id: &IncidentId) -> Result<Vec<IncidentEvent>, IncidentStoreError> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .filter(|event| event.incident_id == *id)
            .cloned()
            .collect())
    }

    fn remediations_for(
        &self,
        id: &IncidentId,
    ) -> Result<Vec<RemediationRun>, IncidentStoreError> {
        let state = self.lock()?;
        Ok(state
            .remediations
            .iter()
            .filter(|run| run.incident_id == *id)
            .cloned()
            .collect())
    }

    fn upsert_outcome(
        &self,
        record: &OutcomeRecord,
    ) -> Result<(OutcomeRecord, bool), IncidentStoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.outcomes.get(&record.outcome_key) {
            return Ok((existing.clone(), false));
        }
        state.outcomes.insert(record.outcome_key.clone(), record.clone());
        Ok((record.clone(), true))
    }
}
