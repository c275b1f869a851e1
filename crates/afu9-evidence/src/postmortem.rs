// crates/afu9-evidence/src/postmortem.rs
// ============================================================================
// Module: Postmortem Generator
// Description: Deterministic, evidence-only postmortem artifacts.
// Purpose: Generate replay-verifiable postmortems with explicit unknowns.
// Dependencies: afu9-core, crate::incident, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Postmortems are built exclusively from stored incident rows: every fact
//! cites an evidence hash and every missing datum lands in `unknowns`.
//! The artifact hash excludes `generated_at`, so regenerating from unchanged
//! inputs resolves to the same outcome key and returns the existing record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use afu9_core::IncidentId;
use afu9_core::Timestamp;
use afu9_core::hashing::HashError;
use afu9_core::hashing::sha256_hex_canonical;

use crate::incident::Incident;
use crate::incident::IncidentStatus;
use crate::incident::IncidentStore;
use crate::incident::IncidentStoreError;
use crate::incident::OutcomeRecord;

// ============================================================================
// SECTION: Artifact Sections
// ============================================================================

/// Detection section: what signalled the incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSection {
    /// Distinct evidence signal kinds, sorted.
    pub signal_kinds: Vec<String>,
    /// Hash of the primary evidence item, when present.
    pub primary_evidence: Option<String>,
}

/// Impact section: evidence-backed impact description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactSection {
    /// Summary derived only from stored incident fields.
    pub summary: String,
    /// Open-to-resolution duration in minutes, when resolved.
    pub duration_minutes: Option<i64>,
}

/// Remediation section: what was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationSection {
    /// Playbooks attempted, in execution order, deduplicated.
    pub attempted_playbooks: Vec<String>,
}

/// Verification section: the verification outcome with its report hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSection {
    /// `PASS`, `FAIL`, or `UNKNOWN`.
    pub status: String,
    /// Report hash backing the status, when available.
    pub report_hash: Option<String>,
}

/// Outcome section: resolution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSection {
    /// True when the incident is closed.
    pub resolved: bool,
    /// Mean time to resolution in minutes, when resolved.
    pub mttr_minutes: Option<i64>,
    /// True when automation resolved the incident.
    pub auto_fixed: bool,
}

/// A fact citing the evidence item backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Fact statement.
    pub text: String,
    /// Hash of the evidence item cited.
    pub evidence_sha256: String,
}

/// Learnings section: evidence-cited facts and explicit unknowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningsSection {
    /// Facts, each citing a specific evidence item.
    pub facts: Vec<Fact>,
    /// Explicit unknowns; never invented facts.
    pub unknowns: Vec<String>,
}

/// References section: source hashes and pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencesSection {
    /// Sorted, deduplicated evidence hashes used by the artifact.
    pub used_sources_hashes: Vec<String>,
    /// Pointers back to the evidence rows.
    pub pointers: Vec<Value>,
}

/// Complete postmortem artifact.
///
/// # Invariants
/// - `generated_at` is excluded from the content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostmortemArtifact {
    /// Incident identifier.
    pub incident_id: String,
    /// Rulebook version in effect at generation, when known.
    pub lawbook_version: Option<String>,
    /// Detection section.
    pub detection: DetectionSection,
    /// Impact section.
    pub impact: ImpactSection,
    /// Remediation section.
    pub remediation: RemediationSection,
    /// Verification section.
    pub verification: VerificationSection,
    /// Outcome section.
    pub outcome: OutcomeSection,
    /// Learnings section.
    pub learnings: LearningsSection,
    /// References section.
    pub references: ReferencesSection,
    /// Generation timestamp (excluded from the hash).
    pub generated_at: Timestamp,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by postmortem generation.
#[derive(Debug, Error)]
pub enum PostmortemError {
    /// Incident does not exist.
    #[error("incident not found: {0}")]
    IncidentNotFound(IncidentId),
    /// Canonical hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] IncidentStoreError),
}

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Result of a postmortem generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostmortemOutcome {
    /// Stored (or pre-existing) outcome record.
    pub record: OutcomeRecord,
    /// True when this call created the record.
    pub is_new: bool,
    /// Artifact built by this call.
    pub artifact: PostmortemArtifact,
}

/// Generates a postmortem for an incident.
///
/// # Errors
///
/// Returns [`PostmortemError::IncidentNotFound`] for unknown incidents and
/// propagates store or hashing failures.
pub fn generate_postmortem(
    store: &dyn IncidentStore,
    incident_id: &IncidentId,
    lawbook_version: Option<&str>,
    now: Timestamp,
) -> Result<PostmortemOutcome, PostmortemError> {
    let incident = store
        .incident(incident_id)?
        .ok_or_else(|| PostmortemError::IncidentNotFound(incident_id.clone()))?;
    let evidence = store.evidence_for(incident_id)?;
    let events = store.events_for(incident_id)?;
    let remediations = store.remediations_for(incident_id)?;

    let mut unknowns = Vec::new();

    let signal_kinds: Vec<String> = evidence
        .iter()
        .map(|item| item.kind.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let primary_evidence = evidence
        .iter()
        .find(|item| item.kind == incident.source_primary)
        .or_else(|| evidence.first())
        .map(|item| item.sha256.clone());
    if primary_evidence.is_none() {
        unknowns.push("Detection: no evidence items ingested".to_string());
    }

    let duration_minutes = incident
        .resolved_at
        .map(|resolved| resolved.millis_since(incident.opened_at) / 60_000);
    let impact = ImpactSection {
        summary: format!(
            "{} incident affecting {}; {} evidence signals recorded",
            incident.category,
            incident.source_primary,
            evidence.len()
        ),
        duration_minutes,
    };

    let mut attempted_playbooks = Vec::new();
    for run in &remediations {
        if !attempted_playbooks.contains(&run.playbook) {
            attempted_playbooks.push(run.playbook.clone());
        }
    }
    if attempted_playbooks.is_empty() {
        unknowns.push("Remediation: no playbooks attempted".to_string());
    }

    let verification = build_verification(&evidence, &mut unknowns);
    let outcome = build_outcome(&incident, duration_minutes, &mut unknowns);

    let facts: Vec<Fact> = evidence
        .iter()
        .map(|item| Fact {
            text: format!("{} evidence recorded for {}", item.kind, incident.source_primary),
            evidence_sha256: item.sha256.clone(),
        })
        .collect();
    if !evidence.iter().any(|item| item.kind == "root_cause") {
        unknowns.push("Root cause: not classified".to_string());
    }

    let used_sources_hashes: Vec<String> = evidence
        .iter()
        .map(|item| item.sha256.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let pointers: Vec<Value> = evidence
        .iter()
        .map(|item| json!({ "kind": item.kind, "evidenceId": item.id }))
        .collect();

    let artifact = PostmortemArtifact {
        incident_id: incident_id.as_str().to_string(),
        lawbook_version: lawbook_version.map(ToString::to_string),
        detection: DetectionSection {
            signal_kinds,
            primary_evidence,
        },
        impact,
        remediation: RemediationSection {
            attempted_playbooks,
        },
        verification,
        outcome,
        learnings: LearningsSection {
            facts,
            unknowns,
        },
        references: ReferencesSection {
            used_sources_hashes,
            pointers,
        },
        generated_at: now,
    };

    let postmortem_hash = compute_postmortem_hash(&artifact)?;
    let pack_hash = sha256_hex_canonical(&json!({
        "incidentId": incident_id.as_str(),
        "evidenceCount": evidence.len(),
        "eventsCount": events.len(),
        "remediationCount": remediations.len(),
    }))?;
    let primary_remediation = remediations.first().map(|run| run.run_id.as_str().to_string());
    let outcome_key = sha256_hex_canonical(&json!({
        "incidentId": incident_id.as_str(),
        "primaryRemediationRunId": primary_remediation,
        "packHash": pack_hash,
    }))?;

    let record = OutcomeRecord {
        outcome_key,
        incident_id: incident_id.clone(),
        postmortem: serde_json::to_value(&artifact)
            .map_err(|err| IncidentStoreError::Store(err.to_string()))?,
        postmortem_hash,
        pack_hash,
        created_at: now,
    };
    let (stored, is_new) = store.upsert_outcome(&record)?;
    Ok(PostmortemOutcome {
        record: stored,
        is_new,
        artifact,
    })
}

/// Computes the artifact content hash with `generated_at` excluded.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn compute_postmortem_hash(artifact: &PostmortemArtifact) -> Result<String, HashError> {
    let mut value = serde_json::to_value(artifact)
        .map_err(|err| HashError::Canonicalization(err.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.remove("generated_at");
    }
    sha256_hex_canonical(&value)
}

/// Builds the verification section from evidence items.
fn build_verification(
    evidence: &[crate::incident::EvidenceItem],
    unknowns: &mut Vec<String>,
) -> VerificationSection {
    let report = evidence.iter().find(|item| item.kind == "verification_report");
    match report {
        Some(item) => {
            let status = item
                .payload
                .get("status")
                .and_then(Value::as_str)
                .filter(|status| matches!(*status, "PASS" | "FAIL"))
                .unwrap_or("UNKNOWN");
            if status == "UNKNOWN" {
                unknowns.push("Verification: report carries no PASS/FAIL status".to_string());
            }
            let report_hash = item
                .payload
                .get("reportHash")
                .and_then(Value::as_str)
                .map_or_else(|| item.sha256.clone(), ToString::to_string);
            VerificationSection {
                status: status.to_string(),
                report_hash: Some(report_hash),
            }
        }
        None => {
            unknowns.push("Verification: no report ingested".to_string());
            VerificationSection {
                status: "UNKNOWN".to_string(),
                report_hash: None,
            }
        }
    }
}

/// Builds the outcome section from the incident row.
fn build_outcome(
    incident: &Incident,
    duration_minutes: Option<i64>,
    unknowns: &mut Vec<String>,
) -> OutcomeSection {
    let resolved = incident.status == IncidentStatus::Closed;
    let mttr_minutes = if resolved {
        duration_minutes
    } else {
        unknowns.push("MTTR: incident not yet resolved".to_string());
        None
    };
    OutcomeSection {
        resolved,
        mttr_minutes,
        auto_fixed: incident.auto_fixed,
    }
}
