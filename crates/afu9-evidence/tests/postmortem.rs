// crates/afu9-evidence/tests/postmortem.rs
// ============================================================================
// Module: Postmortem Generator Tests
// Description: Tests for deterministic, evidence-only postmortem generation.
// Purpose: Pin hash stability, outcome idempotence, and explicit unknowns.
// Dependencies: afu9-core, afu9-evidence, serde_json
// ============================================================================
//! ## Overview
//! The artifact hash must ignore `generated_at`; regenerating from unchanged
//! inputs must return the same outcome record; missing data must land in
//! `unknowns` instead of being invented.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use afu9_core::IncidentId;
use afu9_core::RunId;
use afu9_core::Timestamp;
use afu9_core::hashing::sha256_hex_canonical;
use afu9_evidence::EvidenceItem;
use afu9_evidence::InMemoryIncidentStore;
use afu9_evidence::Incident;
use afu9_evidence::IncidentStatus;
use afu9_evidence::PostmortemError;
use afu9_evidence::RemediationRun;
use afu9_evidence::compute_postmortem_hash;
use afu9_evidence::generate_postmortem;
use serde_json::json;

/// Builds a closed incident with evidence and one remediation run.
fn seeded_store(incident_id: &str) -> InMemoryIncidentStore {
    let store = InMemoryIncidentStore::new();
    let id = IncidentId::new(incident_id);
    store
        .put_incident(Incident {
            id: id.clone(),
            severity: "sev2".to_string(),
            source_primary: "deploy_status".to_string(),
            category: "deploy-regression".to_string(),
            status: IncidentStatus::Closed,
            opened_at: Timestamp::from_unix_millis(0),
            resolved_at: Some(Timestamp::from_unix_millis(1_800_000)),
            auto_fixed: true,
        })
        .unwrap();
    let deploy_payload = json!({ "env": "production", "status": "RED" });
    store
        .put_evidence(EvidenceItem {
            id: "ev-1".to_string(),
            incident_id: id.clone(),
            kind: "deploy_status".to_string(),
            payload: deploy_payload.clone(),
            sha256: sha256_hex_canonical(&deploy_payload).unwrap(),
            created_at: Timestamp::from_unix_millis(10),
        })
        .unwrap();
    let report_payload = json!({ "status": "PASS", "reportHash": "aa".repeat(32) });
    store
        .put_evidence(EvidenceItem {
            id: "ev-2".to_string(),
            incident_id: id.clone(),
            kind: "verification_report".to_string(),
            payload: report_payload.clone(),
            sha256: sha256_hex_canonical(&report_payload).unwrap(),
            created_at: Timestamp::from_unix_millis(20),
        })
        .unwrap();
    store
        .put_remediation(RemediationRun {
            run_id: RunId::new("run-9"),
            incident_id: id,
            playbook: "force-new-deployment".to_string(),
            status: "succeeded".to_string(),
            created_at: Timestamp::from_unix_millis(30),
        })
        .unwrap();
    store
}

/// Verifies the artifact hash ignores the generation timestamp.
#[test]
fn hash_excludes_generated_at() {
    let store = seeded_store("inc-1");
    let id = IncidentId::new("inc-1");

    let first = generate_postmortem(&store, &id, Some("v1"), Timestamp::from_unix_millis(100))
        .unwrap();
    let mut later = first.artifact.clone();
    later.generated_at = Timestamp::from_unix_millis(999_999);

    assert_eq!(
        compute_postmortem_hash(&first.artifact).unwrap(),
        compute_postmortem_hash(&later).unwrap()
    );
}

/// Verifies regeneration returns the existing record with is_new = false.
#[test]
fn regeneration_is_idempotent() {
    let store = seeded_store("inc-1");
    let id = IncidentId::new("inc-1");

    let first = generate_postmortem(&store, &id, Some("v1"), Timestamp::from_unix_millis(100))
        .unwrap();
    assert!(first.is_new);

    let second = generate_postmortem(&store, &id, Some("v1"), Timestamp::from_unix_millis(200))
        .unwrap();
    assert!(!second.is_new);
    assert_eq!(first.record.outcome_key, second.record.outcome_key);
    assert_eq!(store.outcome_count().unwrap(), 1);
}

/// Verifies facts cite evidence and hashes cover every cited source.
#[test]
fn facts_cite_evidence_sources() {
    let store = seeded_store("inc-1");
    let id = IncidentId::new("inc-1");
    let outcome = generate_postmortem(&store, &id, None, Timestamp::from_unix_millis(100))
        .unwrap();

    let artifact = outcome.artifact;
    assert_eq!(artifact.learnings.facts.len(), 2);
    for fact in &artifact.learnings.facts {
        assert!(artifact.references.used_sources_hashes.contains(&fact.evidence_sha256));
    }
    assert_eq!(artifact.verification.status, "PASS");
    assert_eq!(artifact.outcome.mttr_minutes, Some(30));
    assert!(artifact.outcome.resolved);
    assert!(artifact.outcome.auto_fixed);
    assert_eq!(artifact.remediation.attempted_playbooks, vec!["force-new-deployment"]);
}

/// Verifies missing data lands in unknowns instead of being invented.
#[test]
fn missing_data_becomes_unknowns() {
    let store = InMemoryIncidentStore::new();
    let id = IncidentId::new("inc-2");
    store
        .put_incident(Incident {
            id: id.clone(),
            severity: "sev1".to_string(),
            source_primary: "alerts".to_string(),
            category: "unclassified".to_string(),
            status: IncidentStatus::Open,
            opened_at: Timestamp::from_unix_millis(0),
            resolved_at: None,
            auto_fixed: false,
        })
        .unwrap();

    let outcome = generate_postmortem(&store, &id, None, Timestamp::from_unix_millis(50))
        .unwrap();
    let unknowns = &outcome.artifact.learnings.unknowns;
    assert!(unknowns.iter().any(|u| u == "Root cause: not classified"));
    assert!(unknowns.iter().any(|u| u == "MTTR: incident not yet resolved"));
    assert!(unknowns.iter().any(|u| u == "Verification: no report ingested"));
    assert!(outcome.artifact.learnings.facts.is_empty());
    assert_eq!(outcome.artifact.verification.status, "UNKNOWN");
}

/// Verifies unknown incidents surface a typed error.
#[test]
fn unknown_incident_is_a_typed_error() {
    let store = InMemoryIncidentStore::new();
    let err = generate_postmortem(
        &store,
        &IncidentId::new("missing"),
        None,
        Timestamp::from_unix_millis(0),
    )
    .unwrap_err();
    assert!(matches!(err, PostmortemError::IncidentNotFound(_)));
}
