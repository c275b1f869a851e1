// crates/afu9-evidence/tests/ingest.rs
// ============================================================================
// Module: Evidence Ingestor Tests
// Description: Tests for run, deploy, verdict, and verification ingestion.
// Purpose: Pin the fetch→upsert→source→edge skeleton and typed errors.
// Dependencies: afu9-core, afu9-evidence, afu9-policy, serde_json
// ============================================================================
//! ## Overview
//! Ingestion must be idempotent, stamp one consistent fetched_at per call,
//! attach a canonical source hash to every node, and surface typed not-found
//! errors.

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

use std::sync::Arc;

use afu9_core::DeployEvent;
use afu9_core::InMemoryOperationalStore;
use afu9_core::IssueId;
use afu9_core::LawbookId;
use afu9_core::PolicySnapshot;
use afu9_core::Run;
use afu9_core::RunArtifact;
use afu9_core::RunBundle;
use afu9_core::RunId;
use afu9_core::RunStatus;
use afu9_core::RunStep;
use afu9_core::StepStatus;
use afu9_core::Timestamp;
use afu9_core::VerdictRecord;
use afu9_core::VerificationReport;
use afu9_core::VerificationStatus;
use afu9_evidence::EvidenceIngestor;
use afu9_evidence::InMemoryTimelineStore;
use afu9_evidence::IngestError;
use afu9_evidence::NaturalKey;
use afu9_evidence::NodeType;
use afu9_evidence::SourceSystem;
use afu9_evidence::TimelineStore;
use afu9_policy::InMemoryLawbookStore;
use afu9_policy::LawbookResolver;
use serde_json::json;

/// Builds the ingestor plus its backing stores.
fn setup() -> (EvidenceIngestor, Arc<InMemoryOperationalStore>, Arc<InMemoryTimelineStore>) {
    let operational = Arc::new(InMemoryOperationalStore::new());
    let timeline = Arc::new(InMemoryTimelineStore::new());
    let resolver = Arc::new(LawbookResolver::new(Arc::new(InMemoryLawbookStore::new())));
    let ingestor = EvidenceIngestor::new(
        Arc::clone(&operational) as Arc<dyn afu9_core::OperationalStore>,
        Arc::clone(&timeline) as Arc<dyn TimelineStore>,
        resolver,
        LawbookId::default_id(),
    );
    (ingestor, operational, timeline)
}

/// Builds a two-step, one-artifact run bundle.
fn run_bundle(run_id: &str) -> RunBundle {
    RunBundle {
        run: Run {
            id: RunId::new(run_id),
            issue_id: Some(IssueId::new("issue-1")),
            kind: "s3-implement".to_string(),
            status: RunStatus::Succeeded,
            started_at: Timestamp::from_unix_millis(100),
            finished_at: Some(Timestamp::from_unix_millis(900)),
        },
        steps: vec![
            RunStep {
                run_id: RunId::new(run_id),
                idx: 0,
                name: "checkout".to_string(),
                status: StepStatus::Succeeded,
                exit_code: Some(0),
                duration_ms: Some(120),
                stdout_tail: String::new(),
                stderr_tail: String::new(),
            },
            RunStep {
                run_id: RunId::new(run_id),
                idx: 1,
                name: "build".to_string(),
                status: StepStatus::Succeeded,
                exit_code: Some(0),
                duration_ms: Some(640),
                stdout_tail: "ok".to_string(),
                stderr_tail: String::new(),
            },
        ],
        artifacts: vec![RunArtifact {
            id: "art-1".to_string(),
            run_id: RunId::new(run_id),
            kind: "diff".to_string(),
            sha256: "ab".repeat(32),
            bytes: 512,
        }],
    }
}

/// Verifies run ingestion creates the RUN node plus artifact fan-outs.
#[test]
fn run_ingestion_projects_nodes_and_edges() {
    let (ingestor, operational, timeline) = setup();
    operational.put_run(run_bundle("run-1")).unwrap();

    let report = ingestor
        .ingest_run(&RunId::new("run-1"), Timestamp::from_unix_millis(1_000))
        .unwrap();
    assert_eq!(report.nodes_touched, 4);
    assert_eq!(report.edges_touched, 3);

    let run_node = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "run", "run-1"))
        .unwrap()
        .unwrap();
    assert_eq!(run_node.node_type, NodeType::Run);
    assert_eq!(run_node.payload["fetched_at"], 1_000);
    assert_eq!(run_node.payload["stepCount"], 2);

    let sources = timeline.sources_for(run_node.id).unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].sha256.len(), 64);

    let edges = timeline.edges_from(run_node.id).unwrap();
    assert_eq!(edges.len(), 3);
}

/// Verifies re-ingestion of an unchanged run leaves the timeline stable.
#[test]
fn run_ingestion_is_idempotent() {
    let (ingestor, operational, timeline) = setup();
    operational.put_run(run_bundle("run-1")).unwrap();

    let now = Timestamp::from_unix_millis(1_000);
    ingestor.ingest_run(&RunId::new("run-1"), now).unwrap();
    let node_before = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "run", "run-1"))
        .unwrap()
        .unwrap();

    ingestor.ingest_run(&RunId::new("run-1"), now).unwrap();
    let node_after = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "run", "run-1"))
        .unwrap()
        .unwrap();

    assert_eq!(node_before, node_after);
    assert_eq!(timeline.edges_from(node_after.id).unwrap().len(), 3);
}

/// Verifies a missing run surfaces the typed error.
#[test]
fn missing_run_is_a_typed_error() {
    let (ingestor, _, _) = setup();
    let err = ingestor
        .ingest_run(&RunId::new("absent"), Timestamp::from_unix_millis(0))
        .unwrap_err();
    assert!(matches!(err, IngestError::RunNotFound(_)));
}

/// Verifies deploy ingestion carries the deploy fields in the payload.
#[test]
fn deploy_ingestion_projects_payload() {
    let (ingestor, operational, timeline) = setup();
    operational
        .put_deploy(DeployEvent {
            id: 7,
            env: "staging".to_string(),
            service: "afu9-api".to_string(),
            version: "1.4.2".to_string(),
            commit_hash: "deadbeef".to_string(),
            status: "succeeded".to_string(),
            message: None,
            created_at: Timestamp::from_unix_millis(500),
        })
        .unwrap();

    ingestor.ingest_deploy(7, Timestamp::from_unix_millis(1_000)).unwrap();
    let node = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "deploy", "7"))
        .unwrap()
        .unwrap();
    assert_eq!(node.node_type, NodeType::Deploy);
    assert_eq!(node.payload["env"], "staging");
    assert_eq!(node.payload["commitHash"], "deadbeef");
}

/// Verifies verdict ingestion joins the policy snapshot version.
#[test]
fn verdict_ingestion_joins_snapshot_version() {
    let (ingestor, operational, timeline) = setup();
    operational
        .put_policy_snapshot(PolicySnapshot {
            id: "snap-1".to_string(),
            version: "2026.07.1".to_string(),
            content_hash: "cd".repeat(32),
            created_at: Timestamp::from_unix_millis(1),
        })
        .unwrap();
    operational
        .put_verdict(VerdictRecord {
            execution_id: "exec-1".to_string(),
            policy_snapshot_id: "snap-1".to_string(),
            fingerprint_id: None,
            error_class: None,
            service: "afu9-api".to_string(),
            confidence_score: 92,
            proposed_action: "promote".to_string(),
            tokens: vec!["checks_green".to_string()],
            signals: json!({ "checks": "green" }),
            created_at: Timestamp::from_unix_millis(600),
        })
        .unwrap();

    ingestor.ingest_verdict("exec-1", Timestamp::from_unix_millis(1_000)).unwrap();
    let node = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "verdict", "exec-1"))
        .unwrap()
        .unwrap();
    assert_eq!(node.node_type, NodeType::Verdict);
    assert_eq!(node.lawbook_version.as_deref(), Some("2026.07.1"));
}

/// Verifies a verdict with a missing snapshot still ingests with a null stamp.
#[test]
fn verdict_without_snapshot_has_null_stamp() {
    let (ingestor, operational, timeline) = setup();
    operational
        .put_verdict(VerdictRecord {
            execution_id: "exec-2".to_string(),
            policy_snapshot_id: "missing".to_string(),
            fingerprint_id: None,
            error_class: None,
            service: "afu9-api".to_string(),
            confidence_score: 10,
            proposed_action: "hold".to_string(),
            tokens: Vec::new(),
            signals: json!({}),
            created_at: Timestamp::from_unix_millis(600),
        })
        .unwrap();

    ingestor.ingest_verdict("exec-2", Timestamp::from_unix_millis(1_000)).unwrap();
    let node = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "verdict", "exec-2"))
        .unwrap()
        .unwrap();
    assert!(node.lawbook_version.is_none());
}

/// Verifies verification reports ingest as ARTIFACT nodes.
#[test]
fn verification_ingestion_projects_artifact() {
    let (ingestor, operational, timeline) = setup();
    operational
        .put_verification(VerificationReport {
            id: "ver-1".to_string(),
            issue_id: IssueId::new("issue-1"),
            run_id: None,
            status: VerificationStatus::Pass,
            report_hash: "ef".repeat(32),
            created_at: Timestamp::from_unix_millis(700),
        })
        .unwrap();

    ingestor.ingest_verification("ver-1", Timestamp::from_unix_millis(1_000)).unwrap();
    let node = timeline
        .find_node(&NaturalKey::new(SourceSystem::Afu9, "verification_report", "ver-1"))
        .unwrap()
        .unwrap();
    assert_eq!(node.node_type, NodeType::Artifact);

    let err = ingestor
        .ingest_verification("absent", Timestamp::from_unix_millis(0))
        .unwrap_err();
    assert!(matches!(err, IngestError::VerificationNotFound(_)));
}
