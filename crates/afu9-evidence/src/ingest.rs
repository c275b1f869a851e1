// crates/afu9-evidence/src/ingest.rs
// ============================================================================
// Module: Evidence Ingestors
// Description: Idempotent projection of operational rows into the timeline.
// Purpose: Turn runs, deploys, verdicts, and verification reports into evidence.
// Dependencies: afu9-core, afu9-policy, crate::{store, timeline}, serde_json, thiserror
// ============================================================================

//! ## Overview
//! All four ingestors share one skeleton: fetch the source row, compute its
//! natural key, upsert the node, record a [`SourceRef`] carrying
//! `sha256(canonicalJSON(row))`, and create edges. Every node written by one
//! call carries the same `fetched_at` timestamp. Sources are never mutated.
//! Transient store reads retry exactly once; everything else fails with a
//! typed error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use afu9_core::ErrorCode;
use afu9_core::LawbookId;
use afu9_core::OperationalStore;
use afu9_core::RunId;
use afu9_core::StoreError;
use afu9_core::Timestamp;
use afu9_core::hashing::sha256_hex_canonical;
use afu9_policy::LawbookResolver;

use crate::store::TimelineStore;
use crate::store::TimelineStoreError;
use crate::timeline::EdgeType;
use crate::timeline::NaturalKey;
use crate::timeline::NodeInput;
use crate::timeline::NodeType;
use crate::timeline::SourceRef;
use crate::timeline::SourceSystem;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by evidence ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Run row not found.
    #[error("run not found: {0}")]
    RunNotFound(String),
    /// Deploy event row not found.
    #[error("deploy event not found: {0}")]
    DeployNotFound(i64),
    /// Verdict row not found.
    #[error("verdict not found: {0}")]
    VerdictNotFound(String),
    /// Verification report row not found.
    #[error("verification report not found: {0}")]
    VerificationNotFound(String),
    /// Ingestion failed for any other reason.
    #[error("ingestion failed: {0}")]
    Failed(String),
}

impl IngestError {
    /// Returns the stable error code for API surfacing.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::RunNotFound(_) => ErrorCode::RunNotFound,
            Self::DeployNotFound(_) => ErrorCode::DeployNotFound,
            Self::VerdictNotFound(_) => ErrorCode::VerdictNotFound,
            Self::VerificationNotFound(_) => ErrorCode::VerificationNotFound,
            Self::Failed(_) => ErrorCode::IngestionFailed,
        }
    }
}

impl From<TimelineStoreError> for IngestError {
    fn from(error: TimelineStoreError) -> Self {
        Self::Failed(error.to_string())
    }
}

// ============================================================================
// SECTION: Ingestion Report
// ============================================================================

/// Summary of one ingestion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Identifier of the root node for the ingested entity.
    pub root_node_id: i64,
    /// Nodes touched (created or refreshed) by the call.
    pub nodes_touched: usize,
    /// Edges ensured by the call.
    pub edges_touched: usize,
}

// ============================================================================
// SECTION: Ingestor
// ============================================================================

/// Evidence ingestor projecting operational rows into the timeline.
pub struct EvidenceIngestor {
    /// Operational store the rows are read from.
    operational: Arc<dyn OperationalStore>,
    /// Timeline store the projections are written to.
    timeline: Arc<dyn TimelineStore>,
    /// Resolver supplying the passive rulebook version stamp.
    resolver: Arc<LawbookResolver>,
    /// Rulebook id used for stamping.
    lawbook_id: LawbookId,
}

impl EvidenceIngestor {
    /// Creates an ingestor.
    #[must_use]
    pub fn new(
        operational: Arc<dyn OperationalStore>,
        timeline: Arc<dyn TimelineStore>,
        resolver: Arc<LawbookResolver>,
        lawbook_id: LawbookId,
    ) -> Self {
        Self {
            operational,
            timeline,
            resolver,
            lawbook_id,
        }
    }

    /// Returns the passive rulebook version stamp (null tolerated).
    fn lawbook_version(&self, now: Timestamp) -> Option<String> {
        self.resolver.get_active_version(&self.lawbook_id, now).ok().flatten()
    }

    /// Ingests a run: one RUN node, one ARTIFACT node per step and per
    /// produced artifact, and the matching fan-out edges.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::RunNotFound`] when the run does not exist and
    /// [`IngestError::Failed`] on any other failure.
    pub fn ingest_run(&self, run_id: &RunId, now: Timestamp) -> Result<IngestReport, IngestError> {
        let bundle = retry_once(|| self.operational.run(run_id))
            .map_err(|err| IngestError::Failed(err.to_string()))?
            .ok_or_else(|| IngestError::RunNotFound(run_id.as_str().to_string()))?;
        let lawbook_version = self.lawbook_version(now);

        let run_hash = sha256_hex_canonical(&bundle.run)
            .map_err(|err| IngestError::Failed(err.to_string()))?;
        let run_node = self.timeline.upsert_node(
            &NodeInput {
                key: NaturalKey::new(SourceSystem::Afu9, "run", run_id.as_str()),
                node_type: NodeType::Run,
                title: Some(format!("run {run_id} ({})", bundle.run.kind)),
                url: None,
                payload: json!({
                    "run": bundle.run,
                    "stepCount": bundle.steps.len(),
                    "artifactCount": bundle.artifacts.len(),
                    "fetched_at": now.as_unix_millis(),
                }),
                lawbook_version: lawbook_version.clone(),
            },
            now,
        )?;
        self.timeline.create_source(&SourceRef {
            node_id: run_node.id,
            source_kind: "run_row".to_string(),
            ref_json: json!({ "runId": run_id.as_str() }),
            sha256: run_hash,
        })?;

        let mut nodes_touched = 1;
        let mut edges_touched = 0;

        for step in &bundle.steps {
            let step_hash =
                sha256_hex_canonical(step).map_err(|err| IngestError::Failed(err.to_string()))?;
            let step_node = self.timeline.upsert_node(
                &NodeInput {
                    key: NaturalKey::new(
                        SourceSystem::Afu9,
                        "run_step",
                        format!("{run_id}:{}", step.idx),
                    ),
                    node_type: NodeType::Artifact,
                    title: Some(format!("step {} {}", step.idx, step.name)),
                    url: None,
                    payload: json!({
                        "step": step,
                        "fetched_at": now.as_unix_millis(),
                    }),
                    lawbook_version: lawbook_version.clone(),
                },
                now,
            )?;
            self.timeline.create_source(&SourceRef {
                node_id: step_node.id,
                source_kind: "run_step_row".to_string(),
                ref_json: json!({ "runId": run_id.as_str(), "idx": step.idx }),
                sha256: step_hash,
            })?;
            self.timeline.create_edge(
                run_node.id,
                step_node.id,
                EdgeType::HasArtifact,
                json!({ "kind": "step" }),
            )?;
            nodes_touched += 1;
            edges_touched += 1;
        }

        for artifact in &bundle.artifacts {
            let artifact_hash = sha256_hex_canonical(artifact)
                .map_err(|err| IngestError::Failed(err.to_string()))?;
            let artifact_node = self.timeline.upsert_node(
                &NodeInput {
                    key: NaturalKey::new(SourceSystem::Afu9, "run_artifact", &artifact.id),
                    node_type: NodeType::Artifact,
                    title: Some(format!("artifact {} ({})", artifact.id, artifact.kind)),
                    url: None,
                    payload: json!({
                        "artifact": artifact,
                        "fetched_at": now.as_unix_millis(),
                    }),
                    lawbook_version: lawbook_version.clone(),
                },
                now,
            )?;
            self.timeline.create_source(&SourceRef {
                node_id: artifact_node.id,
                source_kind: "run_artifact_row".to_string(),
                ref_json: json!({ "artifactId": artifact.id }),
                sha256: artifact_hash,
            })?;
            self.timeline.create_edge(
                run_node.id,
                artifact_node.id,
                EdgeType::HasArtifact,
                json!({ "kind": artifact.kind }),
            )?;
            nodes_touched += 1;
            edges_touched += 1;
        }

        Ok(IngestReport {
            root_node_id: run_node.id,
            nodes_touched,
            edges_touched,
        })
    }

    /// Ingests a deploy event into one DEPLOY node.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::DeployNotFound`] when the row does not exist and
    /// [`IngestError::Failed`] on any other failure.
    pub fn ingest_deploy(&self, deploy_id: i64, now: Timestamp) -> Result<IngestReport, IngestError> {
        let event = retry_once(|| self.operational.deploy_event(deploy_id))
            .map_err(|err| IngestError::Failed(err.to_string()))?
            .ok_or(IngestError::DeployNotFound(deploy_id))?;
        let hash =
            sha256_hex_canonical(&event).map_err(|err| IngestError::Failed(err.to_string()))?;

        let node = self.timeline.upsert_node(
            &NodeInput {
                key: NaturalKey::new(SourceSystem::Afu9, "deploy", deploy_id.to_string()),
                node_type: NodeType::Deploy,
                title: Some(format!("deploy {} {} {}", event.service, event.version, event.env)),
                url: None,
                payload: json!({
                    "env": event.env,
                    "service": event.service,
                    "version": event.version,
                    "commitHash": event.commit_hash,
                    "status": event.status,
                    "fetched_at": now.as_unix_millis(),
                }),
                lawbook_version: self.lawbook_version(now),
            },
            now,
        )?;
        self.timeline.create_source(&SourceRef {
            node_id: node.id,
            source_kind: "deploy_row".to_string(),
            ref_json: json!({ "deployId": deploy_id }),
            sha256: hash,
        })?;
        Ok(IngestReport {
            root_node_id: node.id,
            nodes_touched: 1,
            edges_touched: 0,
        })
    }

    /// Ingests a verdict into one VERDICT node.
    ///
    /// The `lawbookVersion` stamp joins the verdict's policy snapshot; a
    /// missing snapshot yields a null stamp rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::VerdictNotFound`] when the row does not exist
    /// and [`IngestError::Failed`] on any other failure.
    pub fn ingest_verdict(
        &self,
        execution_id: &str,
        now: Timestamp,
    ) -> Result<IngestReport, IngestError> {
        let verdict = retry_once(|| self.operational.verdict(execution_id))
            .map_err(|err| IngestError::Failed(err.to_string()))?
            .ok_or_else(|| IngestError::VerdictNotFound(execution_id.to_string()))?;
        let hash =
            sha256_hex_canonical(&verdict).map_err(|err| IngestError::Failed(err.to_string()))?;
        let snapshot_version = retry_once(|| {
            self.operational.policy_snapshot(&verdict.policy_snapshot_id)
        })
        .map_err(|err| IngestError::Failed(err.to_string()))?
        .map(|snapshot| snapshot.version);

        let node = self.timeline.upsert_node(
            &NodeInput {
                key: NaturalKey::new(SourceSystem::Afu9, "verdict", execution_id),
                node_type: NodeType::Verdict,
                title: Some(format!("verdict {} ({})", execution_id, verdict.proposed_action)),
                url: None,
                payload: json!({
                    "verdict": verdict,
                    "fetched_at": now.as_unix_millis(),
                }),
                lawbook_version: snapshot_version,
            },
            now,
        )?;
        self.timeline.create_source(&SourceRef {
            node_id: node.id,
            source_kind: "verdict_row".to_string(),
            ref_json: json!({ "executionId": execution_id }),
            sha256: hash,
        })?;
        Ok(IngestReport {
            root_node_id: node.id,
            nodes_touched: 1,
            edges_touched: 0,
        })
    }

    /// Ingests a verification report into one ARTIFACT node.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::VerificationNotFound`] when the row does not
    /// exist and [`IngestError::Failed`] on any other failure.
    pub fn ingest_verification(
        &self,
        report_id: &str,
        now: Timestamp,
    ) -> Result<IngestReport, IngestError> {
        let report = retry_once(|| self.operational.verification_report(report_id))
            .map_err(|err| IngestError::Failed(err.to_string()))?
            .ok_or_else(|| IngestError::VerificationNotFound(report_id.to_string()))?;
        let hash =
            sha256_hex_canonical(&report).map_err(|err| IngestError::Failed(err.to_string()))?;

        let node = self.timeline.upsert_node(
            &NodeInput {
                key: NaturalKey::new(SourceSystem::Afu9, "verification_report", report_id),
                node_type: NodeType::Artifact,
                title: Some(format!("verification {report_id}")),
                url: None,
                payload: json!({
                    "report": report,
                    "fetched_at": now.as_unix_millis(),
                }),
                lawbook_version: self.lawbook_version(now),
            },
            now,
        )?;
        self.timeline.create_source(&SourceRef {
            node_id: node.id,
            source_kind: "verification_report_row".to_string(),
            ref_json: json!({ "reportId": report_id }),
            sha256: hash,
        })?;
        Ok(IngestReport {
            root_node_id: node.id,
            nodes_touched: 1,
            edges_touched: 0,
        })
    }
}

// ============================================================================
// SECTION: Retry Helper
// ============================================================================

/// Retries a store read exactly once on transient errors.
fn retry_once<T>(
    mut read: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    match read() {
        Ok(value) => Ok(value),
        Err(StoreError::Io(_) | StoreError::Unavailable(_)) => read(),
        Err(err) => Err(err),
    }
}
