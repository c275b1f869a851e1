// crates/afu9-evidence/src/lib.rs
// ============================================================================
// Module: AFU-9 Evidence Library
// Description: Timeline graph, evidence ingestion, and postmortem generation.
// Purpose: Expose the content-addressed evidence layer of the control plane.
// Dependencies: crate::{chain, incident, ingest, postmortem, store, timeline}
// ============================================================================

//! ## Overview
//! The evidence crate owns the timeline graph (nodes, edges, source refs),
//! the four idempotent ingestors that project operational rows into it, and
//! the deterministic postmortem generator. Everything here is replayable:
//! identical inputs produce identical hashes and identical store states.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod chain;
pub mod incident;
pub mod ingest;
pub mod postmortem;
pub mod store;
pub mod timeline;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use chain::ChainMetadata;
pub use chain::IssueChain;
pub use chain::chain_for_issue;
pub use incident::EvidenceItem;
pub use incident::InMemoryIncidentStore;
pub use incident::Incident;
pub use incident::IncidentEvent;
pub use incident::IncidentStatus;
pub use incident::IncidentStore;
pub use incident::IncidentStoreError;
pub use incident::OutcomeRecord;
pub use incident::RemediationRun;
pub use ingest::EvidenceIngestor;
pub use ingest::IngestError;
pub use ingest::IngestReport;
pub use postmortem::PostmortemArtifact;
pub use postmortem::PostmortemError;
pub use postmortem::PostmortemOutcome;
pub use postmortem::compute_postmortem_hash;
pub use postmortem::generate_postmortem;
pub use store::InMemoryTimelineStore;
pub use store::TimelineStore;
pub use store::TimelineStoreError;
pub use timeline::EdgeType;
pub use timeline::NaturalKey;
pub use timeline::NodeInput;
pub use timeline::NodeType;
pub use timeline::SourceRef;
pub use timeline::SourceSystem;
pub use timeline::TimelineEdge;
pub use timeline::TimelineNode;
