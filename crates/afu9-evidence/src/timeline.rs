// crates/afu9-evidence/src/timeline.rs
// ============================================================================
// Module: Timeline Model
// Description: Content-addressed nodes, typed edges, and source references.
// Purpose: Define the linkage graph evidence ingestion projects into.
// Dependencies: afu9-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The timeline is a graph of nodes upserted by natural key
//! `(source_system, source_type, source_id)` with typed edges from a closed
//! set. Nodes reference operational rows by string keys only, never by foreign
//! key, so entities can be ingested in any order. Every ingested node carries
//! at least one [`SourceRef`] with the canonical-JSON hash of its source row.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use afu9_core::Timestamp;

// ============================================================================
// SECTION: Source Systems
// ============================================================================

/// System a timeline node originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    /// Local AFU-9 operational store.
    Afu9,
    /// External Forge host.
    Forge,
}

impl SourceSystem {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Afu9 => "afu9",
            Self::Forge => "forge",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Node Types
// ============================================================================

/// Closed set of node types.
///
/// # Invariants
/// - The declared order is the chain ordering contract: ISSUE, PR, RUN,
///   DEPLOY, VERDICT, ARTIFACT, COMMENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Issue node.
    Issue,
    /// Pull request node.
    Pr,
    /// Run node.
    Run,
    /// Deploy node.
    Deploy,
    /// Verdict node.
    Verdict,
    /// Artifact node.
    Artifact,
    /// Comment node.
    Comment,
}

impl NodeType {
    /// Returns the chain ordering rank.
    #[must_use]
    pub const fn order_rank(self) -> u8 {
        match self {
            Self::Issue => 0,
            Self::Pr => 1,
            Self::Run => 2,
            Self::Deploy => 3,
            Self::Verdict => 4,
            Self::Artifact => 5,
            Self::Comment => 6,
        }
    }

    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Issue => "ISSUE",
            Self::Pr => "PR",
            Self::Run => "RUN",
            Self::Deploy => "DEPLOY",
            Self::Verdict => "VERDICT",
            Self::Artifact => "ARTIFACT",
            Self::Comment => "COMMENT",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Edge Types
// ============================================================================

/// Closed set of edge types.
///
/// The `*_HAS_ARTIFACT` and `*_HAS_COMMENT` families are represented by one
/// variant each; the `*` prefix is derivable from the from-node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Issue owns a pull request.
    IssueHasPr,
    /// Pull request owns a run.
    PrHasRun,
    /// Run owns a deploy.
    RunHasDeploy,
    /// Deploy owns a verdict.
    DeployHasVerdict,
    /// Fan-out to an artifact node.
    HasArtifact,
    /// Fan-out to a comment node.
    HasComment,
}

impl EdgeType {
    /// Returns the stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IssueHasPr => "ISSUE_HAS_PR",
            Self::PrHasRun => "PR_HAS_RUN",
            Self::RunHasDeploy => "RUN_HAS_DEPLOY",
            Self::DeployHasVerdict => "DEPLOY_HAS_VERDICT",
            Self::HasArtifact => "HAS_ARTIFACT",
            Self::HasComment => "HAS_COMMENT",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Natural key identifying a node across systems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    /// Originating system.
    pub source_system: SourceSystem,
    /// Source row type (e.g. `issue`, `run`, `verification_report`).
    pub source_type: String,
    /// Source row identifier.
    pub source_id: String,
}

impl NaturalKey {
    /// Builds a natural key.
    #[must_use]
    pub fn new(
        source_system: SourceSystem,
        source_type: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            source_system,
            source_type: source_type.into(),
            source_id: source_id.into(),
        }
    }
}

/// Timeline node row.
///
/// # Invariants
/// - `(source_system, source_type, source_id)` is unique.
/// - Re-upserting identical content is a no-op; differing content updates the
///   row in place and bumps `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineNode {
    /// Store-assigned node identifier.
    pub id: i64,
    /// Natural key.
    pub key: NaturalKey,
    /// Node type.
    pub node_type: NodeType,
    /// Display title.
    pub title: Option<String>,
    /// Link to the source entity.
    pub url: Option<String>,
    /// Projected payload.
    pub payload: Value,
    /// Rulebook version stamped at ingestion.
    pub lawbook_version: Option<String>,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

/// Input for a node upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInput {
    /// Natural key.
    pub key: NaturalKey,
    /// Node type.
    pub node_type: NodeType,
    /// Display title.
    pub title: Option<String>,
    /// Link to the source entity.
    pub url: Option<String>,
    /// Projected payload.
    pub payload: Value,
    /// Rulebook version stamped at ingestion.
    pub lawbook_version: Option<String>,
}

/// Timeline edge row.
///
/// # Invariants
/// - `(from_node_id, to_node_id, edge_type)` is unique; re-creation is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEdge {
    /// Source node identifier.
    pub from_node_id: i64,
    /// Target node identifier.
    pub to_node_id: i64,
    /// Edge type.
    pub edge_type: EdgeType,
    /// Edge payload.
    pub payload: Value,
}

/// Source reference recording provenance for a node.
///
/// # Invariants
/// - Append-only; `sha256` is the canonical-JSON hash of the source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Node the reference belongs to.
    pub node_id: i64,
    /// Source kind label (e.g. `run_row`, `deploy_row`).
    pub source_kind: String,
    /// Pointer back to the source row.
    pub ref_json: Value,
    /// Canonical-JSON SHA-256 of the source row.
    pub sha256: String,
}
