// crates/afu9-evidence/src/chain.rs
// ============================================================================
// Module: Issue Chain Query
// Description: Traversal and stable ordering for the chain of an Issue.
// Purpose: Provide the permutation-stable chain contract consumers depend on.
// Dependencies: crate::{store, timeline}, afu9-core, serde
// ============================================================================

//! ## Overview
//! `chain_for_issue` seeds at the ISSUE node, walks the
//! `ISSUE_HAS_PR → PR_HAS_RUN → RUN_HAS_DEPLOY → DEPLOY_HAS_VERDICT` spine
//! plus every artifact/comment fan-out, and returns nodes in the fixed
//! ordering: node type rank, then `created_at` ascending, then `id` ascending.
//! The ordering is part of the public contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;

use crate::store::TimelineStore;
use crate::store::TimelineStoreError;
use crate::timeline::NaturalKey;
use crate::timeline::SourceSystem;
use crate::timeline::TimelineEdge;
use crate::timeline::TimelineNode;

// ============================================================================
// SECTION: Chain Result
// ============================================================================

/// Metadata describing a chain query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    /// Issue identifier queried.
    pub issue_id: String,
    /// Source system queried.
    pub source_system: SourceSystem,
    /// Reachable node count.
    pub node_count: usize,
    /// Reachable edge count.
    pub edge_count: usize,
}

/// Chain of an Issue: ordered nodes, ordered edges, metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueChain {
    /// Nodes in the contract ordering.
    pub nodes: Vec<TimelineNode>,
    /// Edges ordered by (from, to, type).
    pub edges: Vec<TimelineEdge>,
    /// Query metadata.
    pub metadata: ChainMetadata,
}

// ============================================================================
// SECTION: Traversal
// ============================================================================

/// Computes the chain for an Issue.
///
/// An unknown Issue yields an empty chain rather than an error: absence of
/// evidence is a valid, queryable state.
///
/// # Errors
///
/// Returns [`TimelineStoreError`] when the store fails.
pub fn chain_for_issue(
    store: &dyn TimelineStore,
    issue_id: &str,
    source_system: SourceSystem,
) -> Result<IssueChain, TimelineStoreError> {
    let seed = store.find_node(&NaturalKey::new(source_system, "issue", issue_id))?;
    let Some(seed) = seed else {
        return Ok(IssueChain {
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata: ChainMetadata {
                issue_id: issue_id.to_string(),
                source_system,
                node_count: 0,
                edge_count: 0,
            },
        });
    };

    let mut visited: BTreeSet<i64> = BTreeSet::new();
    let mut nodes: Vec<TimelineNode> = Vec::new();
    let mut edges: Vec<TimelineEdge> = Vec::new();
    let mut queue: VecDeque<TimelineNode> = VecDeque::new();

    visited.insert(seed.id);
    queue.push_back(seed);

    while let Some(node) = queue.pop_front() {
        let node_id = node.id;
        nodes.push(node);
        for edge in store.edges_from(node_id)? {
            let target = edge.to_node_id;
            edges.push(edge);
            if visited.insert(target)
                && let Some(next) = store.node_by_id(target)?
            {
                queue.push_back(next);
            }
        }
    }

    nodes.sort_by(|a, b| {
        a.node_type
            .order_rank()
            .cmp(&b.node_type.order_rank())
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    edges.sort_by(|a, b| {
        a.from_node_id
            .cmp(&b.from_node_id)
            .then(a.to_node_id.cmp(&b.to_node_id))
            .then(a.edge_type.cmp(&b.edge_type))
    });

    let metadata = ChainMetadata {
        issue_id: issue_id.to_string(),
        source_system,
        node_count: nodes.len(),
        edge_count: edges.len(),
    };
    Ok(IssueChain {
        nodes,
        edges,
        metadata,
    })
}
