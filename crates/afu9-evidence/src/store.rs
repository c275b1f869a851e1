// crates/afu9-evidence/src/store.rs
// ============================================================================
// Module: Timeline Store
// Description: Storage contract and in-memory implementation for the timeline.
// Purpose: Provide idempotent upserts and race-safe edge creation.
// Dependencies: crate::timeline, afu9-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The timeline store resolves concurrent upserts through natural-key
//! uniqueness: identical content is a no-op, differing content is
//! last-writer-wins. Edges and source references are append-only.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use afu9_core::Timestamp;

use crate::timeline::EdgeType;
use crate::timeline::NaturalKey;
use crate::timeline::NodeInput;
use crate::timeline::SourceRef;
use crate::timeline::TimelineEdge;
use crate::timeline::TimelineNode;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by timeline stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineStoreError {
    /// Referenced node does not exist.
    #[error("timeline node not found: {0}")]
    NodeNotFound(i64),
    /// Underlying store failure.
    #[error("timeline store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Store owning timeline nodes, edges, and source references.
pub trait TimelineStore: Send + Sync {
    /// Upserts a node by natural key.
    ///
    /// Returns the stored row; identical content leaves the row untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError`] when persistence fails.
    fn upsert_node(&self, input: &NodeInput, now: Timestamp)
    -> Result<TimelineNode, TimelineStoreError>;

    /// Finds a node by natural key.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError`] when the query fails.
    fn find_node(&self, key: &NaturalKey) -> Result<Option<TimelineNode>, TimelineStoreError>;

    /// Loads a node by store identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError`] when the query fails.
    fn node_by_id(&self, id: i64) -> Result<Option<TimelineNode>, TimelineStoreError>;

    /// Creates an edge; re-creation of an existing edge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError::NodeNotFound`] when either endpoint is
    /// missing.
    fn create_edge(
        &self,
        from_node_id: i64,
        to_node_id: i64,
        edge_type: EdgeType,
        payload: Value,
    ) -> Result<(), TimelineStoreError>;

    /// Returns all edges starting at a node.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError`] when the query fails.
    fn edges_from(&self, node_id: i64) -> Result<Vec<TimelineEdge>, TimelineStoreError>;

    /// Appends a source reference.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError::NodeNotFound`] when the node is missing.
    fn create_source(&self, source: &SourceRef) -> Result<(), TimelineStoreError>;

    /// Returns all source references for a node.
    ///
    /// # Errors
    ///
    /// Returns [`TimelineStoreError`] when the query fails.
    fn sources_for(&self, node_id: i64) -> Result<Vec<SourceRef>, TimelineStoreError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Internal mutable state behind the store mutex.
#[derive(Debug, Default)]
struct TimelineState {
    /// Nodes keyed by store identifier.
    nodes: BTreeMap<i64, TimelineNode>,
    /// Natural-key index to node identifiers.
    by_key: BTreeMap<(String, String, String), i64>,
    /// Edges in insertion order.
    edges: Vec<TimelineEdge>,
    /// Source references in insertion order.
    sources: Vec<SourceRef>,
    /// Next node identifier.
    next_node_id: i64,
}

/// Returns the index key for a natural key.
fn index_key(key: &NaturalKey) -> (String, String, String) {
    (
        key.source_system.as_str().to_string(),
        key.source_type.clone(),
        key.source_id.clone(),
    )
}

/// Mutex-guarded in-memory timeline store.
#[derive(Debug, Default)]
pub struct InMemoryTimelineStore {
    /// Guarded store state.
    inner: Mutex<TimelineState>,
}

impl InMemoryTimelineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, TimelineState>, TimelineStoreError> {
        self.inner
            .lock()
            .map_err(|_| TimelineStoreError::Store("timeline store poisoned".to_string()))
    }
}

impl TimelineStore for InMemoryTimelineStore {
    fn upsert_node(
        &self,
        input: &NodeInput,
        now: Timestamp,
    ) -> Result<TimelineNode, TimelineStoreError> {
        let mut state = self.lock()?;
        if let Some(existing_id) = state.by_key.get(&index_key(&input.key)).copied() {
            let node = state
                .nodes
                .get_mut(&existing_id)
                .ok_or(TimelineStoreError::NodeNotFound(existing_id))?;
            let identical = node.payload == input.payload
                && node.title == input.title
                && node.url == input.url
                && node.lawbook_version == input.lawbook_version;
            if !identical {
                node.payload = input.payload.clone();
                node.title = input.title.clone();
                node.url = input.url.clone();
                node.lawbook_version = input.lawbook_version.clone();
                node.updated_at = now;
            }
            return Ok(node.clone());
        }
        state.next_node_id += 1;
        let id = state.next_node_id;
        let node = TimelineNode {
            id,
            key: input.key.clone(),
            node_type: input.node_type,
            title: input.title.clone(),
            url: input.url.clone(),
            payload: input.payload.clone(),
            lawbook_version: input.lawbook_version.clone(),
            created_at: now,
            updated_at: now,
        };
        state.by_key.insert(index_key(&input.key), id);
        state.nodes.insert(id, node.clone());
        Ok(node)
    }

    fn find_node(&self, key: &NaturalKey) -> Result<Option<TimelineNode>, TimelineStoreError> {
        let state = self.lock()?;
        Ok(state
            .by_key
            .get(&index_key(key))
            .and_then(|id| state.nodes.get(id))
            .cloned())
    }

    fn node_by_id(&self, id: i64) -> Result<Option<TimelineNode>, TimelineStoreError> {
        let state = self.lock()?;
        Ok(state.nodes.get(&id).cloned())
    }

    fn create_edge(
        &self,
        from_node_id: i64,
        to_node_id: i64,
        edge_type: EdgeType,
        payload: Value,
    ) -> Result<(), TimelineStoreError> {
        let mut state = self.lock()?;
        if !state.nodes.contains_key(&from_node_id) {
            return Err(TimelineStoreError::NodeNotFound(from_node_id));
        }
        if !state.nodes.contains_key(&to_node_id) {
            return Err(TimelineStoreError::NodeNotFound(to_node_id));
        }
        let exists = state.edges.iter().any(|edge| {
            edge.from_node_id == from_node_id
                && edge.to_node_id == to_node_id
                && edge.edge_type == edge_type
        });
        if !exists {
            state.edges.push(TimelineEdge {
                from_node_id,
                to_node_id,
                edge_type,
                payload,
            });
        }
        Ok(())
    }

    fn edges_from(&self, node_id: i64) -> Result<Vec<TimelineEdge>, TimelineStoreError> {
        let state = self.lock()?;
        Ok(state
            .edges
            .iter()
            .filter(|edge| edge.from_node_id == node_id)
            .cloned()
            .collect())
    }

    fn create_source(&self, source: &SourceRef) -> Result<(), TimelineStoreError> {
        let mut state = self.lock()?;
        if !state.nodes.contains_key(&source.node_id) {
            return Err(TimelineStoreError::NodeNotFound(source.node_id));
        }
        state.sources.push(source.clone());
        Ok(())
    }

    fn sources_for(&self, node_id: i64) -> Result<Vec<SourceRef>, TimelineStoreError> {
        let state = self.lock()?;
        Ok(state
            .sources
            .iter()
            .filter(|source| source.node_id == node_id)
            .cloned()
            .collect())
    }
}
