// crates/afu9-evidence/tests/chain.rs
// ============================================================================
// Module: Issue Chain Tests
// Description: Tests for chain traversal and the stable ordering contract.
// Purpose: Pin the type-rank / created_at / id ordering across insert orders.
// Dependencies: afu9-core, afu9-evidence, serde_json
// ============================================================================
//! ## Overview
//! Builds the full ISSUE→PR→RUN→DEPLOY→VERDICT spine with artifact fan-outs
//! in scrambled insertion orders and asserts the chain ordering is identical.

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

use afu9_core::Timestamp;
use afu9_evidence::EdgeType;
use afu9_evidence::InMemoryTimelineStore;
use afu9_evidence::NaturalKey;
use afu9_evidence::NodeInput;
use afu9_evidence::NodeType;
use afu9_evidence::SourceSystem;
use afu9_evidence::TimelineStore;
use afu9_evidence::chain_for_issue;
use proptest::prelude::Just;
use proptest::prelude::proptest;
use proptest::prop_assert_eq;
use proptest::strategy::Strategy;
use serde_json::json;

/// Inserts a node with the given key parts and timestamp.
fn put(
    store: &InMemoryTimelineStore,
    source_type: &str,
    source_id: &str,
    node_type: NodeType,
    millis: i64,
) -> i64 {
    store
        .upsert_node(
            &NodeInput {
                key: NaturalKey::new(SourceSystem::Afu9, source_type, source_id),
                node_type,
                title: None,
                url: None,
                payload: json!({ "id": source_id }),
                lawbook_version: None,
            },
            Timestamp::from_unix_millis(millis),
        )
        .unwrap()
        .id
}

/// Builds a populated store in a caller-controlled insert order.
fn build_chain(order: &[&str]) -> InMemoryTimelineStore {
    let store = InMemoryTimelineStore::new();
    let mut ids = std::collections::BTreeMap::new();
    for name in order {
        let id = match *name {
            "issue" => put(&store, "issue", "I1", NodeType::Issue, 100),
            "pr" => put(&store, "pull_request", "42", NodeType::Pr, 200),
            "run" => put(&store, "run", "run-1", NodeType::Run, 300),
            "deploy" => put(&store, "deploy", "7", NodeType::Deploy, 400),
            "verdict" => put(&store, "verdict", "exec-1", NodeType::Verdict, 500),
            "art-a" => put(&store, "run_artifact", "art-a", NodeType::Artifact, 350),
            "art-b" => put(&store, "run_artifact", "art-b", NodeType::Artifact, 340),
            other => panic!("unknown fixture {other}"),
        };
        ids.insert((*name).to_string(), id);
    }
    store.create_edge(ids["issue"], ids["pr"], EdgeType::IssueHasPr, json!({})).unwrap();
    store.create_edge(ids["pr"], ids["run"], EdgeType::PrHasRun, json!({})).unwrap();
    store.create_edge(ids["run"], ids["deploy"], EdgeType::RunHasDeploy, json!({})).unwrap();
    store
        .create_edge(ids["deploy"], ids["verdict"], EdgeType::DeployHasVerdict, json!({}))
        .unwrap();
    store.create_edge(ids["run"], ids["art-a"], EdgeType::HasArtifact, json!({})).unwrap();
    store.create_edge(ids["run"], ids["art-b"], EdgeType::HasArtifact, json!({})).unwrap();
    store
}

/// Verifies the chain orders nodes by type rank, created_at, then id.
#[test]
fn chain_ordering_follows_contract() {
    let store =
        build_chain(&["issue", "pr", "run", "deploy", "verdict", "art-a", "art-b"]);
    let chain = chain_for_issue(&store, "I1", SourceSystem::Afu9).unwrap();

    let kinds: Vec<NodeType> = chain.nodes.iter().map(|node| node.node_type).collect();
    assert_eq!(
        kinds,
        vec![
            NodeType::Issue,
            NodeType::Pr,
            NodeType::Run,
            NodeType::Deploy,
            NodeType::Verdict,
            NodeType::Artifact,
            NodeType::Artifact,
        ]
    );
    // Artifacts tie on type and order by created_at: art-b (340) before art-a (350).
    assert_eq!(chain.nodes[5].key.source_id, "art-b");
    assert_eq!(chain.nodes[6].key.source_id, "art-a");
    assert_eq!(chain.metadata.node_count, 7);
    assert_eq!(chain.metadata.edge_count, 6);
}

/// Verifies the ordering is permutation-stable across insert orders.
#[test]
fn chain_ordering_is_permutation_stable() {
    let reference =
        build_chain(&["issue", "pr", "run", "deploy", "verdict", "art-a", "art-b"]);
    let scrambled =
        build_chain(&["art-b", "verdict", "deploy", "run", "pr", "art-a", "issue"]);

    let a = chain_for_issue(&reference, "I1", SourceSystem::Afu9).unwrap();
    let b = chain_for_issue(&scrambled, "I1", SourceSystem::Afu9).unwrap();

    let shape = |chain: &afu9_evidence::IssueChain| {
        chain
            .nodes
            .iter()
            .map(|node| (node.node_type, node.created_at, node.key.source_id.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&a), shape(&b));
}

proptest! {
    /// Verifies every insert permutation yields the same chain shape.
    #[test]
    fn chain_shape_is_insert_order_independent(
        order in Just(vec!["issue", "pr", "run", "deploy", "verdict", "art-a", "art-b"])
            .prop_shuffle(),
    ) {
        let reference =
            build_chain(&["issue", "pr", "run", "deploy", "verdict", "art-a", "art-b"]);
        let permuted = build_chain(&order);

        let shape = |store: &InMemoryTimelineStore| {
            chain_for_issue(store, "I1", SourceSystem::Afu9)
                .unwrap()
                .nodes
                .iter()
                .map(|node| (node.node_type, node.created_at, node.key.source_id.clone()))
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(shape(&reference), shape(&permuted));
    }
}

/// Verifies an unknown Issue yields an empty chain.
#[test]
fn unknown_issue_yields_empty_chain() {
    let store = InMemoryTimelineStore::new();
    let chain = chain_for_issue(&store, "missing", SourceSystem::Afu9).unwrap();
    assert!(chain.nodes.is_empty());
    assert!(chain.edges.is_empty());
    assert_eq!(chain.metadata.node_count, 0);
}
