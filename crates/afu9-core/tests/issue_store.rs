// crates/afu9-core/tests/issue_store.rs
// ============================================================================
// Module: Issue Store Tests
// Description: Tests for the in-memory Issue store invariants and event log.
// Purpose: Pin single-active enforcement, transitions, and event synthesis.
// Dependencies: afu9-core, serde_json
// ============================================================================
//! ## Overview
//! Ensures the in-memory store enforces Invariants I-1 through I-3 and
//! synthesizes exactly one event per status or handoff change.

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

use afu9_core::ActivationMode;
use afu9_core::Actor;
use afu9_core::CanonicalId;
use afu9_core::HandoffState;
use afu9_core::InMemoryIssueStore;
use afu9_core::IssueDraft;
use afu9_core::IssueEventType;
use afu9_core::IssueFilter;
use afu9_core::IssuePatch;
use afu9_core::IssueStore;
use afu9_core::LocalStatus;
use afu9_core::StoreError;
use afu9_core::Timestamp;
use serde_json::json;

/// Builds a draft with a canonical identifier.
fn draft(title: &str, canonical: &str) -> IssueDraft {
    IssueDraft {
        title: title.to_string(),
        canonical_id: Some(CanonicalId::parse(canonical).unwrap()),
        ..IssueDraft::default()
    }
}

/// Returns a fixed test timestamp.
fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

/// Verifies creation synthesizes exactly one CREATED event.
#[test]
fn create_synthesizes_created_event() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let issue = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();

    let events = store.issue_events(&issue.id, 10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, IssueEventType::Created);
    assert_eq!(events[0].created_at, at(1));
}

/// Verifies duplicate canonical identifiers are rejected.
#[test]
fn duplicate_canonical_id_conflicts() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();
    let err = store.create_issue(&draft("second", "I1"), &actor, at(2)).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

/// Verifies exclusive activation blocks a second ACTIVE Issue.
#[test]
fn second_activation_is_blocked() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let first = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();
    let second = store.create_issue(&draft("second", "I2"), &actor, at(2)).unwrap();

    store.activate_issue(&first.id, ActivationMode::Exclusive, &actor, at(3)).unwrap();
    let err = store
        .activate_issue(&second.id, ActivationMode::Exclusive, &actor, at(4))
        .unwrap_err();
    match err {
        StoreError::SingleActiveViolation {
            current_active,
        } => assert_eq!(current_active, "I1"),
        other => panic!("unexpected error: {other}"),
    }
}

/// Verifies takeover activation parks the previous Issue in HOLD.
#[test]
fn takeover_activation_holds_previous() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let first = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();
    let second = store.create_issue(&draft("second", "I2"), &actor, at(2)).unwrap();

    store.activate_issue(&first.id, ActivationMode::Exclusive, &actor, at(3)).unwrap();
    let activated =
        store.activate_issue(&second.id, ActivationMode::Takeover, &actor, at(4)).unwrap();
    assert_eq!(activated.local_status, LocalStatus::Active);

    let previous = store.get_issue(&first.id).unwrap().unwrap();
    assert_eq!(previous.local_status, LocalStatus::Hold);

    let page = store
        .list_issues(&IssueFilter {
            status: Some(LocalStatus::Active),
            ..IssueFilter::default()
        })
        .unwrap();
    assert_eq!(page.issues.len(), 1);
}

/// Verifies invalid transitions are rejected with both endpoints reported.
#[test]
fn invalid_transition_is_rejected() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let issue = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();

    let err = store
        .transition_issue(&issue.id, LocalStatus::Done, &actor, json!({}), at(2))
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::InvalidTransition {
            from: LocalStatus::Created,
            to: LocalStatus::Done,
        }
    );
}

/// Verifies each status change synthesizes exactly one event.
#[test]
fn status_change_synthesizes_one_event() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let issue = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();

    store.activate_issue(&issue.id, ActivationMode::Exclusive, &actor, at(2)).unwrap();
    let events = store.issue_events(&issue.id, 10).unwrap();
    let status_events: Vec<_> = events
        .iter()
        .filter(|event| event.event_type == IssueEventType::StatusChanged)
        .collect();
    assert_eq!(status_events.len(), 1);
    assert_eq!(status_events[0].payload["from"], "CREATED");
    assert_eq!(status_events[0].payload["to"], "ACTIVE");
    assert_eq!(status_events[0].created_at, at(2));
}

/// Verifies handoff-state changes synthesize a HANDOFF_STATE_CHANGED event.
#[test]
fn handoff_change_synthesizes_event() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let issue = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();

    store
        .patch_issue(
            &issue.id,
            &IssuePatch {
                handoff_state: Some(HandoffState::Sent),
                ..IssuePatch::default()
            },
            &actor,
            at(2),
        )
        .unwrap();

    let events = store.issue_events(&issue.id, 10).unwrap();
    assert!(
        events
            .iter()
            .any(|event| event.event_type == IssueEventType::HandoffStateChanged)
    );
}

/// Verifies terminal transitions clear the execution override flag.
#[test]
fn terminal_transition_clears_override() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let issue = store.create_issue(&draft("first", "I1"), &actor, at(1)).unwrap();
    store
        .patch_issue(
            &issue.id,
            &IssuePatch {
                execution_override: Some(true),
                ..IssuePatch::default()
            },
            &actor,
            at(2),
        )
        .unwrap();

    let killed = store
        .transition_issue(&issue.id, LocalStatus::Killed, &actor, json!({}), at(3))
        .unwrap();
    assert_eq!(killed.local_status, LocalStatus::Killed);
    assert!(!killed.execution_override);
}

/// Verifies the handoff packet renders spec fields into the body.
#[test]
fn handoff_packet_renders_spec() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    let issue = store.create_issue(&draft("gate work", "I1"), &actor, at(1)).unwrap();
    store
        .patch_issue(
            &issue.id,
            &IssuePatch {
                spec: Some(afu9_core::SpecFields {
                    scope: Some("wire the gate".to_string()),
                    acceptance_criteria: vec!["A".to_string(), "B".to_string()],
                    notes: None,
                }),
                labels: Some(vec!["bug".to_string()]),
                ..IssuePatch::default()
            },
            &actor,
            at(2),
        )
        .unwrap();

    let packet = store.for_handoff(&issue.id).unwrap();
    assert_eq!(packet.canonical_id.as_ref().unwrap().as_str(), "I1");
    assert!(packet.body.contains("## Scope"));
    assert!(packet.body.contains("- [ ] A"));
    assert!(packet.body.contains("- [ ] B"));
    assert_eq!(packet.labels, vec!["bug"]);
    assert_eq!(packet.handoff_state, HandoffState::NotSent);
}

/// Verifies listing clamps the page size to the hard maximum.
#[test]
fn listing_clamps_limit() {
    let store = InMemoryIssueStore::new();
    let actor = Actor::system();
    for idx in 0..5 {
        let draft = IssueDraft {
            title: format!("issue {idx}"),
            ..IssueDraft::default()
        };
        store.create_issue(&draft, &actor, at(idx)).unwrap();
    }
    let page = store
        .list_issues(&IssueFilter {
            limit: Some(100_000),
            offset: Some(2),
            ..IssueFilter::default()
        })
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.issues.len(), 3);
    assert_eq!(page.issues[0].public_id, 3);
}
