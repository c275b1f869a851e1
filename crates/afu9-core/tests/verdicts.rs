// crates/afu9-core/tests/verdicts.rs
// ============================================================================
// Module: Verdict Service Tests
// Description: Tests for GREEN/HOLD/RED verdict application.
// Purpose: Pin the verdict ladder and event emission contract.
// Dependencies: afu9-core, serde_json
// ============================================================================
//! ## Overview
//! Verifies the verdict ladder (GREEN advances, RED/HOLD park in HOLD,
//! terminal states refuse) and that VERDICT_SET is always recorded while
//! STATUS_CHANGED appears only on real moves.

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
use afu9_core::InMemoryIssueStore;
use afu9_core::IssueDraft;
use afu9_core::IssueEventType;
use afu9_core::IssueStore;
use afu9_core::LocalStatus;
use afu9_core::Timestamp;
use afu9_core::VerdictError;
use afu9_core::VerdictSignal;
use afu9_core::apply_verdict;
use afu9_core::verdict_target;
use serde_json::json;

/// Creates an Issue advanced to the given status.
fn issue_in_status(store: &InMemoryIssueStore, status: LocalStatus) -> afu9_core::IssueId {
    let actor = Actor::system();
    let now = Timestamp::from_unix_millis(0);
    let issue = store
        .create_issue(
            &IssueDraft {
                title: "verdict target".to_string(),
                ..IssueDraft::default()
            },
            &actor,
            now,
        )
        .unwrap();
    let path: &[LocalStatus] = match status {
        LocalStatus::Created => &[],
        LocalStatus::Active => &[LocalStatus::Active],
        LocalStatus::Implementing => {
            &[LocalStatus::SpecReady, LocalStatus::ImplementingPrep, LocalStatus::Implementing]
        }
        LocalStatus::Verified => &[
            LocalStatus::SpecReady,
            LocalStatus::ImplementingPrep,
            LocalStatus::Implementing,
            LocalStatus::Verified,
        ],
        LocalStatus::Killed => &[LocalStatus::Killed],
        other => panic!("unsupported fixture status {other}"),
    };
    for step in path {
        if *step == LocalStatus::Active {
            store.activate_issue(&issue.id, ActivationMode::Exclusive, &actor, now).unwrap();
        } else {
            store.transition_issue(&issue.id, *step, &actor, json!({}), now).unwrap();
        }
    }
    issue.id
}

/// Verifies the pure verdict target function.
#[test]
fn verdict_targets_follow_the_ladder() {
    assert_eq!(
        verdict_target(LocalStatus::Implementing, VerdictSignal::Green),
        LocalStatus::Verified
    );
    assert_eq!(verdict_target(LocalStatus::Verified, VerdictSignal::Green), LocalStatus::Done);
    assert_eq!(
        verdict_target(LocalStatus::SpecReady, VerdictSignal::Green),
        LocalStatus::SpecReady
    );
    assert_eq!(verdict_target(LocalStatus::Active, VerdictSignal::Red), LocalStatus::Hold);
    assert_eq!(verdict_target(LocalStatus::Implementing, VerdictSignal::Hold), LocalStatus::Hold);
}

/// Verifies GREEN on IMPLEMENTING advances to VERIFIED with both events.
#[test]
fn green_advances_implementing_issue() {
    let store = InMemoryIssueStore::new();
    let id = issue_in_status(&store, LocalStatus::Implementing);
    let actor = Actor::system();

    let outcome =
        apply_verdict(&store, &id, VerdictSignal::Green, &actor, Timestamp::from_unix_millis(9))
            .unwrap();
    assert_eq!(outcome.new_status, LocalStatus::Verified);
    assert!(outcome.state_changed);

    let events = store.issue_events(&id, 20).unwrap();
    assert!(events.iter().any(|event| event.event_type == IssueEventType::VerdictSet));
}

/// Verifies GREEN elsewhere records the verdict without a status change.
#[test]
fn green_elsewhere_is_a_recorded_noop() {
    let store = InMemoryIssueStore::new();
    let id = issue_in_status(&store, LocalStatus::Active);
    let actor = Actor::system();

    let before = store.issue_events(&id, 50).unwrap().len();
    let outcome =
        apply_verdict(&store, &id, VerdictSignal::Green, &actor, Timestamp::from_unix_millis(9))
            .unwrap();
    assert_eq!(outcome.new_status, LocalStatus::Active);
    assert!(!outcome.state_changed);

    let events = store.issue_events(&id, 50).unwrap();
    assert_eq!(events.len(), before + 1);
    assert_eq!(events[0].event_type, IssueEventType::VerdictSet);
}

/// Verifies RED parks any non-terminal Issue in HOLD.
#[test]
fn red_parks_issue_in_hold() {
    let store = InMemoryIssueStore::new();
    let id = issue_in_status(&store, LocalStatus::Implementing);
    let actor = Actor::system();

    let outcome =
        apply_verdict(&store, &id, VerdictSignal::Red, &actor, Timestamp::from_unix_millis(9))
            .unwrap();
    assert_eq!(outcome.new_status, LocalStatus::Hold);
    assert!(outcome.state_changed);
}

/// Verifies terminal Issues refuse verdicts.
#[test]
fn terminal_issue_refuses_verdicts() {
    let store = InMemoryIssueStore::new();
    let id = issue_in_status(&store, LocalStatus::Killed);
    let actor = Actor::system();

    let err =
        apply_verdict(&store, &id, VerdictSignal::Green, &actor, Timestamp::from_unix_millis(9))
            .unwrap_err();
    assert!(matches!(err, VerdictError::TerminalStatus(_, LocalStatus::Killed)));
}
