// crates/afu9-core/tests/state_machine.rs
// ============================================================================
// Module: State Machine Tests
// Description: Tests for transition validity and effective-status derivation.
// Purpose: Pin the state graph and precedence rules as a public contract.
// Dependencies: afu9-core
// ============================================================================
//! ## Overview
//! Exercises the full transition graph pairwise and the effective-status
//! precedence, including the closed-state semantic protection.

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

use afu9_core::ALL_LOCAL_STATUSES;
use afu9_core::ExecutionState;
use afu9_core::ForgeMirrorStatus;
use afu9_core::LocalStatus;
use afu9_core::effective_status;
use afu9_core::is_valid;
use afu9_core::map_mirror_to_local;

/// Returns the expected allowed pairs of the transition graph.
fn expected_transitions() -> Vec<(LocalStatus, LocalStatus)> {
    use LocalStatus as S;
    let mut pairs = vec![
        (S::Created, S::Active),
        (S::Created, S::SpecReady),
        (S::Active, S::SpecReady),
        (S::SpecReady, S::ImplementingPrep),
        (S::SpecReady, S::Implementing),
        (S::ImplementingPrep, S::Implementing),
        (S::ImplementingPrep, S::ReviewReady),
        (S::Implementing, S::ReviewReady),
        (S::Implementing, S::Verified),
        (S::ReviewReady, S::Verified),
        (S::ReviewReady, S::MergeReady),
        (S::Verified, S::MergeReady),
        (S::Verified, S::Done),
        (S::MergeReady, S::Done),
        (S::Hold, S::Active),
    ];
    for from in ALL_LOCAL_STATUSES {
        if from.is_terminal() {
            continue;
        }
        if from != S::Hold {
            pairs.push((from, S::Hold));
        }
        pairs.push((from, S::Killed));
    }
    pairs
}

/// Verifies `is_valid` accepts exactly the pairs of the declared graph.
#[test]
fn transition_graph_is_closed() {
    let allowed = expected_transitions();
    for from in ALL_LOCAL_STATUSES {
        for to in ALL_LOCAL_STATUSES {
            let expected = allowed.contains(&(from, to));
            assert_eq!(
                is_valid(from, to),
                expected,
                "transition {from} -> {to} disagreed with the graph"
            );
        }
    }
}

/// Verifies terminal states never transition anywhere.
#[test]
fn terminal_states_block_all_transitions() {
    for to in ALL_LOCAL_STATUSES {
        assert!(!is_valid(LocalStatus::Done, to));
        assert!(!is_valid(LocalStatus::Killed, to));
    }
}

/// Verifies self-transitions are never transitions.
#[test]
fn self_transitions_are_invalid() {
    for status in ALL_LOCAL_STATUSES {
        assert!(!is_valid(status, status));
    }
}

/// Verifies the mirror mapping table matches the contract.
#[test]
fn mirror_mapping_matches_contract() {
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Todo), Some(LocalStatus::SpecReady));
    assert_eq!(
        map_mirror_to_local(ForgeMirrorStatus::InProgress),
        Some(LocalStatus::Implementing)
    );
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::InReview), Some(LocalStatus::MergeReady));
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Done), Some(LocalStatus::Done));
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Blocked), Some(LocalStatus::Hold));
}

/// Verifies a bare closed signal never yields a completion opinion.
#[test]
fn closed_mirror_state_has_no_opinion() {
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Closed), None);
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Open), None);
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Error), None);
    assert_eq!(map_mirror_to_local(ForgeMirrorStatus::Unknown), None);
}

/// Verifies a running execution pins the local status.
#[test]
fn running_execution_wins_precedence() {
    let derived = effective_status(
        LocalStatus::Implementing,
        ForgeMirrorStatus::Done,
        ExecutionState::Running,
    );
    assert_eq!(derived, LocalStatus::Implementing);
}

/// Verifies a mapped mirror status overrides the local status when idle.
#[test]
fn mirror_opinion_wins_when_idle() {
    let derived = effective_status(
        LocalStatus::Implementing,
        ForgeMirrorStatus::InReview,
        ExecutionState::Idle,
    );
    assert_eq!(derived, LocalStatus::MergeReady);
}

/// Verifies the local status stands when the mirror has no opinion.
#[test]
fn local_status_stands_without_mirror_opinion() {
    let derived = effective_status(
        LocalStatus::SpecReady,
        ForgeMirrorStatus::Closed,
        ExecutionState::Idle,
    );
    assert_eq!(derived, LocalStatus::SpecReady);
}
