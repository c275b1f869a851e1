// crates/afu9-sync/tests/classify.rs
// ============================================================================
// Module: Status Classifier Tests
// Description: Tests for mirror-status extraction and target derivation.
// Purpose: Pin the classifier priority and the closed-state protection.
// Dependencies: afu9-core, afu9-sync
// ============================================================================
//! ## Overview
//! Verifies project status beats labels beats issue state, the closed-state
//! semantic protection, and the PR-evidence target ladder.

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

use afu9_core::ForgeMirrorStatus;
use afu9_core::LocalStatus;
use afu9_core::map_mirror_to_local;
use afu9_sync::CheckConclusion;
use afu9_sync::CheckStatus;
use afu9_sync::ForgeCheckRun;
use afu9_sync::ForgePullRequest;
use afu9_sync::ForgeReview;
use afu9_sync::PullRequestEvidence;
use afu9_sync::ReviewState;
use afu9_sync::determine_target_status;
use afu9_sync::extract_mirror_status;
use afu9_sync::status_label;
use afu9_sync::status_label_diff;
use proptest::collection::vec;
use proptest::prelude::proptest;
use proptest::prop_assert_ne;

/// Builds an open, non-draft pull request snapshot.
fn open_pr() -> ForgePullRequest {
    ForgePullRequest {
        number: 42,
        state: "open".to_string(),
        merged: false,
        draft: false,
        url: "https://forge.example/pr/42".to_string(),
        head_branch: "afu9/I7".to_string(),
    }
}

/// Builds a passing required check.
fn green_check() -> ForgeCheckRun {
    ForgeCheckRun {
        name: "ci".to_string(),
        status: CheckStatus::Completed,
        conclusion: Some(CheckConclusion::Success),
        required: true,
    }
}

/// Verifies project status takes priority over labels and state.
#[test]
fn project_status_wins_priority() {
    let labels = vec!["afu9:status:done".to_string()];
    let mirror = extract_mirror_status(Some("In Progress"), &labels, "closed");
    assert_eq!(mirror, ForgeMirrorStatus::InProgress);
}

/// Verifies labels classify when no project status exists.
#[test]
fn labels_classify_without_project_status() {
    let labels = vec!["bug".to_string(), "afu9:status:review-ready".to_string()];
    let mirror = extract_mirror_status(None, &labels, "open");
    assert_eq!(mirror, ForgeMirrorStatus::InReview);
}

/// Verifies a bare closed state never maps to DONE.
#[test]
fn bare_closed_state_never_becomes_done() {
    let mirror = extract_mirror_status(None, &[], "closed");
    assert_eq!(mirror, ForgeMirrorStatus::Closed);
    assert_eq!(map_mirror_to_local(mirror), None);
    assert_eq!(determine_target_status(&PullRequestEvidence::default(), mirror), None);
}

/// Verifies the mirror extraction and mapping compose consistently.
#[test]
fn extraction_composes_with_mapping() {
    let cases = [
        ("Todo", LocalStatus::SpecReady),
        ("In Progress", LocalStatus::Implementing),
        ("In Review", LocalStatus::MergeReady),
        ("Done", LocalStatus::Done),
        ("Blocked", LocalStatus::Hold),
    ];
    for (column, expected) in cases {
        let mirror = extract_mirror_status(Some(column), &[], "open");
        assert_eq!(map_mirror_to_local(mirror), Some(expected), "column {column}");
    }
}

/// Verifies a merged PR targets DONE regardless of other signals.
#[test]
fn merged_pr_targets_done() {
    let evidence = PullRequestEvidence {
        pull_request: Some(ForgePullRequest {
            merged: true,
            ..open_pr()
        }),
        reviews: Vec::new(),
        checks: Vec::new(),
    };
    let target = determine_target_status(&evidence, ForgeMirrorStatus::InProgress);
    assert_eq!(target, Some(LocalStatus::Done));
}

/// Verifies green checks plus approval target MERGE_READY.
#[test]
fn approved_green_pr_targets_merge_ready() {
    let evidence = PullRequestEvidence {
        pull_request: Some(open_pr()),
        reviews: vec![ForgeReview {
            reviewer: "rev-1".to_string(),
            state: ReviewState::Approved,
        }],
        checks: vec![green_check()],
    };
    assert_eq!(
        determine_target_status(&evidence, ForgeMirrorStatus::Unknown),
        Some(LocalStatus::MergeReady)
    );
}

/// Verifies a change request downgrades the target to REVIEW_READY.
#[test]
fn change_request_blocks_merge_ready() {
    let evidence = PullRequestEvidence {
        pull_request: Some(open_pr()),
        reviews: vec![
            ForgeReview {
                reviewer: "rev-1".to_string(),
                state: ReviewState::Approved,
            },
            ForgeReview {
                reviewer: "rev-2".to_string(),
                state: ReviewState::ChangesRequested,
            },
        ],
        checks: vec![green_check()],
    };
    assert_eq!(
        determine_target_status(&evidence, ForgeMirrorStatus::Unknown),
        Some(LocalStatus::ReviewReady)
    );
}

/// Verifies in-flight checks keep the target at REVIEW_READY.
#[test]
fn running_checks_stay_review_ready() {
    let evidence = PullRequestEvidence {
        pull_request: Some(open_pr()),
        reviews: vec![ForgeReview {
            reviewer: "rev-1".to_string(),
            state: ReviewState::Approved,
        }],
        checks: vec![ForgeCheckRun {
            name: "ci".to_string(),
            status: CheckStatus::InProgress,
            conclusion: None,
            required: true,
        }],
    };
    assert_eq!(
        determine_target_status(&evidence, ForgeMirrorStatus::Unknown),
        Some(LocalStatus::ReviewReady)
    );
}

/// Verifies a draft PR maps to IMPLEMENTING.
#[test]
fn draft_pr_targets_implementing() {
    let evidence = PullRequestEvidence {
        pull_request: Some(ForgePullRequest {
            draft: true,
            ..open_pr()
        }),
        reviews: Vec::new(),
        checks: Vec::new(),
    };
    assert_eq!(
        determine_target_status(&evidence, ForgeMirrorStatus::Unknown),
        Some(LocalStatus::Implementing)
    );
}

proptest! {
    /// Verifies no combination of foreign labels turns a closed issue DONE.
    #[test]
    fn closed_issue_never_done_under_foreign_labels(
        labels in vec("[a-z][a-z0-9 _-]{0,16}", 0..8),
    ) {
        let foreign: Vec<String> =
            labels.into_iter().filter(|label| !label.starts_with("afu9:status:")).collect();
        let mirror = extract_mirror_status(None, &foreign, "closed");
        prop_assert_ne!(mirror, ForgeMirrorStatus::Done);
        prop_assert_ne!(map_mirror_to_local(mirror), Some(LocalStatus::Done));
    }
}

/// Verifies the label diff adds the desired label and strips stale ones.
#[test]
fn label_diff_replaces_stale_status_labels() {
    let current = vec![
        "bug".to_string(),
        "afu9:status:implementing".to_string(),
        "afu9:status:hold".to_string(),
    ];
    let (additions, removals) = status_label_diff(LocalStatus::MergeReady, &current);
    assert_eq!(additions, vec![status_label(LocalStatus::MergeReady)]);
    assert_eq!(
        removals,
        vec!["afu9:status:implementing".to_string(), "afu9:status:hold".to_string()]
    );

    let synced = vec![status_label(LocalStatus::MergeReady)];
    let (additions, removals) = status_label_diff(LocalStatus::MergeReady, &synced);
    assert!(additions.is_empty());
    assert!(removals.is_empty());
}
