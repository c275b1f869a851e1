// crates/afu9-sync/src/classify.rs
// ============================================================================
// Module: Forge Status Classifier
// Description: Pure derivation of mirror status and sync target status.
// Purpose: Turn raw Forge signals into state-machine inputs deterministically.
// Dependencies: afu9-core, crate::forge
// ============================================================================

//! ## Overview
//! Two pure functions: [`extract_mirror_status`] classifies raw Forge signals
//! with fixed priority (project status over labels over issue state), and
//! [`determine_target_status`] derives the sync target from PR evidence. The
//! semantic protection lives here: a bare `closed` issue state classifies as
//! `CLOSED`, which carries no completion opinion; only an explicit project
//! status or label ever yields `DONE`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use afu9_core::ForgeMirrorStatus;
use afu9_core::LocalStatus;
use afu9_core::map_mirror_to_local;

use crate::forge::ForgeCheckRun;
use crate::forge::ForgePullRequest;
use crate::forge::ForgeReview;
use crate::forge::ReviewState;

// ============================================================================
// SECTION: Label Vocabulary
// ============================================================================

/// Prefix for mirrored status labels.
pub const STATUS_LABEL_PREFIX: &str = "afu9:status:";

/// Returns the status label AFU-9 mirrors for a local status.
#[must_use]
pub fn status_label(status: LocalStatus) -> String {
    let suffix = match status {
        LocalStatus::Created => "created",
        LocalStatus::SpecReady => "spec-ready",
        LocalStatus::Active => "active",
        LocalStatus::ImplementingPrep => "implementing-prep",
        LocalStatus::Implementing => "implementing",
        LocalStatus::ReviewReady => "review-ready",
        LocalStatus::Verified => "verified",
        LocalStatus::MergeReady => "merge-ready",
        LocalStatus::Done => "done",
        LocalStatus::Hold => "hold",
        LocalStatus::Killed => "killed",
    };
    format!("{STATUS_LABEL_PREFIX}{suffix}")
}

/// Computes the label diff mirroring a local status to the Forge.
///
/// Returns `(additions, removals)`: the status label to add (when missing)
/// and every stale `afu9:status:*` label to remove. Foreign labels are left
/// untouched.
#[must_use]
pub fn status_label_diff(
    status: LocalStatus,
    current_labels: &[String],
) -> (Vec<String>, Vec<String>) {
    let desired = status_label(status);
    let additions = if current_labels.contains(&desired) {
        Vec::new()
    } else {
        vec![desired.clone()]
    };
    let removals = current_labels
        .iter()
        .filter(|label| label.starts_with(STATUS_LABEL_PREFIX) && **label != desired)
        .cloned()
        .collect();
    (additions, removals)
}

// ============================================================================
// SECTION: Mirror Status Extraction
// ============================================================================

/// Classifies raw Forge signals into a mirror status.
///
/// Priority: explicit project status, then status labels, then the bare issue
/// state. The bare string `closed` classifies as `CLOSED`, never `DONE`.
#[must_use]
pub fn extract_mirror_status(
    project_status: Option<&str>,
    labels: &[String],
    issue_state: &str,
) -> ForgeMirrorStatus {
    if let Some(status) = project_status
        && let Some(mirror) = classify_project_status(status)
    {
        return mirror;
    }
    if let Some(mirror) = classify_labels(labels) {
        return mirror;
    }
    match issue_state {
        "open" => ForgeMirrorStatus::Open,
        "closed" => ForgeMirrorStatus::Closed,
        "" => ForgeMirrorStatus::Unknown,
        _ => ForgeMirrorStatus::Error,
    }
}

/// Classifies a project status column value.
fn classify_project_status(status: &str) -> Option<ForgeMirrorStatus> {
    let normalized = status.trim().to_ascii_lowercase().replace([' ', '_'], "-");
    match normalized.as_str() {
        "todo" | "backlog" => Some(ForgeMirrorStatus::Todo),
        "in-progress" => Some(ForgeMirrorStatus::InProgress),
        "in-review" => Some(ForgeMirrorStatus::InReview),
        "done" => Some(ForgeMirrorStatus::Done),
        "blocked" => Some(ForgeMirrorStatus::Blocked),
        _ => None,
    }
}

/// Classifies mirrored status labels.
fn classify_labels(labels: &[String]) -> Option<ForgeMirrorStatus> {
    for label in labels {
        let Some(suffix) = label.strip_prefix(STATUS_LABEL_PREFIX) else {
            continue;
        };
        let mirror = match suffix {
            "created" | "spec-ready" => ForgeMirrorStatus::Todo,
            "active" | "implementing" | "implementing-prep" => ForgeMirrorStatus::InProgress,
            "review-ready" | "verified" | "merge-ready" => ForgeMirrorStatus::InReview,
            "done" => ForgeMirrorStatus::Done,
            "hold" => ForgeMirrorStatus::Blocked,
            _ => continue,
        };
        return Some(mirror);
    }
    None
}

// ============================================================================
// SECTION: Target Status Derivation
// ============================================================================

/// Pull request evidence assembled by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PullRequestEvidence {
    /// Pull request snapshot, when one exists.
    pub pull_request: Option<ForgePullRequest>,
    /// Reviews on the pull request.
    pub reviews: Vec<ForgeReview>,
    /// Check runs on the pull request head.
    pub checks: Vec<ForgeCheckRun>,
}

impl PullRequestEvidence {
    /// Returns true when at least one approving review exists.
    #[must_use]
    pub fn has_approval(&self) -> bool {
        self.reviews.iter().any(|review| review.state == ReviewState::Approved)
    }

    /// Returns true when a blocking change request exists.
    #[must_use]
    pub fn has_change_request(&self) -> bool {
        self.reviews.iter().any(|review| review.state == ReviewState::ChangesRequested)
    }

    /// Returns true when all required checks completed successfully.
    #[must_use]
    pub fn required_checks_passed(&self) -> bool {
        self.checks.iter().filter(|check| check.required).all(ForgeCheckRun::passed)
    }

    /// Returns true when any check is still queued or running.
    #[must_use]
    pub fn checks_in_progress(&self) -> bool {
        self.checks.iter().any(|check| {
            matches!(
                check.status,
                crate::forge::CheckStatus::Queued | crate::forge::CheckStatus::InProgress
            )
        })
    }
}

/// Derives the sync target status from PR evidence and the mirror status.
///
/// Priority: merged PR, then a mergeable open PR, then in-flight PR activity,
/// then the mirror-status mapping. `None` means "no opinion, leave the Issue
/// alone".
#[must_use]
pub fn determine_target_status(
    evidence: &PullRequestEvidence,
    mirror: ForgeMirrorStatus,
) -> Option<LocalStatus> {
    if let Some(pr) = &evidence.pull_request {
        if pr.merged {
            return Some(LocalStatus::Done);
        }
        if pr.state == "open" {
            if pr.draft {
                return Some(LocalStatus::Implementing);
            }
            if evidence.required_checks_passed()
                && !evidence.checks_in_progress()
                && evidence.has_approval()
                && !evidence.has_change_request()
            {
                return Some(LocalStatus::MergeReady);
            }
            return Some(LocalStatus::ReviewReady);
        }
    }
    map_mirror_to_local(mirror)
}
