// crates/afu9-sync/src/forge.rs
// ============================================================================
// Module: Forge Client Contract
// Description: Backend-agnostic interface to the external issue-and-PR host.
// Purpose: Define the narrow Forge surface sync consumes, always access-guarded.
// Dependencies: afu9-core, afu9-policy, serde, thiserror
// ============================================================================

//! ## Overview
//! The Forge is specified only as an interface: issue snapshots, pull request
//! state, reviews, check runs, and label writes. Every call is mediated by the
//! repo access policy via [`GuardedForgeClient`]; tokens stay server-side
//! behind [`InstallationTokenProvider`] and are never handed to callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use afu9_core::ErrorCode;
use afu9_policy::RepoAccessPolicy;

// ============================================================================
// SECTION: Snapshot Types
// ============================================================================

/// Snapshot of a Forge issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeIssueSnapshot {
    /// Issue number.
    pub number: i64,
    /// Raw issue state (`open` / `closed`).
    pub state: String,
    /// Issue title.
    pub title: String,
    /// Label names.
    pub labels: Vec<String>,
    /// Project status column, when the issue is on a project board.
    pub project_status: Option<String>,
    /// Issue URL.
    pub url: String,
}

/// Snapshot of a Forge pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgePullRequest {
    /// Pull request number.
    pub number: i64,
    /// Raw state (`open` / `closed`).
    pub state: String,
    /// True when merged.
    pub merged: bool,
    /// True when still a draft.
    pub draft: bool,
    /// Pull request URL.
    pub url: String,
    /// Head branch name.
    pub head_branch: String,
}

/// Review verdict on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    /// Approving review.
    Approved,
    /// Blocking review.
    ChangesRequested,
    /// Non-blocking comment review.
    Commented,
    /// Review dismissed.
    Dismissed,
}

/// One review on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeReview {
    /// Reviewer login.
    pub reviewer: String,
    /// Review state.
    pub state: ReviewState,
}

/// Check run completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Queued, not started.
    Queued,
    /// Currently running.
    InProgress,
    /// Finished; see the conclusion.
    Completed,
}

/// Check run conclusion once completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    /// Check passed.
    Success,
    /// Check failed.
    Failure,
    /// Check neutral.
    Neutral,
    /// Check cancelled.
    Cancelled,
    /// Check timed out.
    TimedOut,
    /// Check requires action.
    ActionRequired,
    /// Check skipped.
    Skipped,
}

/// One check run on a pull request head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeCheckRun {
    /// Check name.
    pub name: String,
    /// Completion status.
    pub status: CheckStatus,
    /// Conclusion, when completed.
    pub conclusion: Option<CheckConclusion>,
    /// True when the check is required for merge.
    pub required: bool,
}

impl ForgeCheckRun {
    /// Returns true when the check completed successfully.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Completed
            && matches!(
                self.conclusion,
                Some(CheckConclusion::Success | CheckConclusion::Neutral | CheckConclusion::Skipped)
            )
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by Forge clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForgeError {
    /// Repo access policy denied the call.
    #[error("forge access denied: {0}")]
    AccessDenied(String),
    /// Entity not found on the Forge.
    #[error("forge entity not found: {0}")]
    NotFound(String),
    /// Forge API reported an error.
    #[error("forge api error: {0}")]
    Api(String),
    /// Call exceeded its deadline.
    #[error("forge call timed out: {0}")]
    Timeout(String),
}

impl ForgeError {
    /// Returns the stable error code for API surfacing.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::AccessDenied(_) => ErrorCode::RepoNotAllowed,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Api(_) => ErrorCode::Internal,
            Self::Timeout(_) => ErrorCode::Timeout,
        }
    }
}

// ============================================================================
// SECTION: Client Contract
// ============================================================================

/// Narrow Forge surface consumed by sync and handoff.
pub trait ForgeClient: Send + Sync {
    /// Fetches an issue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the call fails.
    fn issue(&self, owner: &str, repo: &str, number: i64)
    -> Result<ForgeIssueSnapshot, ForgeError>;

    /// Fetches a pull request, tolerating absence.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the call fails.
    fn pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Option<ForgePullRequest>, ForgeError>;

    /// Lists reviews on a pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the call fails.
    fn reviews(&self, owner: &str, repo: &str, number: i64)
    -> Result<Vec<ForgeReview>, ForgeError>;

    /// Lists check runs on a pull request head.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the call fails.
    fn check_runs(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<ForgeCheckRun>, ForgeError>;

    /// Lists label names on an issue.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the call fails.
    fn labels(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<String>, ForgeError>;

    /// Applies label additions and removals to an issue.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the call fails.
    fn set_labels(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ForgeError>;
}

// ============================================================================
// SECTION: Token Provider
// ============================================================================

/// Server-side installation token source.
///
/// Tokens never leave the client construction path.
pub trait InstallationTokenProvider: Send + Sync {
    /// Returns an installation token scoped to the repository.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when the token cannot be obtained.
    fn installation_token(&self, owner: &str, repo: &str) -> Result<String, ForgeError>;
}

/// Token provider backed by a configured static credential.
pub struct StaticTokenProvider {
    /// Installation token value.
    token: String,
}

impl StaticTokenProvider {
    /// Creates a provider around a configured token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl InstallationTokenProvider for StaticTokenProvider {
    fn installation_token(&self, _owner: &str, _repo: &str) -> Result<String, ForgeError> {
        Ok(self.token.clone())
    }
}

// ============================================================================
// SECTION: Guarded Client
// ============================================================================

/// Forge client wrapper enforcing the repo access policy on every call.
pub struct GuardedForgeClient<C> {
    /// Compiled access policy.
    policy: RepoAccessPolicy,
    /// Wrapped client.
    inner: C,
}

impl<C: ForgeClient> GuardedForgeClient<C> {
    /// Wraps a client with an access policy.
    #[must_use]
    pub fn new(policy: RepoAccessPolicy, inner: C) -> Self {
        Self {
            policy,
            inner,
        }
    }

    /// Checks admissibility for a repository target.
    fn guard(&self, owner: &str, repo: &str) -> Result<(), ForgeError> {
        let decision = self.policy.check_access(owner, repo, None, None);
        if decision.allowed {
            Ok(())
        } else {
            Err(ForgeError::AccessDenied(
                decision.reason.unwrap_or_else(|| "repository not allowed".to_string()),
            ))
        }
    }
}

impl<C: ForgeClient> ForgeClient for GuardedForgeClient<C> {
    fn issue(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<ForgeIssueSnapshot, ForgeError> {
        self.guard(owner, repo)?;
        self.inner.issue(owner, repo, number)
    }

    fn pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Option<ForgePullRequest>, ForgeError> {
        self.guard(owner, repo)?;
        self.inner.pull_request(owner, repo, number)
    }

    fn reviews(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<ForgeReview>, ForgeError> {
        self.guard(owner, repo)?;
        self.inner.reviews(owner, repo, number)
    }

    fn check_runs(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<ForgeCheckRun>, ForgeError> {
        self.guard(owner, repo)?;
        self.inner.check_runs(owner, repo, number)
    }

    fn labels(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<String>, ForgeError> {
        self.guard(owner, repo)?;
        self.inner.labels(owner, repo, number)
    }

    fn set_labels(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ForgeError> {
        self.guard(owner, repo)?;
        self.inner.set_labels(owner, repo, number, add, remove)
    }
}
