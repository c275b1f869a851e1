// crates/afu9-sync/src/http.rs
// ============================================================================
// Module: HTTP Forge Client
// Description: Blocking HTTP implementation of the Forge client contract.
// Purpose: Talk to a real Forge REST surface with fail-closed status handling.
// Dependencies: crate::forge, afu9-policy, reqwest, serde, url
// ============================================================================

//! ## Overview
//! [`HttpForgeClient`] resolves the Forge REST endpoints with a blocking
//! client, a bounded timeout, and no redirects. Non-success status codes fail
//! closed; 404 maps to the typed absence the contract allows. Construction
//! goes through [`authenticated_client`], which checks the repo access policy
//! before a token is ever requested.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use afu9_policy::RepoAccessPolicy;

use crate::forge::CheckConclusion;
use crate::forge::CheckStatus;
use crate::forge::ForgeCheckRun;
use crate::forge::ForgeClient;
use crate::forge::ForgeError;
use crate::forge::ForgeIssueSnapshot;
use crate::forge::ForgePullRequest;
use crate::forge::ForgeReview;
use crate::forge::GuardedForgeClient;
use crate::forge::InstallationTokenProvider;
use crate::forge::ReviewState;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-call deadline.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// SECTION: Wire Shapes
// ============================================================================

/// Wire shape of a Forge issue.
#[derive(Debug, Deserialize)]
struct WireIssue {
    /// Issue number.
    number: i64,
    /// Raw state.
    state: String,
    /// Title.
    title: String,
    /// Labels.
    #[serde(default)]
    labels: Vec<WireLabel>,
    /// Project status column.
    #[serde(default)]
    project_status: Option<String>,
    /// HTML URL.
    html_url: String,
}

/// Wire shape of a label.
#[derive(Debug, Deserialize)]
struct WireLabel {
    /// Label name.
    name: String,
}

/// Wire shape of a pull request.
#[derive(Debug, Deserialize)]
struct WirePullRequest {
    /// Pull request number.
    number: i64,
    /// Raw state.
    state: String,
    /// Merge flag.
    #[serde(default)]
    merged: bool,
    /// Draft flag.
    #[serde(default)]
    draft: bool,
    /// HTML URL.
    html_url: String,
    /// Head reference.
    head: WireHead,
}

/// Wire shape of a pull request head.
#[derive(Debug, Deserialize)]
struct WireHead {
    /// Branch name.
    #[serde(rename = "ref")]
    branch: String,
}

/// Wire shape of a review.
#[derive(Debug, Deserialize)]
struct WireReview {
    /// Reviewer login.
    user: WireUser,
    /// Review state string.
    state: String,
}

/// Wire shape of a user.
#[derive(Debug, Deserialize)]
struct WireUser {
    /// Login name.
    login: String,
}

/// Wire shape of a check-runs listing.
#[derive(Debug, Deserialize)]
struct WireCheckRuns {
    /// Check runs.
    #[serde(default)]
    check_runs: Vec<WireCheckRun>,
}

/// Wire shape of one check run.
#[derive(Debug, Deserialize)]
struct WireCheckRun {
    /// Check name.
    name: String,
    /// Status string.
    status: String,
    /// Conclusion string.
    #[serde(default)]
    conclusion: Option<String>,
    /// Required-for-merge flag.
    #[serde(default)]
    required: bool,
}

// ============================================================================
// SECTION: HTTP Client
// ============================================================================

/// Blocking HTTP Forge client.
pub struct HttpForgeClient {
    /// Forge API base URL.
    base_url: Url,
    /// Shared blocking client.
    client: Client,
    /// Server-side token source.
    tokens: Arc<dyn InstallationTokenProvider>,
}

impl HttpForgeClient {
    /// Creates a client against a Forge API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Api`] when the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        tokens: Arc<dyn InstallationTokenProvider>,
    ) -> Result<Self, ForgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .redirect(Policy::none())
            .build()
            .map_err(|err| ForgeError::Api(err.to_string()))?;
        Ok(Self {
            base_url,
            client,
            tokens,
        })
    }

    /// Resolves a path below the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, ForgeError> {
        self.base_url.join(path).map_err(|err| ForgeError::Api(err.to_string()))
    }

    /// Performs an authenticated GET and checks the status fail-closed.
    fn get(&self, owner: &str, repo: &str, path: &str) -> Result<Response, ForgeError> {
        let token = self.tokens.installation_token(owner, repo)?;
        let url = self.endpoint(path)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .map_err(classify_transport_error)?;
        check_status(response)
    }
}

/// Maps transport errors to timeouts or API failures.
fn classify_transport_error(err: reqwest::Error) -> ForgeError {
    if err.is_timeout() {
        ForgeError::Timeout(err.to_string())
    } else {
        ForgeError::Api(err.to_string())
    }
}

/// Fails closed on non-success statuses, mapping 404 to `NotFound`.
fn check_status(response: Response) -> Result<Response, ForgeError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == StatusCode::NOT_FOUND {
        Err(ForgeError::NotFound(response.url().path().to_string()))
    } else {
        Err(ForgeError::Api(format!(
            "forge returned {status} for {}",
            response.url().path()
        )))
    }
}

impl ForgeClient for HttpForgeClient {
    fn issue(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<ForgeIssueSnapshot, ForgeError> {
        let response = self.get(owner, repo, &format!("repos/{owner}/{repo}/issues/{number}"))?;
        let wire: WireIssue =
            response.json().map_err(|err| ForgeError::Api(err.to_string()))?;
        Ok(ForgeIssueSnapshot {
            number: wire.number,
            state: wire.state,
            title: wire.title,
            labels: wire.labels.into_iter().map(|label| label.name).collect(),
            project_status: wire.project_status,
            url: wire.html_url,
        })
    }

    fn pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Option<ForgePullRequest>, ForgeError> {
        let result = self.get(owner, repo, &format!("repos/{owner}/{repo}/pulls/{number}"));
        let response = match result {
            Ok(response) => response,
            Err(ForgeError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let wire: WirePullRequest =
            response.json().map_err(|err| ForgeError::Api(err.to_string()))?;
        Ok(Some(ForgePullRequest {
            number: wire.number,
            state: wire.state,
            merged: wire.merged,
            draft: wire.draft,
            url: wire.html_url,
            head_branch: wire.head.branch,
        }))
    }

    fn reviews(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<ForgeReview>, ForgeError> {
        let response =
            self.get(owner, repo, &format!("repos/{owner}/{repo}/pulls/{number}/reviews"))?;
        let wire: Vec<WireReview> =
            response.json().map_err(|err| ForgeError::Api(err.to_string()))?;
        Ok(wire
            .into_iter()
            .filter_map(|review| {
                let state = match review.state.as_str() {
                    "APPROVED" => ReviewState::Approved,
                    "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
                    "COMMENTED" => ReviewState::Commented,
                    "DISMISSED" => ReviewState::Dismissed,
                    _ => return None,
                };
                Some(ForgeReview {
                    reviewer: review.user.login,
                    state,
                })
            })
            .collect())
    }

    fn check_runs(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
    ) -> Result<Vec<ForgeCheckRun>, ForgeError> {
        let response = self
            .get(owner, repo, &format!("repos/{owner}/{repo}/pulls/{number}/check-runs"))?;
        let wire: WireCheckRuns =
            response.json().map_err(|err| ForgeError::Api(err.to_string()))?;
        Ok(wire
            .check_runs
            .into_iter()
            .map(|check| ForgeCheckRun {
                name: check.name,
                status: match check.status.as_str() {
                    "queued" => CheckStatus::Queued,
                    "in_progress" => CheckStatus::InProgress,
                    _ => CheckStatus::Completed,
                },
                conclusion: check.conclusion.as_deref().map(|conclusion| match conclusion {
                    "success" => CheckConclusion::Success,
                    "neutral" => CheckConclusion::Neutral,
                    "cancelled" => CheckConclusion::Cancelled,
                    "timed_out" => CheckConclusion::TimedOut,
                    "action_required" => CheckConclusion::ActionRequired,
                    "skipped" => CheckConclusion::Skipped,
                    _ => CheckConclusion::Failure,
                }),
                required: check.required,
            })
            .collect())
    }

    fn labels(&self, owner: &str, repo: &str, number: i64) -> Result<Vec<String>, ForgeError> {
        let response =
            self.get(owner, repo, &format!("repos/{owner}/{repo}/issues/{number}/labels"))?;
        let wire: Vec<WireLabel> =
            response.json().map_err(|err| ForgeError::Api(err.to_string()))?;
        Ok(wire.into_iter().map(|label| label.name).collect())
    }

    fn set_labels(
        &self,
        owner: &str,
        repo: &str,
        number: i64,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ForgeError> {
        let token = self.tokens.installation_token(owner, repo)?;
        let url = self.endpoint(&format!("repos/{owner}/{repo}/issues/{number}/labels"))?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(&json!({ "add": add, "remove": remove }))
            .send()
            .map_err(classify_transport_error)?;
        check_status(response).map(|_| ())
    }
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds an access-guarded, authenticated Forge client.
///
/// The access policy is consulted before any token is requested; callers only
/// ever receive pre-scoped API calls, never the token itself.
///
/// # Errors
///
/// Returns [`ForgeError`] when the underlying client cannot be built.
pub fn authenticated_client(
    policy: RepoAccessPolicy,
    base_url: Url,
    tokens: Arc<dyn InstallationTokenProvider>,
) -> Result<GuardedForgeClient<HttpForgeClient>, ForgeError> {
    let inner = HttpForgeClient::new(base_url, tokens)?;
    Ok(GuardedForgeClient::new(policy, inner))
}
