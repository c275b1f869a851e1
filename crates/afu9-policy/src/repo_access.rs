// crates/afu9-policy/src/repo_access.rs
// ============================================================================
// Module: Repo Access Policy
// Description: Allowlist matcher for (owner, repo, branch, path) Forge targets.
// Purpose: Gate every Forge call behind an explicit, fail-closed allowlist.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The repo access policy decides whether a Forge call is admissible before a
//! client or token is ever constructed. Configuration comes from the
//! `FORGE_REPO_ALLOWLIST` environment variable as JSON; a missing variable
//! falls back to a built-in development default, while malformed JSON is a
//! configuration error and fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use afu9_core::ErrorCode;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the repo access policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoAccessError {
    /// Allowlist configuration is malformed.
    #[error("repo allowlist configuration invalid: {0}")]
    Config(String),
}

impl RepoAccessError {
    /// Returns the stable error code for API surfacing.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::PolicyConfigError,
        }
    }
}

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Literal-or-glob pattern for branch and path entries.
///
/// Supported forms: `*` (everything), `prefix/*` (prefix match on the
/// segment boundary), and plain literals.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    /// Matches every value.
    Any,
    /// Matches values beginning with the stored prefix.
    Prefix(String),
    /// Matches the exact value.
    Literal(String),
}

impl Pattern {
    /// Parses a pattern from its configured string form.
    fn parse(raw: &str) -> Self {
        if raw == "*" {
            Self::Any
        } else if let Some(prefix) = raw.strip_suffix("/*") {
            Self::Prefix(format!("{prefix}/"))
        } else {
            Self::Literal(raw.to_string())
        }
    }

    /// Returns true when the value matches the pattern.
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Self::Literal(literal) => literal == value,
        }
    }
}

// ============================================================================
// SECTION: Configuration Shape
// ============================================================================

/// Wire shape of the `FORGE_REPO_ALLOWLIST` JSON document.
#[derive(Debug, Deserialize)]
struct AllowlistDocument {
    /// Allowlist entries.
    allowlist: Vec<AllowlistEntryConfig>,
}

/// Wire shape of one allowlist entry.
#[derive(Debug, Deserialize)]
struct AllowlistEntryConfig {
    /// Repository owner (literal).
    owner: String,
    /// Repository name (literal).
    repo: String,
    /// Allowed branches (literal or glob).
    branches: Vec<String>,
    /// Allowed paths (literal or glob); absent means all paths.
    #[serde(default)]
    paths: Option<Vec<String>>,
}

// ============================================================================
// SECTION: Allowlist
// ============================================================================

/// One compiled allowlist entry.
#[derive(Debug, Clone)]
struct AllowlistEntry {
    /// Repository owner.
    owner: String,
    /// Repository name.
    repo: String,
    /// Allowed branch patterns.
    branches: Vec<Pattern>,
    /// Allowed path patterns; `None` admits every path.
    paths: Option<Vec<Pattern>>,
}

/// Decision returned by [`RepoAccessPolicy::check_access`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    /// True when the call is admissible.
    pub allowed: bool,
    /// Denial reason when not allowed.
    pub reason: Option<String>,
}

impl AccessDecision {
    /// Builds an allow decision.
    const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// Builds a deny decision with a reason.
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Compiled repo access policy.
///
/// # Invariants
/// - The policy is immutable after construction; evaluation is pure.
#[derive(Debug, Clone)]
pub struct RepoAccessPolicy {
    /// Compiled allowlist entries.
    entries: Vec<AllowlistEntry>,
}

impl RepoAccessPolicy {
    /// Builds the policy from the raw environment value.
    ///
    /// A missing value yields the built-in development default; a present but
    /// malformed value is a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`RepoAccessError::Config`] when the JSON is malformed or the
    /// allowlist is empty.
    pub fn from_env_value(raw: Option<&str>) -> Result<Self, RepoAccessError> {
        match raw {
            None => Ok(Self::development_default()),
            Some(value) if value.trim().is_empty() => Ok(Self::development_default()),
            Some(value) => {
                let document: AllowlistDocument = serde_json::from_str(value)
                    .map_err(|err| RepoAccessError::Config(err.to_string()))?;
                if document.allowlist.is_empty() {
                    return Err(RepoAccessError::Config(
                        "allowlist must contain at least one entry".to_string(),
                    ));
                }
                let entries = document
                    .allowlist
                    .into_iter()
                    .map(|entry| {
                        if entry.owner.is_empty() || entry.repo.is_empty() {
                            return Err(RepoAccessError::Config(
                                "allowlist entries require owner and repo".to_string(),
                            ));
                        }
                        if entry.branches.is_empty() {
                            return Err(RepoAccessError::Config(format!(
                                "entry {}/{} requires at least one branch",
                                entry.owner, entry.repo
                            )));
                        }
                        Ok(AllowlistEntry {
                            owner: entry.owner,
                            repo: entry.repo,
                            branches: entry.branches.iter().map(|b| Pattern::parse(b)).collect(),
                            paths: entry
                                .paths
                                .map(|paths| paths.iter().map(|p| Pattern::parse(p)).collect()),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self {
                    entries,
                })
            }
        }
    }

    /// Returns the built-in development default allowlist.
    #[must_use]
    pub fn development_default() -> Self {
        Self {
            entries: vec![AllowlistEntry {
                owner: "afu9-dev".to_string(),
                repo: "sandbox".to_string(),
                branches: vec![Pattern::Any],
                paths: None,
            }],
        }
    }

    /// Decides whether a Forge call against the target is admissible.
    #[must_use]
    pub fn check_access(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
        path: Option<&str>,
    ) -> AccessDecision {
        let Some(entry) = self
            .entries
            .iter()
            .find(|entry| entry.owner == owner && entry.repo == repo)
        else {
            return AccessDecision::deny(format!("repository {owner}/{repo} is not allowlisted"));
        };
        if let Some(branch) = branch
            && !entry.branches.iter().any(|pattern| pattern.matches(branch))
        {
            return AccessDecision::deny(format!(
                "branch {branch} is not allowed for {owner}/{repo}"
            ));
        }
        if let Some(path) = path
            && let Some(patterns) = &entry.paths
            && !patterns.iter().any(|pattern| pattern.matches(path))
        {
            return AccessDecision::deny(format!("path {path} is not allowed for {owner}/{repo}"));
        }
        AccessDecision::allow()
    }
}
