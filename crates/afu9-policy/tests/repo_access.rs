// crates/afu9-policy/tests/repo_access.rs
// ============================================================================
// Module: Repo Access Policy Tests
// Description: Tests for the Forge repository allowlist matcher.
// Purpose: Pin literal and glob matching plus fail-closed configuration.
// Dependencies: afu9-policy
// ============================================================================
//! ## Overview
//! Exercises allowlist parsing from the environment value, the development
//! default, and branch/path glob semantics.

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

use afu9_policy::RepoAccessError;
use afu9_policy::RepoAccessPolicy;

/// Allowlist JSON used across tests.
const ALLOWLIST: &str = r#"{
    "allowlist": [
        {
            "owner": "afu9",
            "repo": "control-center",
            "branches": ["main", "release/*"],
            "paths": ["src/*", "Cargo.toml"]
        }
    ]
}"#;

/// Verifies a listed repository with a literal branch is allowed.
#[test]
fn literal_branch_is_allowed() {
    let policy = RepoAccessPolicy::from_env_value(Some(ALLOWLIST)).unwrap();
    let decision = policy.check_access("afu9", "control-center", Some("main"), None);
    assert!(decision.allowed);
    assert!(decision.reason.is_none());
}

/// Verifies glob branches match on the segment boundary.
#[test]
fn glob_branch_matches_prefix() {
    let policy = RepoAccessPolicy::from_env_value(Some(ALLOWLIST)).unwrap();
    assert!(policy.check_access("afu9", "control-center", Some("release/1.2"), None).allowed);
    assert!(!policy.check_access("afu9", "control-center", Some("hotfix/1.2"), None).allowed);
}

/// Verifies path globs and literals are both honored.
#[test]
fn path_patterns_are_honored() {
    let policy = RepoAccessPolicy::from_env_value(Some(ALLOWLIST)).unwrap();
    assert!(
        policy
            .check_access("afu9", "control-center", Some("main"), Some("src/lib.rs"))
            .allowed
    );
    assert!(
        policy
            .check_access("afu9", "control-center", Some("main"), Some("Cargo.toml"))
            .allowed
    );
    let denied = policy.check_access("afu9", "control-center", Some("main"), Some("secrets.env"));
    assert!(!denied.allowed);
    assert!(denied.reason.unwrap().contains("path"));
}

/// Verifies unlisted repositories are denied with a reason.
#[test]
fn unlisted_repository_is_denied() {
    let policy = RepoAccessPolicy::from_env_value(Some(ALLOWLIST)).unwrap();
    let decision = policy.check_access("intruder", "control-center", None, None);
    assert!(!decision.allowed);
    assert!(decision.reason.unwrap().contains("not allowlisted"));
}

/// Verifies a missing environment value falls back to the dev default.
#[test]
fn missing_configuration_uses_dev_default() {
    let policy = RepoAccessPolicy::from_env_value(None).unwrap();
    assert!(policy.check_access("afu9-dev", "sandbox", Some("anything"), None).allowed);
    assert!(!policy.check_access("afu9", "control-center", None, None).allowed);
}

/// Verifies malformed JSON fails closed as a configuration error.
#[test]
fn malformed_configuration_fails_closed() {
    let err = RepoAccessPolicy::from_env_value(Some("{ not json")).unwrap_err();
    assert!(matches!(err, RepoAccessError::Config(_)));
}

/// Verifies an empty allowlist is rejected.
#[test]
fn empty_allowlist_is_rejected() {
    let err = RepoAccessPolicy::from_env_value(Some(r#"{"allowlist": []}"#)).unwrap_err();
    assert!(matches!(err, RepoAccessError::Config(_)));
}
