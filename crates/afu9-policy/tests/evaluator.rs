// crates/afu9-policy/tests/evaluator.rs
// ============================================================================
// Module: Automation Policy Evaluator Tests
// Description: Tests for the ordered admissibility checks and audit trail.
// Purpose: Pin cooldown, rate-limit, approval, and fail-closed semantics.
// Dependencies: afu9-core, afu9-policy, serde_json
// ============================================================================
//! ## Overview
//! Exercises the evaluator check order: fail-closed rulebook loads, missing
//! policies, environment gates, approval gating, cooldowns, rate-limit
//! windows, deterministic idempotency keys, and the execution audit trail.

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

use std::sync::Arc;

use afu9_core::Actor;
use afu9_core::ErrorCode;
use afu9_core::LawbookId;
use afu9_core::RequestId;
use afu9_core::Timestamp;
use afu9_policy::AutomationPolicy;
use afu9_policy::AutomationPolicyEvaluator;
use afu9_policy::EvaluationRequest;
use afu9_policy::InMemoryLawbookStore;
use afu9_policy::InMemoryPolicyExecutionStore;
use afu9_policy::Lawbook;
use afu9_policy::LawbookResolver;
use afu9_policy::PolicyDecision;
use proptest::prelude::any;
use proptest::prelude::proptest;
use proptest::prop_assert_eq;
use serde_json::json;

/// Builds the deploy policy used across tests.
fn deploy_policy() -> AutomationPolicy {
    AutomationPolicy {
        name: "force-new-deployment".to_string(),
        action_type: "force_new_deployment".to_string(),
        allowed_envs: vec!["staging".to_string(), "production".to_string()],
        cooldown_seconds: 300,
        window_seconds: 3_600,
        max_runs_per_window: 3,
        requires_approval: false,
        idempotency_key_template: Some("deploy:{service}:{env}".to_string()),
    }
}

/// Builds an evaluator with an activated lawbook containing the policies.
fn evaluator(
    policies: Vec<AutomationPolicy>,
) -> (AutomationPolicyEvaluator, Arc<InMemoryPolicyExecutionStore>) {
    let store = Arc::new(InMemoryLawbookStore::new());
    let resolver = Arc::new(LawbookResolver::new(store));
    resolver
        .activate(&Lawbook {
            id: LawbookId::default_id(),
            version: "2026.07.1".to_string(),
            automation_policies: policies,
            activated_at: Timestamp::from_unix_millis(0),
        })
        .unwrap();
    let executions = Arc::new(InMemoryPolicyExecutionStore::new());
    let evaluator = AutomationPolicyEvaluator::new(
        resolver,
        Arc::clone(&executions) as Arc<dyn afu9_policy::PolicyExecutionStore>,
        LawbookId::default_id(),
    );
    (evaluator, executions)
}

/// Builds a deploy evaluation request.
fn request(env: &str, approved: bool) -> EvaluationRequest {
    EvaluationRequest {
        request_id: RequestId::new("req-1"),
        session_id: None,
        action_type: "force_new_deployment".to_string(),
        target_type: "service".to_string(),
        target_identifier: "afu9-api".to_string(),
        action_context: json!({ "service": "afu9-api", "env": env }),
        deployment_env: Some(env.to_string()),
        has_approval: approved,
        actor: Actor::human("op-1"),
    }
}

/// Returns a fixed test timestamp.
fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

/// Verifies no active lawbook denies fail-closed.
#[test]
fn missing_lawbook_denies_fail_closed() {
    let store = Arc::new(InMemoryLawbookStore::new());
    let resolver = Arc::new(LawbookResolver::new(store));
    let executions = Arc::new(InMemoryPolicyExecutionStore::new());
    let evaluator = AutomationPolicyEvaluator::new(
        resolver,
        Arc::clone(&executions) as Arc<dyn afu9_policy::PolicyExecutionStore>,
        LawbookId::default_id(),
    );

    let outcome = evaluator.evaluate(&request("staging", false), at(0));
    assert!(!outcome.allow);
    assert_eq!(outcome.denial_code, Some(ErrorCode::LawbookNotConfigured));
    assert_eq!(outcome.reason, "No active lawbook configured (fail-closed)");
    // Denials are audited too.
    assert_eq!(executions.snapshot().unwrap().len(), 1);
}

/// Verifies an undefined action type is denied.
#[test]
fn missing_policy_is_denied() {
    let (evaluator, _) = evaluator(vec![]);
    let outcome = evaluator.evaluate(&request("staging", false), at(0));
    assert!(!outcome.allow);
    assert_eq!(outcome.denial_code, Some(ErrorCode::LawbookDenied));
}

/// Verifies an invalid rate-limit configuration denies.
#[test]
fn invalid_rate_config_is_denied() {
    let mut policy = deploy_policy();
    policy.window_seconds = 0;
    let (evaluator, _) = evaluator(vec![policy]);
    let outcome = evaluator.evaluate(&request("staging", false), at(0));
    assert!(!outcome.allow);
    assert_eq!(outcome.denial_code, Some(ErrorCode::PolicyConfigError));
}

/// Verifies an environment outside the allowlist is denied.
#[test]
fn environment_gate_denies_unknown_env() {
    let (evaluator, _) = evaluator(vec![deploy_policy()]);
    let outcome = evaluator.evaluate(&request("dev", false), at(0));
    assert!(!outcome.allow);
    assert_eq!(outcome.denial_code, Some(ErrorCode::TargetNotAllowed));
}

/// Verifies a missing environment in an env-gated policy is denied.
#[test]
fn environment_gate_denies_missing_env() {
    let (evaluator, _) = evaluator(vec![deploy_policy()]);
    let mut req = request("staging", false);
    req.deployment_env = None;
    let outcome = evaluator.evaluate(&req, at(0));
    assert!(!outcome.allow);
    assert_eq!(outcome.denial_code, Some(ErrorCode::TargetNotAllowed));
}

/// Verifies the approval gate denies with a retryable outcome.
#[test]
fn approval_gate_denies_without_approval() {
    let mut policy = deploy_policy();
    policy.requires_approval = true;
    let (evaluator, _) = evaluator(vec![policy]);

    let outcome = evaluator.evaluate(&request("staging", false), at(0));
    assert!(!outcome.allow);
    assert_eq!(outcome.denial_code, Some(ErrorCode::ApprovalRequired));
    assert_eq!(outcome.reason, "Action requires explicit approval - not granted");
    assert!(outcome.requires_approval);
    assert!(outcome.next_allowed_at.is_none());

    let approved = evaluator.evaluate(&request("staging", true), at(1));
    assert!(approved.allow);
}

/// Verifies two attempts inside the cooldown deny with the exact retry time.
#[test]
fn cooldown_denies_second_attempt() {
    let (evaluator, executions) = evaluator(vec![deploy_policy()]);
    let t1 = at(10_000);

    let first = evaluator.evaluate(&request("staging", false), t1);
    assert!(first.allow);

    let second = evaluator.evaluate(&request("staging", false), t1.plus_seconds(30));
    assert!(!second.allow);
    assert_eq!(second.denial_code, Some(ErrorCode::CooldownActive));
    assert!(second.reason.contains("Cooldown active"));
    assert_eq!(second.next_allowed_at, Some(t1.plus_seconds(300)));

    let records = executions.snapshot().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].decision, PolicyDecision::Denied);
}

/// Verifies the Nth call in a window succeeds and the (N+1)th is denied.
#[test]
fn rate_limit_boundary_is_exact() {
    let mut policy = deploy_policy();
    policy.cooldown_seconds = 0;
    policy.max_runs_per_window = 3;
    policy.window_seconds = 600;
    let (evaluator, _) = evaluator(vec![policy]);

    let base = at(0);
    for idx in 0..3 {
        let outcome = evaluator.evaluate(&request("staging", false), base.plus_seconds(idx));
        assert!(outcome.allow, "call {idx} should be allowed");
    }
    let over = evaluator.evaluate(&request("staging", false), base.plus_seconds(3));
    assert!(!over.allow);
    assert_eq!(over.denial_code, Some(ErrorCode::RateLimitExceeded));
    assert_eq!(over.next_allowed_at, Some(base.plus_seconds(3).plus_seconds(600)));
}

proptest! {
    /// Verifies decision and key hash are bit-equal across fresh evaluators.
    #[test]
    fn evaluation_is_deterministic_over_contexts(
        service in "[a-z][a-z0-9-]{0,24}",
        millis in 0_i64..1_000_000_000,
        extra in any::<u32>(),
    ) {
        let build_request = || {
            let mut req = request("staging", false);
            req.target_identifier = service.clone();
            req.action_context = json!({ "service": service, "env": "staging", "extra": extra });
            req
        };
        let (first_eval, _) = evaluator(vec![deploy_policy()]);
        let (second_eval, _) = evaluator(vec![deploy_policy()]);
        let a = first_eval.evaluate(&build_request(), at(millis));
        let b = second_eval.evaluate(&build_request(), at(millis));
        prop_assert_eq!(a, b);
    }
}

/// Verifies evaluation is deterministic including the idempotency key hash.
#[test]
fn evaluation_is_deterministic() {
    let (first_eval, _) = evaluator(vec![deploy_policy()]);
    let (second_eval, _) = evaluator(vec![deploy_policy()]);

    let a = first_eval.evaluate(&request("staging", false), at(5));
    let b = second_eval.evaluate(&request("staging", false), at(5));
    assert_eq!(a, b);
    assert_eq!(a.idempotency_key.as_deref(), Some("deploy:afu9-api:staging"));
    assert!(a.idempotency_key_hash.is_some());
    assert_eq!(a.lawbook_version.as_deref(), Some("2026.07.1"));
}
