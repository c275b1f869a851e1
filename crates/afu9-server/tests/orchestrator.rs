// crates/afu9-server/tests/orchestrator.rs
// ============================================================================
// Module: Side-Effect Adapter Tests
// Description: Tests for stability polling and the gated deployment adapter.
// Purpose: Pin the bounded poll, the stability rule, and deny-by-default gating.
// Dependencies: afu9-core, afu9-policy, afu9-server
// ============================================================================
//! ## Overview
//! The stability poll must be strictly bounded (a zero budget times out
//! without polling), the stability rule must require one PRIMARY/ACTIVE
//! deployment at the desired count, and force-new-deployment must execute
//! only behind both the configuration gate and a policy allow.

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
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;

use afu9_core::Actor;
use afu9_core::ErrorCode;
use afu9_core::LawbookId;
use afu9_core::RequestId;
use afu9_core::Timestamp;
use afu9_policy::AutomationPolicy;
use afu9_policy::AutomationPolicyEvaluator;
use afu9_policy::InMemoryApprovalStore;
use afu9_policy::InMemoryLawbookStore;
use afu9_policy::InMemoryPolicyExecutionStore;
use afu9_policy::Lawbook;
use afu9_policy::LawbookResolver;
use afu9_server::orchestrator::DeploymentInfo;
use afu9_server::orchestrator::ForceDeployError;
use afu9_server::orchestrator::ForceNewDeploymentAdapter;
use afu9_server::orchestrator::Orchestrator;
use afu9_server::orchestrator::OrchestratorError;
use afu9_server::orchestrator::ServiceDescription;
use afu9_server::orchestrator::poll_service_stability;

/// Orchestrator that becomes stable after a scripted number of polls.
struct ScriptedOrchestrator {
    /// Polls remaining before stability.
    unstable_polls: AtomicU32,
    /// Recorded force-new-deployment calls.
    deployments: Mutex<Vec<String>>,
}

impl ScriptedOrchestrator {
    /// Creates an orchestrator stable after `unstable_polls` polls.
    fn new(unstable_polls: u32) -> Self {
        Self {
            unstable_polls: AtomicU32::new(unstable_polls),
            deployments: Mutex::new(Vec::new()),
        }
    }
}

impl Orchestrator for ScriptedOrchestrator {
    fn describe_service(
        &self,
        _env: &str,
        _service: &str,
    ) -> Result<ServiceDescription, OrchestratorError> {
        let remaining = self.unstable_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unstable_polls.store(remaining - 1, Ordering::SeqCst);
            return Ok(ServiceDescription {
                running_count: 1,
                desired_count: 2,
                deployments: vec![
                    DeploymentInfo {
                        status: "PRIMARY".to_string(),
                    },
                    DeploymentInfo {
                        status: "DRAINING".to_string(),
                    },
                ],
            });
        }
        Ok(ServiceDescription {
            running_count: 2,
            desired_count: 2,
            deployments: vec![DeploymentInfo {
                status: "PRIMARY".to_string(),
            }],
        })
    }

    fn force_new_deployment(&self, env: &str, service: &str) -> Result<(), OrchestratorError> {
        self.deployments.lock().unwrap().push(format!("{env}/{service}"));
        Ok(())
    }
}

/// Verifies the stability rule over count and deployment shape.
#[test]
fn stability_rule_matches_contract() {
    let stable = ServiceDescription {
        running_count: 2,
        desired_count: 2,
        deployments: vec![DeploymentInfo {
            status: "ACTIVE".to_string(),
        }],
    };
    assert!(stable.is_stable());

    let short = ServiceDescription {
        running_count: 1,
        ..stable.clone()
    };
    assert!(!short.is_stable());

    let draining = ServiceDescription {
        deployments: vec![
            DeploymentInfo {
                status: "PRIMARY".to_string(),
            },
            DeploymentInfo {
                status: "DRAINING".to_string(),
            },
        ],
        ..stable.clone()
    };
    assert!(!draining.is_stable());

    let inactive = ServiceDescription {
        deployments: vec![DeploymentInfo {
            status: "DRAINING".to_string(),
        }],
        ..stable
    };
    assert!(!inactive.is_stable());
}

/// Verifies a zero wait budget times out without polling.
#[test]
fn zero_budget_times_out_immediately() {
    let orchestrator = ScriptedOrchestrator::new(0);
    let mut waits = 0_u32;
    let result = poll_service_stability(&orchestrator, "staging", "afu9-api", 0, 5, &mut |_| {
        waits += 1;
    });
    assert!(!result.stable);
    assert_eq!(result.error, Some(ErrorCode::Timeout));
    assert_eq!(result.attempts, 0);
    assert_eq!(waits, 0);
}

/// Verifies the poll succeeds once the service stabilizes inside the budget.
#[test]
fn poll_succeeds_within_budget() {
    let orchestrator = ScriptedOrchestrator::new(2);
    let mut waits = 0_u32;
    let result = poll_service_stability(&orchestrator, "staging", "afu9-api", 30, 5, &mut |_| {
        waits += 1;
    });
    assert!(result.stable);
    assert_eq!(result.attempts, 3);
    assert_eq!(waits, 2);
}

/// Verifies the poll times out when stability never arrives.
#[test]
fn poll_times_out_on_persistent_instability() {
    let orchestrator = ScriptedOrchestrator::new(u32::MAX);
    let mut waits = 0_u32;
    let result = poll_service_stability(&orchestrator, "staging", "afu9-api", 20, 5, &mut |_| {
        waits += 1;
    });
    assert!(!result.stable);
    assert_eq!(result.error, Some(ErrorCode::Timeout));
    assert_eq!(result.attempts, 4);
}

/// Builds an adapter with a configured deploy policy.
fn adapter(enabled: bool, orchestrator: Arc<ScriptedOrchestrator>) -> ForceNewDeploymentAdapter {
    let lawbooks = Arc::new(InMemoryLawbookStore::new());
    let resolver = Arc::new(LawbookResolver::new(lawbooks));
    resolver
        .activate(&Lawbook {
            id: LawbookId::default_id(),
            version: "2026.07.1".to_string(),
            automation_policies: vec![AutomationPolicy {
                name: "force-new-deployment".to_string(),
                action_type: "force_new_deployment".to_string(),
                allowed_envs: vec!["staging".to_string()],
                cooldown_seconds: 0,
                window_seconds: 3_600,
                max_runs_per_window: 10,
                requires_approval: false,
                idempotency_key_template: None,
            }],
            activated_at: Timestamp::from_unix_millis(0),
        })
        .unwrap();
    let evaluator = Arc::new(AutomationPolicyEvaluator::new(
        resolver,
        Arc::new(InMemoryPolicyExecutionStore::new())
            as Arc<dyn afu9_policy::PolicyExecutionStore>,
        LawbookId::default_id(),
    ));
    ForceNewDeploymentAdapter::new(
        enabled,
        evaluator,
        Arc::new(InMemoryApprovalStore::new()) as Arc<dyn afu9_policy::ApprovalStore>,
        orchestrator,
    )
}

/// Verifies the configuration gate denies by default.
#[test]
fn disabled_adapter_refuses() {
    let orchestrator = Arc::new(ScriptedOrchestrator::new(0));
    let adapter = adapter(false, Arc::clone(&orchestrator));
    let err = adapter
        .execute(
            &RequestId::new("req-1"),
            "staging",
            "afu9-api",
            &Actor::human("op"),
            Timestamp::from_unix_millis(0),
        )
        .unwrap_err();
    assert!(matches!(err, ForceDeployError::Disabled));
    assert!(orchestrator.deployments.lock().unwrap().is_empty());
}

/// Verifies a policy denial suppresses the side-effect.
#[test]
fn denied_evaluation_suppresses_side_effect() {
    let orchestrator = Arc::new(ScriptedOrchestrator::new(0));
    let adapter = adapter(true, Arc::clone(&orchestrator));
    let outcome = adapter
        .execute(
            &RequestId::new("req-1"),
            "production",
            "afu9-api",
            &Actor::human("op"),
            Timestamp::from_unix_millis(0),
        )
        .unwrap();
    assert!(!outcome.executed);
    assert!(!outcome.evaluation.allow);
    assert!(orchestrator.deployments.lock().unwrap().is_empty());
}

/// Verifies an allowed evaluation executes the deployment.
#[test]
fn allowed_evaluation_executes() {
    let orchestrator = Arc::new(ScriptedOrchestrator::new(0));
    let adapter = adapter(true, Arc::clone(&orchestrator));
    let outcome = adapter
        .execute(
            &RequestId::new("req-1"),
            "staging",
            "afu9-api",
            &Actor::human("op"),
            Timestamp::from_unix_millis(0),
        )
        .unwrap();
    assert!(outcome.executed);
    assert!(outcome.evaluation.allow);
    assert_eq!(
        orchestrator.deployments.lock().unwrap().as_slice(),
        ["staging/afu9-api"]
    );
}
