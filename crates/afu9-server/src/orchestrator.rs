// crates/afu9-server/src/orchestrator.rs
// ============================================================================
// Module: Side-Effect Adapters
// Description: Bounded, policy-gated operations against container orchestrators.
// Purpose: Keep external side-effects deny-by-default and deadline-bounded.
// Dependencies: afu9-core, afu9-policy, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The orchestrator contract is intentionally narrow: describe a service,
//! force a new deployment, and poll until stable with a bounded loop. The
//! force-new-deployment adapter is deny-by-default: the environment flag and
//! an automation-policy allow are both required, and every decision is
//! recorded by the evaluator regardless.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use afu9_core::Actor;
use afu9_core::ErrorCode;
use afu9_core::RequestId;
use afu9_core::Timestamp;
use afu9_policy::ApprovalError;
use afu9_policy::ApprovalStore;
use afu9_policy::AutomationPolicyEvaluator;
use afu9_policy::EvaluationOutcome;
use afu9_policy::EvaluationRequest;
use afu9_policy::has_approval;

// ============================================================================
// SECTION: Contract
// ============================================================================

/// One deployment within a service description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    /// Deployment status label (`PRIMARY`, `ACTIVE`, `DRAINING`, ...).
    pub status: String,
}

/// Narrow service description returned by orchestrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    /// Running task count.
    pub running_count: i64,
    /// Desired task count.
    pub desired_count: i64,
    /// Deployments currently attached to the service.
    pub deployments: Vec<DeploymentInfo>,
}

impl ServiceDescription {
    /// Returns true when the service satisfies the stability rule.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.running_count == self.desired_count
            && self.deployments.len() == 1
            && self
                .deployments
                .first()
                .is_some_and(|deployment| matches!(deployment.status.as_str(), "PRIMARY" | "ACTIVE"))
    }
}

/// Errors raised by orchestrator adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Service not found.
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    /// Orchestrator API failure.
    #[error("orchestrator error: {0}")]
    Api(String),
}

/// Narrow orchestrator contract consumed by the adapters.
pub trait Orchestrator: Send + Sync {
    /// Describes a service in an environment.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the call fails.
    fn describe_service(
        &self,
        env: &str,
        service: &str,
    ) -> Result<ServiceDescription, OrchestratorError>;

    /// Forces a new deployment of a service.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the call fails.
    fn force_new_deployment(&self, env: &str, service: &str) -> Result<(), OrchestratorError>;
}

/// Orchestrator stand-in for deployments without a configured backend.
///
/// Every call fails, which keeps the side-effect surface deny-by-default
/// until an operator wires a real orchestrator.
pub struct UnconfiguredOrchestrator;

impl Orchestrator for UnconfiguredOrchestrator {
    fn describe_service(
        &self,
        _env: &str,
        service: &str,
    ) -> Result<ServiceDescription, OrchestratorError> {
        Err(OrchestratorError::Api(format!(
            "no orchestrator configured; cannot describe {service}"
        )))
    }

    fn force_new_deployment(&self, _env: &str, service: &str) -> Result<(), OrchestratorError> {
        Err(OrchestratorError::Api(format!(
            "no orchestrator configured; cannot deploy {service}"
        )))
    }
}

// ============================================================================
// SECTION: Stability Polling
// ============================================================================

/// Result of a bounded stability poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityResult {
    /// True when the service reached the stability rule in time.
    pub stable: bool,
    /// `TIMEOUT` when the deadline elapsed; other codes for adapter errors.
    pub error: Option<ErrorCode>,
    /// Poll attempts performed.
    pub attempts: u32,
}

/// Polls a service until stable or the deadline elapses.
///
/// The loop is bounded to `max_wait_seconds / check_interval_seconds`
/// attempts; a zero budget returns `{ stable: false, TIMEOUT }` without
/// polling. Deadline exhaustion is a result, never a panic or an error.
pub fn poll_service_stability(
    orchestrator: &dyn Orchestrator,
    env: &str,
    service: &str,
    max_wait_seconds: u64,
    check_interval_seconds: u64,
    wait: &mut dyn FnMut(Duration),
) -> StabilityResult {
    let interval = check_interval_seconds.max(1);
    let max_attempts: u32 = (max_wait_seconds / interval).try_into().unwrap_or(u32::MAX);
    let mut attempts: u32 = 0;
    while attempts < max_attempts {
        attempts += 1;
        match orchestrator.describe_service(env, service) {
            Ok(description) if description.is_stable() => {
                return StabilityResult {
                    stable: true,
                    error: None,
                    attempts,
                };
            }
            // Describe failures consume the attempt budget.
            Ok(_) | Err(_) => {}
        }
        if attempts < max_attempts {
            wait(Duration::from_secs(interval));
        }
    }
    StabilityResult {
        stable: false,
        error: Some(ErrorCode::Timeout),
        attempts,
    }
}

// ============================================================================
// SECTION: Force-New-Deployment Adapter
// ============================================================================

/// Outcome of a gated force-new-deployment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceDeployOutcome {
    /// True when the deployment was actually forced.
    pub executed: bool,
    /// Policy evaluation outcome backing the decision.
    pub evaluation: EvaluationOutcome,
}

/// Errors raised by the force-new-deployment adapter.
#[derive(Debug, Error)]
pub enum ForceDeployError {
    /// The adapter is disabled by configuration (deny-by-default).
    #[error("force-new-deployment adapter is disabled")]
    Disabled,
    /// Approval store failure.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    /// Orchestrator failure after an allow.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

/// Policy-gated force-new-deployment adapter.
pub struct ForceNewDeploymentAdapter {
    /// Environment gate (`FORCE_NEW_DEPLOY_ENABLED`).
    enabled: bool,
    /// Automation policy evaluator.
    evaluator: Arc<AutomationPolicyEvaluator>,
    /// Approval gate store.
    approvals: Arc<dyn ApprovalStore>,
    /// Orchestrator the side-effect runs against.
    orchestrator: Arc<dyn Orchestrator>,
}

impl ForceNewDeploymentAdapter {
    /// Action type governed by the automation policy.
    pub const ACTION_TYPE: &'static str = "force_new_deployment";

    /// Creates the adapter.
    #[must_use]
    pub fn new(
        enabled: bool,
        evaluator: Arc<AutomationPolicyEvaluator>,
        approvals: Arc<dyn ApprovalStore>,
        orchestrator: Arc<dyn Orchestrator>,
    ) -> Self {
        Self {
            enabled,
            evaluator,
            approvals,
            orchestrator,
        }
    }

    /// Executes a gated force-new-deployment.
    ///
    /// The side-effect runs only when the configuration gate is open and the
    /// evaluator allows; a denial returns the evaluation for the caller to
    /// surface, never an error.
    ///
    /// # Errors
    ///
    /// Returns [`ForceDeployError::Disabled`] when the adapter is off and
    /// propagates approval-store or orchestrator failures.
    pub fn execute(
        &self,
        request_id: &RequestId,
        env: &str,
        service: &str,
        actor: &Actor,
        now: Timestamp,
    ) -> Result<ForceDeployOutcome, ForceDeployError> {
        if !self.enabled {
            return Err(ForceDeployError::Disabled);
        }
        let approved = has_approval(self.approvals.as_ref(), Self::ACTION_TYPE, service)?;
        let evaluation = self.evaluator.evaluate(
            &EvaluationRequest {
                request_id: request_id.clone(),
                session_id: None,
                action_type: Self::ACTION_TYPE.to_string(),
                target_type: "service".to_string(),
                target_identifier: service.to_string(),
                action_context: json!({ "service": service, "env": env }),
                deployment_env: Some(env.to_string()),
                has_approval: approved,
                actor: actor.clone(),
            },
            now,
        );
        if !evaluation.allow {
            return Ok(ForceDeployOutcome {
                executed: false,
                evaluation,
            });
        }
        self.orchestrator.force_new_deployment(env, service)?;
        Ok(ForceDeployOutcome {
            executed: true,
            evaluation,
        })
    }
}
