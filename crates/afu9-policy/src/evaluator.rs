// crates/afu9-policy/src/evaluator.rs
// ============================================================================
// Module: Automation Policy Evaluator
// Description: Deterministic admissibility decisions for proposed side-effects.
// Purpose: Enforce environment, approval, cooldown, and rate-limit gates fail-closed.
// Dependencies: afu9-core, crate::{lawbook, resolver}, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The evaluator runs a fixed sequence of checks; the first failure wins and
//! every call, allowed or denied, produces a [`PolicyExecutionRecord`].
//! Internal errors are never surfaced as allows. Determinism contract: given
//! the same request and the same past-execution probe, the decision and the
//! idempotency key hash are bit-equal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use afu9_core::Actor;
use afu9_core::ErrorCode;
use afu9_core::LawbookId;
use afu9_core::RequestId;
use afu9_core::Timestamp;
use afu9_core::hashing::hash_bytes;
use afu9_core::hashing::sha256_hex_canonical;

use crate::lawbook::AutomationPolicy;
use crate::resolver::LawbookResolver;
use crate::resolver::ResolverError;

// ============================================================================
// SECTION: Request and Outcome
// ============================================================================

/// Proposed side-effect submitted for evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Caller request identifier.
    pub request_id: RequestId,
    /// Optional session identifier.
    pub session_id: Option<String>,
    /// Action type (e.g. `force_new_deployment`).
    pub action_type: String,
    /// Target type label (e.g. `service`).
    pub target_type: String,
    /// Target identifier the gates key on.
    pub target_identifier: String,
    /// Action context used for idempotency keys and fingerprints.
    pub action_context: Value,
    /// Deployment environment, when the action targets one.
    pub deployment_env: Option<String>,
    /// Whether an explicit approval accompanies the request.
    pub has_approval: bool,
    /// Requesting actor.
    pub actor: Actor,
}

/// Decision recorded for an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyDecision {
    /// Action may proceed.
    Allowed,
    /// Action is denied.
    Denied,
}

/// Full evaluation outcome returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    /// True when the action may proceed.
    pub allow: bool,
    /// Recorded decision.
    pub decision: PolicyDecision,
    /// Human-readable reason.
    pub reason: String,
    /// Stable error code when denied.
    pub denial_code: Option<ErrorCode>,
    /// Earliest time a retry can succeed, when the denial is temporal.
    pub next_allowed_at: Option<Timestamp>,
    /// True when the denial is waiting on an explicit approval.
    pub requires_approval: bool,
    /// Rendered idempotency key.
    pub idempotency_key: Option<String>,
    /// SHA-256 hash of the idempotency key.
    pub idempotency_key_hash: Option<String>,
    /// Name of the policy that matched.
    pub policy_name: Option<String>,
    /// Rulebook version in effect.
    pub lawbook_version: Option<String>,
    /// Rulebook content hash in effect.
    pub lawbook_hash: Option<String>,
    /// Structured data describing the enforcement inputs.
    pub enforcement_data: Value,
}

// ============================================================================
// SECTION: Execution Records
// ============================================================================

/// Audit row produced by every evaluation.
///
/// # Invariants
/// - Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyExecutionRecord {
    /// Action type evaluated.
    pub action_type: String,
    /// Canonical fingerprint of (action, target, context).
    pub action_fingerprint: String,
    /// Target identifier evaluated.
    pub target_identifier: String,
    /// Recorded decision.
    pub decision: PolicyDecision,
    /// Human-readable reason.
    pub reason: String,
    /// SHA-256 hash of the idempotency key, when computed.
    pub idempotency_key_hash: Option<String>,
    /// Rulebook version in effect, when resolved.
    pub lawbook_version: Option<String>,
    /// Rulebook content hash in effect, when resolved.
    pub lawbook_hash: Option<String>,
    /// Evaluation timestamp.
    pub created_at: Timestamp,
    /// Structured enforcement inputs.
    pub enforcement_data: Value,
}

/// Probe of past allowed executions for the cooldown and rate-limit gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionProbe {
    /// Timestamp of the most recent allowed execution.
    pub last_allowed_at: Option<Timestamp>,
    /// Allowed executions inside the trailing window.
    pub allowed_in_window: i64,
}

/// Errors raised by policy execution stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyStoreError {
    /// Underlying store failure.
    #[error("policy execution store error: {0}")]
    Store(String),
}

/// Store for policy execution audit rows and gate probes.
///
/// Implementations serialize the probe/record pair (the SQLite store routes
/// both through one guarded write connection) so the rate-limit count and the
/// audit insert stay consistent.
pub trait PolicyExecutionStore: Send + Sync {
    /// Probes past allowed executions for `(action_type, target_identifier)`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the query fails.
    fn probe(
        &self,
        action_type: &str,
        target_identifier: &str,
        window_seconds: i64,
        now: Timestamp,
    ) -> Result<ExecutionProbe, PolicyStoreError>;

    /// Appends an execution record.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the insert fails.
    fn record(&self, record: &PolicyExecutionRecord) -> Result<(), PolicyStoreError>;
}

/// Mutex-guarded in-memory execution store.
#[derive(Debug, Default)]
pub struct InMemoryPolicyExecutionStore {
    /// Append-only execution rows.
    records: Mutex<Vec<PolicyExecutionRecord>>,
}

impl InMemoryPolicyExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded rows.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the store mutex is poisoned.
    pub fn snapshot(&self) -> Result<Vec<PolicyExecutionRecord>, PolicyStoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| PolicyStoreError::Store("execution store poisoned".to_string()))?;
        Ok(records.clone())
    }
}

impl PolicyExecutionStore for InMemoryPolicyExecutionStore {
    fn probe(
        &self,
        action_type: &str,
        target_identifier: &str,
        window_seconds: i64,
        now: Timestamp,
    ) -> Result<ExecutionProbe, PolicyStoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| PolicyStoreError::Store("execution store poisoned".to_string()))?;
        let allowed = records.iter().filter(|record| {
            record.action_type == action_type
                && record.target_identifier == target_identifier
                && record.decision == PolicyDecision::Allowed
        });
        let mut last_allowed_at = None;
        let mut allowed_in_window = 0_i64;
        let window_ms = window_seconds.saturating_mul(1_000);
        for record in allowed {
            if last_allowed_at.is_none_or(|seen| record.created_at > seen) {
                last_allowed_at = Some(record.created_at);
            }
            if now.millis_since(record.created_at) < window_ms {
                allowed_in_window += 1;
            }
        }
        Ok(ExecutionProbe {
            last_allowed_at,
            allowed_in_window,
        })
    }

    fn record(&self, record: &PolicyExecutionRecord) -> Result<(), PolicyStoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PolicyStoreError::Store("execution store poisoned".to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Automation policy evaluator over a resolver and an execution store.
pub struct AutomationPolicyEvaluator {
    /// Lawbook resolver used for fail-closed rulebook loads.
    resolver: Arc<LawbookResolver>,
    /// Execution store for probes and audit rows.
    executions: Arc<dyn PolicyExecutionStore>,
    /// Rulebook id governing this evaluator.
    lawbook_id: LawbookId,
}

/// Intermediate denial description used while the checks run.
struct Denial {
    /// Human-readable reason.
    reason: String,
    /// Stable error code.
    code: ErrorCode,
    /// Earliest retry time for temporal denials.
    next_allowed_at: Option<Timestamp>,
    /// True when waiting on an approval.
    requires_approval: bool,
}

impl AutomationPolicyEvaluator {
    /// Creates an evaluator.
    #[must_use]
    pub fn new(
        resolver: Arc<LawbookResolver>,
        executions: Arc<dyn PolicyExecutionStore>,
        lawbook_id: LawbookId,
    ) -> Self {
        Self {
            resolver,
            executions,
            lawbook_id,
        }
    }

    /// Evaluates a proposed side-effect.
    ///
    /// Never returns an error: every internal failure is converted into a
    /// denial outcome, and an execution record is written for every call.
    #[must_use]
    pub fn evaluate(&self, request: &EvaluationRequest, now: Timestamp) -> EvaluationOutcome {
        let mut context = OutcomeContext::new(request, now);
        let denial = self.run_checks(request, now, &mut context);
        let outcome = context.into_outcome(denial);
        self.record_outcome(request, &outcome, now);
        outcome
    }

    /// Runs the ordered checks; returns the first denial, if any.
    fn run_checks(
        &self,
        request: &EvaluationRequest,
        now: Timestamp,
        context: &mut OutcomeContext,
    ) -> Option<Denial> {
        // Check 1: active rulebook (fail-closed).
        let lawbook = match self.resolver.require_active(&self.lawbook_id, now) {
            Ok(lawbook) => lawbook,
            Err(ResolverError::NotConfigured(_)) => {
                return Some(Denial {
                    reason: "No active lawbook configured (fail-closed)".to_string(),
                    code: ErrorCode::LawbookNotConfigured,
                    next_allowed_at: None,
                    requires_approval: false,
                });
            }
            Err(ResolverError::Store(err)) => return Some(internal_denial(&err.to_string())),
        };
        context.lawbook_version = Some(lawbook.version.clone());
        context.lawbook_hash = lawbook.content_hash().ok();

        // Check 2: a policy must exist for the action type.
        let Some(policy) = lawbook.policy_for(&request.action_type) else {
            return Some(Denial {
                reason: format!("No policy defined for action type {}", request.action_type),
                code: ErrorCode::LawbookDenied,
                next_allowed_at: None,
                requires_approval: false,
            });
        };
        context.policy_name = Some(policy.name.clone());
        context.enforcement_data = enforcement_data(policy, request);

        // Check 3: rate-limit configuration must be sane.
        if policy.window_seconds <= 0 || policy.max_runs_per_window <= 0 || policy.cooldown_seconds < 0
        {
            return Some(Denial {
                reason: format!("Policy {} has invalid rate-limit configuration", policy.name),
                code: ErrorCode::PolicyConfigError,
                next_allowed_at: None,
                requires_approval: false,
            });
        }

        // Check 4: idempotency key.
        match compute_idempotency_key(policy, request) {
            Ok((key, hash)) => {
                context.idempotency_key = Some(key);
                context.idempotency_key_hash = Some(hash);
            }
            Err(err) => return Some(internal_denial(&err)),
        }

        // Check 5: environment allowlist.
        if !policy.allowed_envs.is_empty() {
            match request.deployment_env.as_deref() {
                None => {
                    return Some(Denial {
                        reason: format!(
                            "Policy {} requires a deployment environment",
                            policy.name
                        ),
                        code: ErrorCode::TargetNotAllowed,
                        next_allowed_at: None,
                        requires_approval: false,
                    });
                }
                Some(env) if !policy.allowed_envs.iter().any(|allowed| allowed == env) => {
                    return Some(Denial {
                        reason: format!("Environment {env} is not allowed for {}", policy.name),
                        code: ErrorCode::TargetNotAllowed,
                        next_allowed_at: None,
                        requires_approval: false,
                    });
                }
                Some(_) => {}
            }
        }

        // Check 6: approval gate.
        if policy.requires_approval && !request.has_approval {
            return Some(Denial {
                reason: "Action requires explicit approval - not granted".to_string(),
                code: ErrorCode::ApprovalRequired,
                next_allowed_at: None,
                requires_approval: true,
            });
        }

        // Checks 7 and 8: cooldown, then trailing-window rate limit.
        let probe = match self.executions.probe(
            &request.action_type,
            &request.target_identifier,
            policy.window_seconds,
            now,
        ) {
            Ok(probe) => probe,
            Err(err) => return Some(internal_denial(&err.to_string())),
        };
        context.probe = Some(probe);

        if policy.cooldown_seconds > 0
            && let Some(last) = probe.last_allowed_at
        {
            let next_allowed = last.plus_seconds(policy.cooldown_seconds);
            if now < next_allowed {
                return Some(Denial {
                    reason: format!(
                        "Cooldown active for {} until {next_allowed}",
                        request.target_identifier
                    ),
                    code: ErrorCode::CooldownActive,
                    next_allowed_at: Some(next_allowed),
                    requires_approval: false,
                });
            }
        }

        if probe.allowed_in_window >= policy.max_runs_per_window {
            return Some(Denial {
                reason: format!(
                    "Rate limit exceeded: {} of {} runs in window",
                    probe.allowed_in_window, policy.max_runs_per_window
                ),
                code: ErrorCode::RateLimitExceeded,
                next_allowed_at: Some(now.plus_seconds(policy.window_seconds)),
                requires_approval: false,
            });
        }

        None
    }

    /// Writes the execution record; recording failures cannot flip a decision.
    fn record_outcome(
        &self,
        request: &EvaluationRequest,
        outcome: &EvaluationOutcome,
        now: Timestamp,
    ) {
        let fingerprint = action_fingerprint(request);
        let record = PolicyExecutionRecord {
            action_type: request.action_type.clone(),
            action_fingerprint: fingerprint,
            target_identifier: request.target_identifier.clone(),
            decision: outcome.decision,
            reason: outcome.reason.clone(),
            idempotency_key_hash: outcome.idempotency_key_hash.clone(),
            lawbook_version: outcome.lawbook_version.clone(),
            lawbook_hash: outcome.lawbook_hash.clone(),
            created_at: now,
            enforcement_data: outcome.enforcement_data.clone(),
        };
        // A failed audit write must not upgrade a denial or revoke an allow
        // after the fact; the store is the durability boundary.
        let _ = self.executions.record(&record);
    }
}

// ============================================================================
// SECTION: Outcome Assembly
// ============================================================================

/// Accumulates outcome fields while the checks run.
struct OutcomeContext {
    /// Rendered idempotency key.
    idempotency_key: Option<String>,
    /// SHA-256 hash of the idempotency key.
    idempotency_key_hash: Option<String>,
    /// Matched policy name.
    policy_name: Option<String>,
    /// Rulebook version in effect.
    lawbook_version: Option<String>,
    /// Rulebook content hash in effect.
    lawbook_hash: Option<String>,
    /// Enforcement inputs.
    enforcement_data: Value,
    /// Probe result, when reached.
    probe: Option<ExecutionProbe>,
}

impl OutcomeContext {
    /// Creates an empty context for a request.
    fn new(request: &EvaluationRequest, now: Timestamp) -> Self {
        Self {
            idempotency_key: None,
            idempotency_key_hash: None,
            policy_name: None,
            lawbook_version: None,
            lawbook_hash: None,
            enforcement_data: json!({
                "actionType": request.action_type,
                "targetIdentifier": request.target_identifier,
                "evaluatedAt": now.as_unix_millis(),
            }),
            probe: None,
        }
    }

    /// Finalizes the outcome from the accumulated context.
    fn into_outcome(mut self, denial: Option<Denial>) -> EvaluationOutcome {
        if let Some(probe) = self.probe
            && let Value::Object(map) = &mut self.enforcement_data
        {
            map.insert("allowedInWindow".to_string(), json!(probe.allowed_in_window));
            map.insert(
                "lastAllowedAt".to_string(),
                json!(probe.last_allowed_at.map(Timestamp::as_unix_millis)),
            );
        }
        match denial {
            Some(denial) => EvaluationOutcome {
                allow: false,
                decision: PolicyDecision::Denied,
                reason: denial.reason,
                denial_code: Some(denial.code),
                next_allowed_at: denial.next_allowed_at,
                requires_approval: denial.requires_approval,
                idempotency_key: self.idempotency_key,
                idempotency_key_hash: self.idempotency_key_hash,
                policy_name: self.policy_name,
                lawbook_version: self.lawbook_version,
                lawbook_hash: self.lawbook_hash,
                enforcement_data: self.enforcement_data,
            },
            None => EvaluationOutcome {
                allow: true,
                decision: PolicyDecision::Allowed,
                reason: self
                    .policy_name
                    .as_deref()
                    .map_or_else(|| "Allowed".to_string(), |name| format!("Allowed by {name}")),
                denial_code: None,
                next_allowed_at: None,
                requires_approval: false,
                idempotency_key: self.idempotency_key,
                idempotency_key_hash: self.idempotency_key_hash,
                policy_name: self.policy_name,
                lawbook_version: self.lawbook_version,
                lawbook_hash: self.lawbook_hash,
                enforcement_data: self.enforcement_data,
            },
        }
    }
}

/// Builds an internal-error denial (fail-closed).
fn internal_denial(detail: &str) -> Denial {
    Denial {
        reason: format!("Internal evaluation error (fail-closed): {detail}"),
        code: ErrorCode::Internal,
        next_allowed_at: None,
        requires_approval: false,
    }
}

/// Builds the enforcement data snapshot for a matched policy.
fn enforcement_data(policy: &AutomationPolicy, request: &EvaluationRequest) -> Value {
    json!({
        "actionType": request.action_type,
        "targetIdentifier": request.target_identifier,
        "deploymentEnv": request.deployment_env,
        "hasApproval": request.has_approval,
        "cooldownSeconds": policy.cooldown_seconds,
        "windowSeconds": policy.window_seconds,
        "maxRunsPerWindow": policy.max_runs_per_window,
        "requiresApproval": policy.requires_approval,
    })
}

// ============================================================================
// SECTION: Keys and Fingerprints
// ============================================================================

/// Computes the canonical action fingerprint for an evaluation request.
#[must_use]
pub fn action_fingerprint(request: &EvaluationRequest) -> String {
    sha256_hex_canonical(&json!({
        "actionType": request.action_type,
        "targetIdentifier": request.target_identifier,
        "actionContext": request.action_context,
    }))
    .unwrap_or_else(|_| String::new())
}

/// Renders the idempotency key and its SHA-256 hash for a request.
///
/// The policy template substitutes `{field}` placeholders from top-level
/// action-context fields; without a template the key falls back to
/// `action:target:context-hash`.
fn compute_idempotency_key(
    policy: &AutomationPolicy,
    request: &EvaluationRequest,
) -> Result<(String, String), String> {
    let key = match &policy.idempotency_key_template {
        Some(template) => render_template(template, &request.action_context),
        None => {
            let context_hash = sha256_hex_canonical(&request.action_context)
                .map_err(|err| err.to_string())?;
            format!(
                "{}:{}:{context_hash}",
                request.action_type, request.target_identifier
            )
        }
    };
    let hash = hash_bytes(key.as_bytes()).value;
    Ok((key, hash))
}

/// Substitutes `{field}` placeholders from top-level context fields.
///
/// Unresolvable placeholders render as `null` so the key stays deterministic
/// rather than failing open.
fn render_template(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        if let Some(end) = after.find('}') {
            let field = &after[..end];
            let rendered = context.get(field).map_or_else(
                || "null".to_string(),
                |value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                },
            );
            out.push_str(&rendered);
            rest = &after[end + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}
