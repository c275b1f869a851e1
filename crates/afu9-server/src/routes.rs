// crates/afu9-server/src/routes.rs
// ============================================================================
// Module: HTTP Routes
// Description: The version-stable AFU-9 API surface.
// Purpose: Bridge HTTP onto the synchronous control-plane domain.
// Dependencies: afu9-core, afu9-evidence, axum, rand, serde, serde_json
// ============================================================================

//! ## Overview
//! Routes parse and validate input, check the service token on writes, then
//! call into the synchronous domain through a blocking bridge. Every response
//! echoes the request id; every failure is an [`ApiError`] envelope; every
//! request leaves one audit line.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use afu9_core::Actor;
use afu9_core::CanonicalId;
use afu9_core::ErrorCode;
use afu9_core::Issue;
use afu9_core::IssueDraft;
use afu9_core::IssueFilter;
use afu9_core::IssueId;
use afu9_core::IssuePatch;
use afu9_core::LocalStatus;
use afu9_core::RequestId;
use afu9_core::Run;
use afu9_core::RunBundle;
use afu9_core::RunId;
use afu9_core::RunStatus;
use afu9_core::RunStep;
use afu9_core::SpecFields;
use afu9_core::StepStatus;
use afu9_core::Timestamp;
use afu9_core::effective_status;
use afu9_core::interfaces::ActivationMode;
use afu9_evidence::NaturalKey;
use afu9_evidence::NodeInput;
use afu9_evidence::NodeType;
use afu9_evidence::SourceSystem;
use afu9_evidence::chain_for_issue;

use crate::audit::RequestAuditEvent;
use crate::auth::admin_token_ok;
use crate::auth::service_token_ok;
use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::error::unauthorized;
use crate::orchestrator::ForceDeployError;
use crate::state::AppState;
use crate::state::now;
use crate::webhook::IntakeError;
use crate::webhook::WebhookHeaders;
use crate::webhook::handle_inbound_webhook;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full API router.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/afu9/issues", get(list_issues))
        .route("/api/afu9/issues/{id}", get(issue_detail))
        .route("/api/afu9/s1s3/issues/pick", post(pick_issue))
        .route("/api/afu9/s1s3/issues/{id}/spec", post(save_spec))
        .route("/api/afu9/s1s3/issues/{id}/implement", post(implement_issue))
        .route("/api/timeline/chain", get(timeline_chain))
        .route("/api/deploy/status", get(deploy_status))
        .route("/api/deploy/force", post(force_deploy))
        .route("/api/webhooks/forge", post(inbound_webhook))
        .route("/api/admin/navigation/{role}", get(get_navigation).put(put_navigation))
        .route("/api/health", get(health))
        .route("/api/ready", get(ready))
        .with_state(state)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts or generates the request id.
fn request_id(headers: &HeaderMap) -> RequestId {
    headers
        .get("X-Request-Id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(generated_request_id, RequestId::new)
}

/// Generates a fresh request id.
fn generated_request_id() -> RequestId {
    let token: u64 = rand::thread_rng().r#gen();
    RequestId::new(format!("req-{token:016x}"))
}

/// Runs synchronous domain code without stalling the async executor.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Records the request audit line.
fn audit(
    state: &AppState,
    request_id: &RequestId,
    method: &str,
    route: &'static str,
    status: StatusCode,
    code: Option<ErrorCode>,
) {
    state.audit.record(&RequestAuditEvent {
        event: "api_request",
        timestamp_ms: now().as_unix_millis(),
        request_id: request_id.as_str().to_string(),
        method: method.to_string(),
        route: route.to_string(),
        status: status.as_u16(),
        error_code: code.map(|code| code.as_str().to_string()),
    });
}

/// Builds a success response with the request id echoed.
fn ok_response<T: Serialize>(
    status: StatusCode,
    request_id: &RequestId,
    body: &T,
) -> Response {
    (
        status,
        [("X-Request-Id", request_id.as_str().to_string())],
        Json(serde_json::to_value(body).unwrap_or(Value::Null)),
    )
        .into_response()
}

/// Checks the service token on write endpoints.
fn require_service_token(
    headers: &HeaderMap,
    config: &ServerConfig,
    request_id: &RequestId,
) -> Result<(), ApiError> {
    if service_token_ok(headers, config.service_token.as_deref()) {
        Ok(())
    } else {
        Err(unauthorized(request_id))
    }
}

/// Checks service authentication plus the admin role on admin endpoints.
///
/// An authenticated caller without the admin token is forbidden (403), not
/// unauthenticated (401).
fn require_admin(
    headers: &HeaderMap,
    config: &ServerConfig,
    request_id: &RequestId,
) -> Result<(), ApiError> {
    require_service_token(headers, config, request_id)?;
    if admin_token_ok(headers, config.admin_token.as_deref()) {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::Forbidden,
            request_id,
            "admin role required for this endpoint",
        ))
    }
}

/// Projects an Issue into its API shape with the effective status.
fn issue_view(issue: &Issue) -> Value {
    json!({
        "id": issue.id,
        "publicId": issue.public_id,
        "canonicalId": issue.canonical_id,
        "title": issue.title,
        "status": issue.local_status,
        "effectiveStatus": effective_status(
            issue.local_status,
            issue.forge_mirror_status,
            issue.execution_state,
        ),
        "executionState": issue.execution_state,
        "handoffState": issue.handoff_state,
        "priority": issue.priority,
        "labels": issue.labels,
        "spec": issue.spec,
        "forge": issue.forge,
        "executionOverride": issue.execution_override,
        "lawbookVersion": issue.lawbook_version,
        "createdAt": issue.created_at,
        "updatedAt": issue.updated_at,
        "specReadyAt": issue.spec_ready_at,
    })
}

// ============================================================================
// SECTION: Issue Routes
// ============================================================================

/// Query parameters for Issue listings.
#[derive(Debug, Deserialize)]
struct ListQuery {
    /// Status filter in SCREAMING_SNAKE_CASE.
    status: Option<String>,
    /// Canonical id filter.
    #[serde(rename = "canonicalId")]
    canonical_id: Option<String>,
    /// Page size.
    limit: Option<u32>,
    /// Page offset.
    offset: Option<u32>,
}

/// GET `/api/afu9/issues`.
async fn list_issues(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| list_issues_inner(&state, &query, &request_id));
    match result {
        Ok(body) => {
            audit(&state, &request_id, "GET", "/api/afu9/issues", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &body)
        }
        Err(err) => {
            audit(&state, &request_id, "GET", "/api/afu9/issues", err.status(), Some(err.code));
            err.into_response()
        }
    }
}

/// Synchronous body of the Issue listing.
fn list_issues_inner(
    state: &AppState,
    query: &ListQuery,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            serde_json::from_value::<LocalStatus>(Value::String(raw.to_string())).map_err(|_| {
                ApiError::new(ErrorCode::InvalidInput, request_id, format!("unknown status {raw}"))
            })
        })
        .transpose()?;
    let canonical_id = query
        .canonical_id
        .as_deref()
        .map(|raw| {
            CanonicalId::parse(raw).map_err(|err| {
                ApiError::new(ErrorCode::InvalidInput, request_id, err.to_string())
            })
        })
        .transpose()?;
    let page = state
        .issues
        .list_issues(&IssueFilter {
            status,
            canonical_id,
            limit: query.limit,
            offset: query.offset,
        })
        .map_err(|err| ApiError::from_store(&err, request_id))?;
    Ok(json!({
        "issues": page.issues.iter().map(issue_view).collect::<Vec<_>>(),
        "total": page.total,
    }))
}

/// GET `/api/afu9/issues/{id}`.
async fn issue_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| issue_detail_inner(&state, &id, &request_id));
    match result {
        Ok(body) => {
            audit(&state, &request_id, "GET", "/api/afu9/issues/{id}", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &body)
        }
        Err(err) => {
            audit(&state, &request_id, "GET", "/api/afu9/issues/{id}", err.status(), Some(err.code));
            err.into_response()
        }
    }
}

/// Synchronous body of the Issue detail route.
fn issue_detail_inner(
    state: &AppState,
    id: &str,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    let issue_id = IssueId::new(id);
    let issue = state
        .issues
        .get_issue(&issue_id)
        .map_err(|err| ApiError::from_store(&err, request_id))?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, request_id, format!("issue {id}")))?;
    let events = state
        .issues
        .issue_events(&issue_id, 50)
        .map_err(|err| ApiError::from_store(&err, request_id))?;
    Ok(json!({
        "issue": issue_view(&issue),
        "events": events,
    }))
}

/// Body of the S1 pick request.
#[derive(Debug, Deserialize)]
struct PickRequest {
    /// Existing Issue identifier.
    #[serde(rename = "issueId")]
    issue_id: Option<String>,
    /// Existing canonical identifier.
    #[serde(rename = "canonicalId")]
    canonical_id: Option<String>,
    /// Title for a fresh Issue when none exists yet.
    title: Option<String>,
}

/// POST `/api/afu9/s1s3/issues/pick`.
async fn pick_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PickRequest>,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| pick_issue_inner(&state, &headers, &body, &request_id));
    match result {
        Ok(response_body) => {
            audit(
                &state,
                &request_id,
                "POST",
                "/api/afu9/s1s3/issues/pick",
                StatusCode::CREATED,
                None,
            );
            ok_response(StatusCode::CREATED, &request_id, &response_body)
        }
        Err(err) => {
            audit(
                &state,
                &request_id,
                "POST",
                "/api/afu9/s1s3/issues/pick",
                err.status(),
                Some(err.code),
            );
            err.into_response()
        }
    }
}

/// Synchronous body of the S1 pick route.
fn pick_issue_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &PickRequest,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    require_service_token(headers, &state.config, request_id)?;
    let actor = Actor::system();
    let at = now();

    let issue = resolve_pick_target(state, body, &actor, at, request_id)?;
    let activated = state
        .issues
        .activate_issue(&issue.id, ActivationMode::Exclusive, &actor, at)
        .map_err(|err| ApiError::from_store(&err, request_id))?;

    // One pick run with its single step, recorded as operational evidence.
    let run_id = RunId::new(format!("run-{}-pick", activated.public_id));
    let bundle = RunBundle {
        run: Run {
            id: run_id.clone(),
            issue_id: Some(activated.id.clone()),
            kind: "s1-pick".to_string(),
            status: RunStatus::Succeeded,
            started_at: at,
            finished_at: Some(at),
        },
        steps: vec![RunStep {
            run_id: run_id.clone(),
            idx: 0,
            name: "pick".to_string(),
            status: StepStatus::Succeeded,
            exit_code: Some(0),
            duration_ms: Some(0),
            stdout_tail: String::new(),
            stderr_tail: String::new(),
        }],
        artifacts: Vec::new(),
    };
    state
        .operational_writer
        .put_run(&bundle)
        .map_err(|err| ApiError::from_store(&err, request_id))?;

    let lawbook_version = state
        .resolver
        .get_active_version(&state.lawbook_id, at)
        .ok()
        .flatten();
    let _ = state.timeline.upsert_node(
        &NodeInput {
            key: NaturalKey::new(SourceSystem::Afu9, "issue", activated.id.as_str()),
            node_type: NodeType::Issue,
            title: Some(activated.title.clone()),
            url: activated.forge.url.clone(),
            payload: json!({ "canonicalId": activated.canonical_id, "status": activated.local_status }),
            lawbook_version,
        },
        at,
    );

    Ok(json!({
        "issue": issue_view(&activated),
        "run": { "id": bundle.run.id, "kind": bundle.run.kind, "status": bundle.run.status },
        "step": { "idx": 0, "name": "pick", "status": StepStatus::Succeeded },
    }))
}

/// Finds or creates the Issue named by a pick request.
fn resolve_pick_target(
    state: &AppState,
    body: &PickRequest,
    actor: &Actor,
    at: Timestamp,
    request_id: &RequestId,
) -> Result<Issue, ApiError> {
    if let Some(id) = &body.issue_id {
        return state
            .issues
            .get_issue(&IssueId::new(id.as_str()))
            .map_err(|err| ApiError::from_store(&err, request_id))?
            .ok_or_else(|| {
                ApiError::new(ErrorCode::NotFound, request_id, format!("issue {id}"))
            });
    }
    if let Some(canonical) = &body.canonical_id {
        let canonical = CanonicalId::parse(canonical.as_str())
            .map_err(|err| ApiError::new(ErrorCode::InvalidInput, request_id, err.to_string()))?;
        if let Some(existing) = state
            .issues
            .get_issue_by_canonical(&canonical)
            .map_err(|err| ApiError::from_store(&err, request_id))?
        {
            return Ok(existing);
        }
        let title = body
            .title
            .clone()
            .unwrap_or_else(|| format!("Issue {canonical}"));
        return state
            .issues
            .create_issue(
                &IssueDraft {
                    title,
                    canonical_id: Some(canonical),
                    ..IssueDraft::default()
                },
                actor,
                at,
            )
            .map_err(|err| ApiError::from_store(&err, request_id));
    }
    let Some(title) = &body.title else {
        return Err(ApiError::new(
            ErrorCode::InvalidInput,
            request_id,
            "pick requires issueId, canonicalId, or title",
        ));
    };
    state
        .issues
        .create_issue(
            &IssueDraft {
                title: title.clone(),
                ..IssueDraft::default()
            },
            actor,
            at,
        )
        .map_err(|err| ApiError::from_store(&err, request_id))
}

/// Body of the S2 spec save request.
#[derive(Debug, Deserialize)]
struct SpecRequest {
    /// Scope statement.
    scope: Option<String>,
    /// Acceptance criteria; must be non-empty.
    #[serde(rename = "acceptanceCriteria", default)]
    acceptance_criteria: Vec<String>,
    /// Free-form notes.
    notes: Option<String>,
}

/// POST `/api/afu9/s1s3/issues/{id}/spec`.
async fn save_spec(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SpecRequest>,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| save_spec_inner(&state, &headers, &id, &body, &request_id));
    match result {
        Ok(response_body) => {
            audit(
                &state,
                &request_id,
                "POST",
                "/api/afu9/s1s3/issues/{id}/spec",
                StatusCode::OK,
                None,
            );
            ok_response(StatusCode::OK, &request_id, &response_body)
        }
        Err(err) => {
            audit(
                &state,
                &request_id,
                "POST",
                "/api/afu9/s1s3/issues/{id}/spec",
                err.status(),
                Some(err.code),
            );
            err.into_response()
        }
    }
}

/// Synchronous body of the S2 spec save route.
fn save_spec_inner(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
    body: &SpecRequest,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    require_service_token(headers, &state.config, request_id)?;
    if body.acceptance_criteria.is_empty() {
        return Err(ApiError::new(
            ErrorCode::AcceptanceCriteriaRequired,
            request_id,
            "spec save requires at least one acceptance criterion",
        ));
    }
    let actor = Actor::system();
    let at = now();
    let issue_id = IssueId::new(id);
    state
        .issues
        .get_issue(&issue_id)
        .map_err(|err| ApiError::from_store(&err, request_id))?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, request_id, format!("issue {id}")))?;

    state
        .issues
        .patch_issue(
            &issue_id,
            &IssuePatch {
                spec: Some(SpecFields {
                    scope: body.scope.clone(),
                    acceptance_criteria: body.acceptance_criteria.clone(),
                    notes: body.notes.clone(),
                }),
                spec_ready_at: Some(at),
                ..IssuePatch::default()
            },
            &actor,
            at,
        )
        .map_err(|err| ApiError::from_store(&err, request_id))?;
    let updated = state
        .issues
        .transition_issue(&issue_id, LocalStatus::SpecReady, &actor, json!({ "cause": "spec_save" }), at)
        .map_err(|err| ApiError::from_store(&err, request_id))?;
    Ok(json!({ "issue": issue_view(&updated) }))
}

/// POST `/api/afu9/s1s3/issues/{id}/implement`.
async fn implement_issue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| implement_issue_inner(&state, &headers, &id, &request_id));
    match result {
        Ok(response_body) => {
            audit(
                &state,
                &request_id,
                "POST",
                "/api/afu9/s1s3/issues/{id}/implement",
                StatusCode::ACCEPTED,
                None,
            );
            ok_response(StatusCode::ACCEPTED, &request_id, &response_body)
        }
        Err(err) => {
            audit(
                &state,
                &request_id,
                "POST",
                "/api/afu9/s1s3/issues/{id}/implement",
                err.status(),
                Some(err.code),
            );
            err.into_response()
        }
    }
}

/// Synchronous body of the S3 implement route.
fn implement_issue_inner(
    state: &AppState,
    headers: &HeaderMap,
    id: &str,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    require_service_token(headers, &state.config, request_id)?;
    if !state.config.dispatch_enabled {
        return Err(ApiError::new(
            ErrorCode::Unavailable,
            request_id,
            "implement dispatch is disabled",
        ));
    }
    let actor = Actor::system();
    let at = now();
    let issue_id = IssueId::new(id);
    let issue = state
        .issues
        .get_issue(&issue_id)
        .map_err(|err| ApiError::from_store(&err, request_id))?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, request_id, format!("issue {id}")))?;
    if issue.execution_state == afu9_core::ExecutionState::Running {
        return Err(ApiError::new(
            ErrorCode::Conflict,
            request_id,
            "an implementation run is already in flight",
        ));
    }

    let branch = issue.canonical_id.as_ref().map_or_else(
        || format!("afu9/issue-{}", issue.public_id),
        |canonical| format!("afu9/{}", canonical.as_str().to_lowercase()),
    );
    let updated = state
        .issues
        .transition_issue(
            &issue_id,
            LocalStatus::ImplementingPrep,
            &actor,
            json!({ "cause": "implement", "branch": branch }),
            at,
        )
        .map_err(|err| ApiError::from_store(&err, request_id))?;

    let run_id = RunId::new(format!("run-{}-implement", updated.public_id));
    let bundle = RunBundle {
        run: Run {
            id: run_id.clone(),
            issue_id: Some(updated.id.clone()),
            kind: "s3-implement".to_string(),
            status: RunStatus::Queued,
            started_at: at,
            finished_at: None,
        },
        steps: vec![RunStep {
            run_id: run_id.clone(),
            idx: 0,
            name: "prepare-branch".to_string(),
            status: StepStatus::Pending,
            exit_code: None,
            duration_ms: None,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
        }],
        artifacts: Vec::new(),
    };
    state
        .operational_writer
        .put_run(&bundle)
        .map_err(|err| ApiError::from_store(&err, request_id))?;
    state
        .issues
        .patch_issue(
            &issue_id,
            &IssuePatch {
                execution_state: Some(afu9_core::ExecutionState::Ready),
                ..IssuePatch::default()
            },
            &actor,
            at,
        )
        .map_err(|err| ApiError::from_store(&err, request_id))?;

    Ok(json!({
        "issueId": updated.id,
        "runId": run_id,
        "pr": { "branch": branch },
    }))
}

// ============================================================================
// SECTION: Timeline Route
// ============================================================================

/// Query parameters for the chain route.
#[derive(Debug, Deserialize)]
struct ChainQuery {
    /// Issue identifier.
    #[serde(rename = "issueId")]
    issue_id: String,
    /// Source system (`afu9` or `forge`), default `afu9`.
    #[serde(rename = "sourceSystem")]
    source_system: Option<String>,
}

/// GET `/api/timeline/chain`.
async fn timeline_chain(
    State(state): State<AppState>,
    Query(query): Query<ChainQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| timeline_chain_inner(&state, &query, &request_id));
    match result {
        Ok(body) => {
            audit(&state, &request_id, "GET", "/api/timeline/chain", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &body)
        }
        Err(err) => {
            audit(&state, &request_id, "GET", "/api/timeline/chain", err.status(), Some(err.code));
            err.into_response()
        }
    }
}

/// Synchronous body of the chain route.
fn timeline_chain_inner(
    state: &AppState,
    query: &ChainQuery,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    let source_system = match query.source_system.as_deref() {
        None | Some("afu9") => SourceSystem::Afu9,
        Some("forge") => SourceSystem::Forge,
        Some(other) => {
            return Err(ApiError::new(
                ErrorCode::InvalidInput,
                request_id,
                format!("unknown source system {other}"),
            ));
        }
    };
    let chain = chain_for_issue(state.timeline.as_ref(), &query.issue_id, source_system)
        .map_err(|err| ApiError::new(ErrorCode::Internal, request_id, err.to_string()))?;
    serde_json::to_value(&chain)
        .map_err(|err| ApiError::new(ErrorCode::Internal, request_id, err.to_string()))
}

// ============================================================================
// SECTION: Deploy Routes
// ============================================================================

/// Query parameters for the deploy status route.
#[derive(Debug, Deserialize)]
struct DeployStatusQuery {
    /// Target environment.
    env: String,
}

/// GET `/api/deploy/status`.
async fn deploy_status(
    State(state): State<AppState>,
    Query(query): Query<DeployStatusQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| deploy_status_inner(&state, &query, &request_id));
    match result {
        Ok(body) => {
            audit(&state, &request_id, "GET", "/api/deploy/status", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &body)
        }
        Err(err) => {
            audit(&state, &request_id, "GET", "/api/deploy/status", err.status(), Some(err.code));
            err.into_response()
        }
    }
}

/// Synchronous body of the deploy status route.
fn deploy_status_inner(
    state: &AppState,
    query: &DeployStatusQuery,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    if !ServerConfig::is_known_env(&query.env) {
        return Err(ApiError::new(
            ErrorCode::InvalidEnv,
            request_id,
            format!("unknown environment {}", query.env),
        ));
    }
    if !state.config.database_enabled {
        return Err(ApiError::new(
            ErrorCode::Unavailable,
            request_id,
            "deploy status store is disabled",
        ));
    }
    let with_age = state
        .snapshots
        .snapshot_for(&query.env, now())
        .map_err(|err| ApiError::from_store(&err, request_id))?;
    Ok(json!({
        "env": with_age.snapshot.env,
        "status": with_age.snapshot.status,
        "observedAt": with_age.snapshot.observed_at,
        "reasons": with_age.snapshot.reasons,
        "signals": with_age.snapshot.signals,
        "stalenessSeconds": with_age.staleness_seconds,
        "correlationId": with_age.snapshot.correlation_id,
    }))
}

/// Body of the force-deploy request.
#[derive(Debug, Deserialize)]
struct ForceDeployRequest {
    /// Target environment.
    env: String,
    /// Target service.
    service: String,
}

/// POST `/api/deploy/force`.
async fn force_deploy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ForceDeployRequest>,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| force_deploy_inner(&state, &headers, &body, &request_id));
    match result {
        Ok(response_body) => {
            audit(&state, &request_id, "POST", "/api/deploy/force", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &response_body)
        }
        Err(err) => {
            audit(&state, &request_id, "POST", "/api/deploy/force", err.status(), Some(err.code));
            err.into_response()
        }
    }
}

/// Synchronous body of the force-deploy route.
fn force_deploy_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &ForceDeployRequest,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    require_service_token(headers, &state.config, request_id)?;
    if !ServerConfig::is_known_env(&body.env) {
        return Err(ApiError::new(
            ErrorCode::InvalidEnv,
            request_id,
            format!("unknown environment {}", body.env),
        ));
    }
    let outcome = state
        .force_deploy
        .execute(request_id, &body.env, &body.service, &Actor::system(), now())
        .map_err(|err| match err {
            ForceDeployError::Disabled => ApiError::new(
                ErrorCode::TargetNotAllowed,
                request_id,
                "force-new-deployment adapter is disabled",
            ),
            other => ApiError::new(ErrorCode::Internal, request_id, other.to_string()),
        })?;
    if !outcome.executed {
        let code = outcome.evaluation.denial_code.unwrap_or(ErrorCode::LawbookDenied);
        return Err(ApiError::new(code, request_id, outcome.evaluation.reason.clone())
            .with_details(json!({
                "nextAllowedAt": outcome.evaluation.next_allowed_at,
                "requiresApproval": outcome.evaluation.requires_approval,
                "policyName": outcome.evaluation.policy_name,
            })));
    }
    serde_json::to_value(&outcome)
        .map_err(|err| ApiError::new(ErrorCode::Internal, request_id, err.to_string()))
}

// ============================================================================
// SECTION: Webhook Route
// ============================================================================

/// POST `/api/webhooks/forge`.
async fn inbound_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| inbound_webhook_inner(&state, &headers, &body, &request_id));
    match result {
        Ok(response_body) => {
            audit(&state, &request_id, "POST", "/api/webhooks/forge", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &response_body)
        }
        Err(err) => {
            audit(&state, &request_id, "POST", "/api/webhooks/forge", err.status(), Some(err.code));
            err.into_response()
        }
    }
}

/// Synchronous body of the webhook route.
fn inbound_webhook_inner(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    let header = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).map(ToString::to_string)
    };
    let signature = header("X-Signature-256").ok_or_else(|| {
        ApiError::new(ErrorCode::SignatureInvalid, request_id, "missing signature header")
    })?;
    let delivery_id = header("X-Forge-Delivery").ok_or_else(|| {
        ApiError::new(ErrorCode::InvalidInput, request_id, "missing delivery header")
    })?;
    let event_type = header("X-Forge-Event").ok_or_else(|| {
        ApiError::new(ErrorCode::InvalidInput, request_id, "missing event header")
    })?;

    let result = handle_inbound_webhook(
        state.webhooks.as_ref(),
        state.config.webhook_secret.as_deref(),
        &WebhookHeaders {
            delivery_id,
            event_type,
            signature,
        },
        body,
        now(),
    )
    .map_err(|err| match &err {
        IntakeError::SignatureInvalid => {
            ApiError::new(err.error_code(), request_id, "signature verification failed")
        }
        other => ApiError::new(err.error_code(), request_id, other.to_string()),
    })?;
    serde_json::to_value(&result)
        .map_err(|err| ApiError::new(ErrorCode::Internal, request_id, err.to_string()))
}

// ============================================================================
// SECTION: Navigation Routes
// ============================================================================

/// Roles the navigation surface accepts.
const KNOWN_ROLES: [&str; 4] = ["admin", "user", "guest", "*"];

/// Navigation item wire shape.
#[derive(Debug, Serialize, Deserialize)]
struct NavigationItemBody {
    /// Link target.
    href: String,
    /// Display label.
    label: String,
    /// Sort position.
    position: i64,
    /// Visibility flag.
    #[serde(default = "default_enabled")]
    enabled: bool,
}

/// Default for the enabled flag.
const fn default_enabled() -> bool {
    true
}

/// Body of the navigation replace request.
#[derive(Debug, Deserialize)]
struct NavigationPut {
    /// Replacement items.
    items: Vec<NavigationItemBody>,
}

/// GET `/api/admin/navigation/{role}`.
async fn get_navigation(
    State(state): State<AppState>,
    Path(role): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| get_navigation_inner(&state, &headers, &role, &request_id));
    match result {
        Ok(body) => {
            audit(&state, &request_id, "GET", "/api/admin/navigation/{role}", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &body)
        }
        Err(err) => {
            audit(
                &state,
                &request_id,
                "GET",
                "/api/admin/navigation/{role}",
                err.status(),
                Some(err.code),
            );
            err.into_response()
        }
    }
}

/// Synchronous body of the navigation read route.
fn get_navigation_inner(
    state: &AppState,
    headers: &HeaderMap,
    role: &str,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    require_admin(headers, &state.config, request_id)?;
    validate_role(role, request_id)?;
    let items = state
        .navigation
        .items_for_role(role)
        .map_err(|err| ApiError::new(ErrorCode::Internal, request_id, err.to_string()))?;
    Ok(json!({
        "role": role,
        "items": items
            .iter()
            .map(|item| json!({
                "href": item.href,
                "label": item.label,
                "position": item.position,
                "enabled": item.enabled,
            }))
            .collect::<Vec<_>>(),
    }))
}

/// PUT `/api/admin/navigation/{role}`.
async fn put_navigation(
    State(state): State<AppState>,
    Path(role): Path<String>,
    headers: HeaderMap,
    Json(body): Json<NavigationPut>,
) -> Response {
    let request_id = request_id(&headers);
    let result = run_blocking(|| put_navigation_inner(&state, &headers, &role, &body, &request_id));
    match result {
        Ok(response_body) => {
            audit(&state, &request_id, "PUT", "/api/admin/navigation/{role}", StatusCode::OK, None);
            ok_response(StatusCode::OK, &request_id, &response_body)
        }
        Err(err) => {
            audit(
                &state,
                &request_id,
                "PUT",
                "/api/admin/navigation/{role}",
                err.status(),
                Some(err.code),
            );
            err.into_response()
        }
    }
}

/// Synchronous body of the navigation replace route.
fn put_navigation_inner(
    state: &AppState,
    headers: &HeaderMap,
    role: &str,
    body: &NavigationPut,
    request_id: &RequestId,
) -> Result<Value, ApiError> {
    require_admin(headers, &state.config, request_id)?;
    validate_role(role, request_id)?;
    let items: Vec<afu9_store_sqlite::NavigationItem> = body
        .items
        .iter()
        .map(|item| afu9_store_sqlite::NavigationItem {
            role: role.to_string(),
            href: item.href.clone(),
            label: item.label.clone(),
            position: item.position,
            enabled: item.enabled,
        })
        .collect();
    state.navigation.replace_role(role, &items).map_err(|err| match err {
        crate::state::NavigationError::Constraint(message) => {
            ApiError::new(ErrorCode::Conflict, request_id, message)
        }
        other => ApiError::new(ErrorCode::Internal, request_id, other.to_string()),
    })?;
    Ok(json!({ "role": role, "count": items.len() }))
}

/// Validates a navigation role.
fn validate_role(role: &str, request_id: &RequestId) -> Result<(), ApiError> {
    if KNOWN_ROLES.contains(&role) {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::InvalidInput,
            request_id,
            format!("unknown role {role}"),
        ))
    }
}

// ============================================================================
// SECTION: Health Routes
// ============================================================================

/// GET `/api/health`: alive as long as the process serves.
async fn health() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

/// GET `/api/ready`: ready only when the store answers.
async fn ready(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = request_id(&headers);
    let probe = run_blocking(|| {
        state.issues.list_issues(&IssueFilter {
            limit: Some(1),
            ..IssueFilter::default()
        })
    });
    match probe {
        Ok(_) => ok_response(StatusCode::OK, &request_id, &json!({ "status": "ready" })),
        Err(err) => ApiError::new(ErrorCode::Unavailable, &request_id, err.to_string())
            .into_response(),
    }
}
