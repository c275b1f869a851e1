// crates/afu9-server/tests/api.rs
// ============================================================================
// Module: API End-to-End Tests
// Description: Tests driving the bound HTTP surface through the S1-S3 loop.
// Purpose: Pin the pick/spec/implement flow, single-active 409, and envelopes.
// Dependencies: afu9-core, afu9-evidence, afu9-policy, afu9-server, reqwest, serde_json, tokio
// ============================================================================
//! ## Overview
//! Boots the router on an ephemeral port with in-memory stores and exercises
//! the external contract: status codes, error envelopes with request ids, the
//! single-active conflict, and the S1→S2→S3 progression.

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

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use afu9_core::InMemoryIssueStore;
use afu9_core::InMemoryOperationalStore;
use afu9_core::LawbookId;
use afu9_evidence::InMemoryTimelineStore;
use afu9_policy::AutomationPolicyEvaluator;
use afu9_policy::InMemoryApprovalStore;
use afu9_policy::InMemoryLawbookStore;
use afu9_policy::InMemoryPolicyExecutionStore;
use afu9_policy::LawbookResolver;
use afu9_server::NoopAuditSink;
use afu9_server::build_router;
use afu9_server::config::ServerConfig;
use afu9_server::orchestrator::ForceNewDeploymentAdapter;
use afu9_server::orchestrator::UnconfiguredOrchestrator;
use afu9_server::snapshot::SnapshotCache;
use afu9_server::state::AppState;
use afu9_server::state::InMemoryNavigationStore;
use afu9_server::state::InMemoryWebhookStore;
use serde_json::Value;
use serde_json::json;

/// Builds an in-memory application state from an environment map.
fn test_state(env: &[(&str, &str)]) -> AppState {
    let env: HashMap<String, String> =
        env.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    let config = ServerConfig::from_env_map(&env).unwrap();
    let operational = Arc::new(InMemoryOperationalStore::new());
    let resolver = Arc::new(LawbookResolver::new(
        Arc::new(InMemoryLawbookStore::new()) as Arc<dyn afu9_policy::LawbookStore>
    ));
    let evaluator = Arc::new(AutomationPolicyEvaluator::new(
        Arc::clone(&resolver),
        Arc::new(InMemoryPolicyExecutionStore::new())
            as Arc<dyn afu9_policy::PolicyExecutionStore>,
        LawbookId::default_id(),
    ));
    let approvals =
        Arc::new(InMemoryApprovalStore::new()) as Arc<dyn afu9_policy::ApprovalStore>;
    let force_deploy = Arc::new(ForceNewDeploymentAdapter::new(
        config.force_new_deploy_enabled,
        Arc::clone(&evaluator),
        Arc::clone(&approvals),
        Arc::new(UnconfiguredOrchestrator),
    ));
    AppState {
        issues: Arc::new(InMemoryIssueStore::new()),
        operational: Arc::clone(&operational) as Arc<dyn afu9_core::OperationalStore>,
        operational_writer: Arc::clone(&operational)
            as Arc<dyn afu9_server::state::OperationalWriter>,
        timeline: Arc::new(InMemoryTimelineStore::new()),
        webhooks: Arc::new(InMemoryWebhookStore::new()),
        navigation: Arc::new(InMemoryNavigationStore::new()),
        resolver,
        evaluator,
        approvals,
        force_deploy,
        snapshots: Arc::new(SnapshotCache::new(
            Arc::clone(&operational) as Arc<dyn afu9_core::OperationalStore>
        )),
        audit: Arc::new(NoopAuditSink),
        config: Arc::new(config),
        lawbook_id: LawbookId::default_id(),
    }
}

/// Boots the router on an ephemeral port and returns its address.
async fn boot(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Verifies the S1→S2→S3 progression over HTTP.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pick_spec_implement_flow() {
    let addr = boot(test_state(&[])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let pick = client
        .post(format!("{base}/api/afu9/s1s3/issues/pick"))
        .json(&json!({ "canonicalId": "I1", "title": "wire the gate" }))
        .send()
        .await
        .unwrap();
    assert_eq!(pick.status(), 201);
    assert!(pick.headers().contains_key("X-Request-Id"));
    let picked: Value = pick.json().await.unwrap();
    assert_eq!(picked["issue"]["status"], "ACTIVE");
    assert_eq!(picked["run"]["kind"], "s1-pick");
    let issue_id = picked["issue"]["id"].as_str().unwrap().to_string();

    let spec = client
        .post(format!("{base}/api/afu9/s1s3/issues/{issue_id}/spec"))
        .json(&json!({ "scope": "gate", "acceptanceCriteria": ["A", "B"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(spec.status(), 200);
    let specced: Value = spec.json().await.unwrap();
    assert_eq!(specced["issue"]["status"], "SPEC_READY");
    assert!(specced["issue"]["specReadyAt"].is_i64());

    let implement = client
        .post(format!("{base}/api/afu9/s1s3/issues/{issue_id}/implement"))
        .send()
        .await
        .unwrap();
    assert_eq!(implement.status(), 202);
    let implemented: Value = implement.json().await.unwrap();
    assert_eq!(implemented["issueId"], issue_id.as_str());
    assert!(implemented["runId"].as_str().unwrap().contains("implement"));
    assert_eq!(implemented["pr"]["branch"], "afu9/i1");
}

/// Verifies a second activation returns 409 with the active Issue named.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_activation_conflicts() {
    let addr = boot(test_state(&[])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let first = client
        .post(format!("{base}/api/afu9/s1s3/issues/pick"))
        .json(&json!({ "canonicalId": "I1", "title": "first" }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 201);

    let second = client
        .post(format!("{base}/api/afu9/s1s3/issues/pick"))
        .json(&json!({ "canonicalId": "I2", "title": "second" }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["errorCode"], "SINGLE_ACTIVE_VIOLATION");
    assert_eq!(body["details"]["currentActive"], "I1");
    assert!(body["requestId"].is_string());
}

/// Verifies empty acceptance criteria fail with the dedicated code.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_acceptance_criteria_rejected() {
    let addr = boot(test_state(&[])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let pick = client
        .post(format!("{base}/api/afu9/s1s3/issues/pick"))
        .json(&json!({ "canonicalId": "I1", "title": "first" }))
        .send()
        .await
        .unwrap();
    let picked: Value = pick.json().await.unwrap();
    let issue_id = picked["issue"]["id"].as_str().unwrap().to_string();

    let spec = client
        .post(format!("{base}/api/afu9/s1s3/issues/{issue_id}/spec"))
        .json(&json!({ "acceptanceCriteria": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(spec.status(), 400);
    let body: Value = spec.json().await.unwrap();
    assert_eq!(body["errorCode"], "ACCEPTANCE_CRITERIA_REQUIRED");
}

/// Verifies write endpoints demand the configured service token.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn service_token_gates_writes() {
    let addr = boot(test_state(&[("AFU9_SERVICE_TOKEN", "sekrit")])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let denied = client
        .post(format!("{base}/api/afu9/s1s3/issues/pick"))
        .json(&json!({ "title": "no token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), 401);

    let allowed = client
        .post(format!("{base}/api/afu9/s1s3/issues/pick"))
        .header("X-Service-Token", "sekrit")
        .json(&json!({ "title": "with token" }))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 201);
}

/// Verifies deploy status validates the environment and store availability.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deploy_status_validates_env_and_store() {
    let addr = boot(test_state(&[("DATABASE_ENABLED", "true")])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let bad_env = client
        .get(format!("{base}/api/deploy/status?env=moon"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_env.status(), 400);
    let body: Value = bad_env.json().await.unwrap();
    assert_eq!(body["errorCode"], "INVALID_ENV");

    let empty = client
        .get(format!("{base}/api/deploy/status?env=staging"))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 200);
    let body: Value = empty.json().await.unwrap();
    assert_eq!(body["status"], "YELLOW");
    assert_eq!(body["stalenessSeconds"], 0);

    let disabled_addr = boot(test_state(&[])).await;
    let disabled = client
        .get(format!("http://{disabled_addr}/api/deploy/status?env=staging"))
        .send()
        .await
        .unwrap();
    assert_eq!(disabled.status(), 503);
}

/// Verifies health is unconditional and readiness probes the store.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_and_ready_respond() {
    let addr = boot(test_state(&[])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    assert_eq!(client.get(format!("{base}/api/health")).send().await.unwrap().status(), 200);
    assert_eq!(client.get(format!("{base}/api/ready")).send().await.unwrap().status(), 200);
}

/// Verifies the navigation admin surface round-trips items.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn navigation_round_trips() {
    let addr = boot(test_state(&[])).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let put = client
        .put(format!("{base}/api/admin/navigation/admin"))
        .json(&json!({
            "items": [
                { "href": "/issues", "label": "Issues", "position": 1 },
                { "href": "/timeline", "label": "Timeline", "position": 2 },
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 200);

    let get = client
        .get(format!("{base}/api/admin/navigation/admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(get.status(), 200);
    let body: Value = get.json().await.unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["items"][0]["href"], "/issues");

    let bad_role = client
        .get(format!("{base}/api/admin/navigation/owner"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_role.status(), 400);
}

/// Verifies the admin role is required on top of service authentication.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn navigation_requires_admin_role() {
    let addr = boot(test_state(&[
        ("AFU9_SERVICE_TOKEN", "sekrit"),
        ("AFU9_ADMIN_TOKEN", "root-sekrit"),
    ]))
    .await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    // No credentials at all: unauthenticated.
    let anonymous = client
        .get(format!("{base}/api/admin/navigation/admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    // Service-authenticated but not admin: forbidden.
    let non_admin = client
        .get(format!("{base}/api/admin/navigation/admin"))
        .header("X-Service-Token", "sekrit")
        .send()
        .await
        .unwrap();
    assert_eq!(non_admin.status(), 403);
    let body: Value = non_admin.json().await.unwrap();
    assert_eq!(body["errorCode"], "FORBIDDEN");

    // A wrong admin token is forbidden too.
    let wrong_admin = client
        .get(format!("{base}/api/admin/navigation/admin"))
        .header("X-Service-Token", "sekrit")
        .header("X-Admin-Token", "guess")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_admin.status(), 403);

    // Both secrets: allowed.
    let admin = client
        .get(format!("{base}/api/admin/navigation/admin"))
        .header("X-Service-Token", "sekrit")
        .header("X-Admin-Token", "root-sekrit")
        .send()
        .await
        .unwrap();
    assert_eq!(admin.status(), 200);
}
