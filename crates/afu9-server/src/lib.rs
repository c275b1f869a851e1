// crates/afu9-server/src/lib.rs
// ============================================================================
// Module: AFU-9 Server Library
// Description: HTTP surface, webhook intake, and side-effect adapters.
// Purpose: Host the control-plane domain behind the version-stable API.
// Dependencies: crate::{audit, auth, config, error, orchestrator, routes, snapshot, state, webhook}
// ============================================================================

//! ## Overview
//! The server crate is the host layer: it reads the wall clock, terminates
//! HTTP, verifies webhook signatures, and bridges async requests onto the
//! synchronous domain. All policy and state-machine semantics live below it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod snapshot;
pub mod state;
pub mod webhook;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::sync::Arc;

use afu9_policy::AutomationPolicyEvaluator;
use afu9_policy::LawbookResolver;
use afu9_store_sqlite::SqliteControlStore;

use crate::audit::RequestAuditSink;
use crate::config::ServerConfig;
use crate::orchestrator::ForceNewDeploymentAdapter;
use crate::orchestrator::Orchestrator;
use crate::snapshot::SnapshotCache;
use crate::state::AppState;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::StderrAuditSink;
pub use auth::admin_token_ok;
pub use auth::constant_time_eq;
pub use auth::service_token_ok;
pub use config::ConfigError;
pub use config::KNOWN_ENVS;
pub use error::ApiError;
pub use error::ErrorBody;
pub use orchestrator::DeploymentInfo;
pub use orchestrator::ForceDeployError;
pub use orchestrator::ForceDeployOutcome;
pub use orchestrator::OrchestratorError;
pub use orchestrator::ServiceDescription;
pub use orchestrator::StabilityResult;
pub use orchestrator::UnconfiguredOrchestrator;
pub use orchestrator::poll_service_stability;
pub use routes::build_router;
pub use snapshot::SnapshotWithAge;
pub use snapshot::compute_snapshot;
pub use state::InMemoryNavigationStore;
pub use state::InMemoryWebhookStore;
pub use state::NavigationError;
pub use state::NavigationStore;
pub use state::OperationalWriter;
pub use state::now;
pub use webhook::IntakeError;
pub use webhook::IntakeResult;
pub use webhook::IntakeStatus;
pub use webhook::WebhookHeaders;
pub use webhook::WebhookStore;
pub use webhook::WebhookStoreError;
pub use webhook::handle_inbound_webhook;
pub use webhook::verify_signature;

// ============================================================================
// SECTION: Assembly
// ============================================================================

/// Builds application state around the durable SQLite store.
#[must_use]
pub fn build_state(
    config: ServerConfig,
    store: SqliteControlStore,
    orchestrator: Arc<dyn Orchestrator>,
    audit: Arc<dyn RequestAuditSink>,
) -> AppState {
    let store = Arc::new(store);
    let lawbook_id = config.lawbook_id.clone();
    let resolver = Arc::new(LawbookResolver::new(
        Arc::clone(&store) as Arc<dyn afu9_policy::LawbookStore>
    ));
    let evaluator = Arc::new(AutomationPolicyEvaluator::new(
        Arc::clone(&resolver),
        Arc::clone(&store) as Arc<dyn afu9_policy::PolicyExecutionStore>,
        lawbook_id.clone(),
    ));
    let approvals = Arc::clone(&store) as Arc<dyn afu9_policy::ApprovalStore>;
    let force_deploy = Arc::new(ForceNewDeploymentAdapter::new(
        config.force_new_deploy_enabled,
        Arc::clone(&evaluator),
        Arc::clone(&approvals),
        orchestrator,
    ));
    let operational = Arc::clone(&store) as Arc<dyn afu9_core::OperationalStore>;
    AppState {
        issues: Arc::clone(&store) as Arc<dyn afu9_core::IssueStore>,
        operational: Arc::clone(&operational),
        operational_writer: Arc::clone(&store) as Arc<dyn state::OperationalWriter>,
        timeline: Arc::clone(&store) as Arc<dyn afu9_evidence::TimelineStore>,
        webhooks: Arc::clone(&store) as Arc<dyn webhook::WebhookStore>,
        navigation: Arc::clone(&store) as Arc<dyn state::NavigationStore>,
        resolver,
        evaluator,
        approvals,
        force_deploy,
        snapshots: Arc::new(SnapshotCache::new(operational)),
        audit,
        config: Arc::new(config),
        lawbook_id,
    }
}

/// Serves the API until the process is stopped.
///
/// # Errors
///
/// Returns an I/O error when binding or serving fails.
pub async fn serve(state: AppState) -> io::Result<()> {
    let addr = state.config.bind_addr;
    let router = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}
