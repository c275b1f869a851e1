// crates/afu9-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Shared application state and store adapters for the API.
// Purpose: Wire the domain stores, policy layers, and adapters into axum state.
// Dependencies: afu9-core, afu9-evidence, afu9-policy, afu9-store-sqlite, serde_json
// ============================================================================

//! ## Overview
//! The application state is a bundle of trait objects so routes never depend
//! on a concrete backend. The durable SQLite store satisfies every contract;
//! tests swap in the in-memory implementations. The server is the host layer
//! and therefore the only place that reads the wall clock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde_json::Value;

use afu9_core::DeployEvent;
use afu9_core::IssueStore;
use afu9_core::LawbookId;
use afu9_core::OperationalStore;
use afu9_core::RunBundle;
use afu9_core::StoreError;
use afu9_core::Timestamp;
use afu9_evidence::TimelineStore;
use afu9_policy::ApprovalStore;
use afu9_policy::AutomationPolicyEvaluator;
use afu9_policy::LawbookResolver;
use afu9_store_sqlite::NavigationItem;
use afu9_store_sqlite::SqliteControlStore;

use crate::audit::RequestAuditSink;
use crate::config::ServerConfig;
use crate::orchestrator::ForceNewDeploymentAdapter;
use crate::snapshot::SnapshotCache;
use crate::webhook::WebhookStore;
use crate::webhook::WebhookStoreError;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Reads the wall clock as a domain timestamp.
#[must_use]
pub fn now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0);
    Timestamp::from_unix_millis(millis)
}

// ============================================================================
// SECTION: Operational Writer
// ============================================================================

/// Write access to operational rows the API creates (runs, deploy events).
pub trait OperationalWriter: Send + Sync {
    /// Inserts a run bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    fn put_run(&self, bundle: &RunBundle) -> Result<(), StoreError>;

    /// Appends a deploy event and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when persistence fails.
    fn put_deploy_event(&self, event: &DeployEvent) -> Result<i64, StoreError>;
}

impl OperationalWriter for SqliteControlStore {
    fn put_run(&self, bundle: &RunBundle) -> Result<(), StoreError> {
        Self::put_run(self, bundle)
    }

    fn put_deploy_event(&self, event: &DeployEvent) -> Result<i64, StoreError> {
        Self::put_deploy_event(self, event)
    }
}

impl OperationalWriter for afu9_core::InMemoryOperationalStore {
    fn put_run(&self, bundle: &RunBundle) -> Result<(), StoreError> {
        Self::put_run(self, bundle.clone())
    }

    fn put_deploy_event(&self, event: &DeployEvent) -> Result<i64, StoreError> {
        let id = event.id;
        Self::put_deploy(self, event.clone())?;
        Ok(id)
    }
}

// ============================================================================
// SECTION: Navigation Store
// ============================================================================

/// Errors raised by navigation stores.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// Duplicate position or href inside a role.
    #[error("navigation constraint violated: {0}")]
    Constraint(String),
    /// Underlying store failure.
    #[error("navigation store error: {0}")]
    Store(String),
}

/// Store contract for role-scoped navigation items.
pub trait NavigationStore: Send + Sync {
    /// Returns items visible to a role ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError`] when the query fails.
    fn items_for_role(&self, role: &str) -> Result<Vec<NavigationItem>, NavigationError>;

    /// Replaces the items for a role atomically.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::Constraint`] on duplicate positions or hrefs.
    fn replace_role(&self, role: &str, items: &[NavigationItem]) -> Result<(), NavigationError>;
}

impl NavigationStore for SqliteControlStore {
    fn items_for_role(&self, role: &str) -> Result<Vec<NavigationItem>, NavigationError> {
        self.navigation_for_role(role).map_err(|err| NavigationError::Store(err.to_string()))
    }

    fn replace_role(&self, role: &str, items: &[NavigationItem]) -> Result<(), NavigationError> {
        self.replace_navigation(role, items).map_err(|err| match err {
            afu9_store_sqlite::SqliteStoreError::Invalid(message) => {
                NavigationError::Constraint(message)
            }
            other => NavigationError::Store(other.to_string()),
        })
    }
}

/// Mutex-guarded in-memory navigation store for tests.
#[derive(Debug, Default)]
pub struct InMemoryNavigationStore {
    /// Items keyed by role.
    items: Mutex<BTreeMap<String, Vec<NavigationItem>>>,
}

impl InMemoryNavigationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl NavigationStore for InMemoryNavigationStore {
    fn items_for_role(&self, role: &str) -> Result<Vec<NavigationItem>, NavigationError> {
        let items = self
            .items
            .lock()
            .map_err(|_| NavigationError::Store("navigation store poisoned".to_string()))?;
        let mut merged: Vec<NavigationItem> = items
            .get(role)
            .into_iter()
            .chain(items.get("*"))
            .flatten()
            .cloned()
            .collect();
        merged.sort_by_key(|item| item.position);
        Ok(merged)
    }

    fn replace_role(&self, role: &str, entries: &[NavigationItem]) -> Result<(), NavigationError> {
        let mut positions = std::collections::BTreeSet::new();
        let mut hrefs = std::collections::BTreeSet::new();
        for item in entries {
            if !positions.insert(item.position) || !hrefs.insert(item.href.clone()) {
                return Err(NavigationError::Constraint(format!(
                    "duplicate navigation position or href for role {role}"
                )));
            }
        }
        let mut items = self
            .items
            .lock()
            .map_err(|_| NavigationError::Store("navigation store poisoned".to_string()))?;
        items.insert(role.to_string(), entries.to_vec());
        Ok(())
    }
}

// ============================================================================
// SECTION: Webhook Store Adapters
// ============================================================================

impl WebhookStore for SqliteControlStore {
    fn record_delivery(
        &self,
        delivery_id: &str,
        event_type: &str,
        repo: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, WebhookStoreError> {
        Self::record_delivery(self, delivery_id, event_type, repo, now)
            .map_err(|err| WebhookStoreError::Store(err.to_string()))
    }

    fn persist_event(
        &self,
        delivery_id: &str,
        event_type: &str,
        event_action: Option<&str>,
        payload: &Value,
        signature: &str,
        now: Timestamp,
    ) -> Result<i64, WebhookStoreError> {
        self.insert_webhook_event(delivery_id, event_type, event_action, payload, signature, now)
            .map_err(|err| WebhookStoreError::Store(err.to_string()))
    }

    fn mark_processed(&self, event_id: i64) -> Result<(), WebhookStoreError> {
        self.mark_webhook_processed(event_id)
            .map_err(|err| WebhookStoreError::Store(err.to_string()))
    }

    fn workflow_for(
        &self,
        event_key: &str,
    ) -> Result<Option<(String, bool)>, WebhookStoreError> {
        Ok(self
            .workflow_mapping(event_key)
            .map_err(|err| WebhookStoreError::Store(err.to_string()))?
            .map(|mapping| (mapping.workflow, mapping.auto_trigger)))
    }
}

/// In-memory webhook store for tests.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    /// Seen delivery ids.
    deliveries: Mutex<std::collections::BTreeSet<String>>,
    /// Persisted event payloads by id.
    events: Mutex<Vec<Value>>,
    /// Workflow mappings keyed by event key.
    mappings: Mutex<BTreeMap<String, (String, bool)>>,
}

impl InMemoryWebhookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a workflow mapping.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookStoreError`] when the store mutex is poisoned.
    pub fn map_workflow(
        &self,
        event_key: &str,
        workflow: &str,
        auto_trigger: bool,
    ) -> Result<(), WebhookStoreError> {
        let mut mappings = self
            .mappings
            .lock()
            .map_err(|_| WebhookStoreError::Store("webhook store poisoned".to_string()))?;
        mappings.insert(event_key.to_string(), (workflow.to_string(), auto_trigger));
        Ok(())
    }

    /// Returns the number of persisted events.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookStoreError`] when the store mutex is poisoned.
    pub fn event_count(&self) -> Result<usize, WebhookStoreError> {
        let events = self
            .events
            .lock()
            .map_err(|_| WebhookStoreError::Store("webhook store poisoned".to_string()))?;
        Ok(events.len())
    }
}

impl WebhookStore for InMemoryWebhookStore {
    fn record_delivery(
        &self,
        delivery_id: &str,
        _event_type: &str,
        _repo: Option<&str>,
        _now: Timestamp,
    ) -> Result<bool, WebhookStoreError> {
        let mut deliveries = self
            .deliveries
            .lock()
            .map_err(|_| WebhookStoreError::Store("webhook store poisoned".to_string()))?;
        Ok(deliveries.insert(delivery_id.to_string()))
    }

    fn persist_event(
        &self,
        _delivery_id: &str,
        _event_type: &str,
        _event_action: Option<&str>,
        payload: &Value,
        _signature: &str,
        _now: Timestamp,
    ) -> Result<i64, WebhookStoreError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| WebhookStoreError::Store("webhook store poisoned".to_string()))?;
        events.push(payload.clone());
        Ok(i64::try_from(events.len()).unwrap_or(i64::MAX))
    }

    fn mark_processed(&self, _event_id: i64) -> Result<(), WebhookStoreError> {
        Ok(())
    }

    fn workflow_for(
        &self,
        event_key: &str,
    ) -> Result<Option<(String, bool)>, WebhookStoreError> {
        let mappings = self
            .mappings
            .lock()
            .map_err(|_| WebhookStoreError::Store("webhook store poisoned".to_string()))?;
        Ok(mappings.get(event_key).cloned())
    }
}

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared application state injected into every route.
#[derive(Clone)]
pub struct AppState {
    /// Issue store.
    pub issues: Arc<dyn IssueStore>,
    /// Operational store (reads).
    pub operational: Arc<dyn OperationalStore>,
    /// Operational writer (run and deploy rows created by the API).
    pub operational_writer: Arc<dyn OperationalWriter>,
    /// Timeline store.
    pub timeline: Arc<dyn TimelineStore>,
    /// Webhook store.
    pub webhooks: Arc<dyn WebhookStore>,
    /// Navigation store.
    pub navigation: Arc<dyn NavigationStore>,
    /// Lawbook resolver.
    pub resolver: Arc<LawbookResolver>,
    /// Automation policy evaluator.
    pub evaluator: Arc<AutomationPolicyEvaluator>,
    /// Approval gate store.
    pub approvals: Arc<dyn ApprovalStore>,
    /// Force-new-deployment adapter.
    pub force_deploy: Arc<ForceNewDeploymentAdapter>,
    /// Deploy snapshot cache.
    pub snapshots: Arc<SnapshotCache>,
    /// Request audit sink.
    pub audit: Arc<dyn RequestAuditSink>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Governing rulebook id.
    pub lawbook_id: LawbookId,
}
