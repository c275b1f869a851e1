// crates/afu9-policy/src/lawbook.rs
// ============================================================================
// Module: Lawbook Model
// Description: Versioned governance rulebooks and their automation policies.
// Purpose: Define the declarative policy aggregate the evaluator enforces.
// Dependencies: afu9-core, serde, thiserror
// ============================================================================

//! ## Overview
//! A Lawbook is the active governance bundle for one rulebook id: automation
//! policies with environment allowlists, cooldowns, rate-limit windows,
//! approval requirements, and idempotency key templates. Activation replaces
//! the active version atomically and invalidates resolver caches.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use afu9_core::LawbookId;
use afu9_core::Timestamp;
use afu9_core::hashing::HashError;
use afu9_core::hashing::sha256_hex_canonical;

// ============================================================================
// SECTION: Automation Policies
// ============================================================================

/// Declarative automation policy for one action type.
///
/// # Invariants
/// - `window_seconds` and `max_runs_per_window` must be positive when the
///   policy is enforced; the evaluator validates and fails closed otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationPolicy {
    /// Human-readable policy name.
    pub name: String,
    /// Action type the policy governs (e.g. `force_new_deployment`).
    pub action_type: String,
    /// Environments the action may target; empty means no environment gate.
    #[serde(default)]
    pub allowed_envs: Vec<String>,
    /// Cooldown between allowed executions, in seconds.
    #[serde(default)]
    pub cooldown_seconds: i64,
    /// Trailing rate-limit window width, in seconds.
    pub window_seconds: i64,
    /// Maximum allowed executions inside the window.
    pub max_runs_per_window: i64,
    /// Whether the action requires an explicit approval.
    #[serde(default)]
    pub requires_approval: bool,
    /// Idempotency key template with `{field}` placeholders resolved from the
    /// action context.
    #[serde(default)]
    pub idempotency_key_template: Option<String>,
}

// ============================================================================
// SECTION: Lawbook Aggregate
// ============================================================================

/// Versioned governance rulebook.
///
/// # Invariants
/// - `version` strings are unique per rulebook id.
/// - The aggregate is immutable once activated; new rules mean a new version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lawbook {
    /// Rulebook identifier.
    pub id: LawbookId,
    /// Version label (e.g. `2026.07.1`).
    pub version: String,
    /// Automation policies keyed by action type at evaluation time.
    pub automation_policies: Vec<AutomationPolicy>,
    /// Activation timestamp.
    pub activated_at: Timestamp,
}

impl Lawbook {
    /// Returns the policy governing an action type, if defined.
    #[must_use]
    pub fn policy_for(&self, action_type: &str) -> Option<&AutomationPolicy> {
        self.automation_policies.iter().find(|policy| policy.action_type == action_type)
    }

    /// Computes the canonical content hash of the rulebook.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when canonicalization fails.
    pub fn content_hash(&self) -> Result<String, HashError> {
        sha256_hex_canonical(self)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by lawbook stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LawbookError {
    /// Underlying store failure.
    #[error("lawbook store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

/// Store holding the active rulebook version per rulebook id.
pub trait LawbookStore: Send + Sync {
    /// Loads the active rulebook for an id.
    ///
    /// # Errors
    ///
    /// Returns [`LawbookError`] when loading fails.
    fn get_active(&self, id: &LawbookId) -> Result<Option<Lawbook>, LawbookError>;

    /// Activates a rulebook version, replacing the previous active version.
    ///
    /// # Errors
    ///
    /// Returns [`LawbookError`] when persistence fails.
    fn activate(&self, lawbook: &Lawbook) -> Result<(), LawbookError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutex-guarded in-memory lawbook store.
#[derive(Debug, Default)]
pub struct InMemoryLawbookStore {
    /// Active rulebook per id.
    active: Mutex<BTreeMap<String, Lawbook>>,
}

impl InMemoryLawbookStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LawbookStore for InMemoryLawbookStore {
    fn get_active(&self, id: &LawbookId) -> Result<Option<Lawbook>, LawbookError> {
        let active = self
            .active
            .lock()
            .map_err(|_| LawbookError::Store("lawbook store poisoned".to_string()))?;
        Ok(active.get(id.as_str()).cloned())
    }

    fn activate(&self, lawbook: &Lawbook) -> Result<(), LawbookError> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| LawbookError::Store("lawbook store poisoned".to_string()))?;
        active.insert(lawbook.id.as_str().to_string(), lawbook.clone());
        Ok(())
    }
}
