// crates/afu9-policy/src/resolver.rs
// ============================================================================
// Module: Lawbook Resolver
// Description: Per-id cached resolution of the active rulebook version.
// Purpose: Expose the active rulebook cheaply while gating paths fail closed.
// Dependencies: afu9-core, crate::lawbook, serde_json
// ============================================================================

//! ## Overview
//! The resolver caches the active rulebook per rulebook id with a short TTL.
//! Results (including "no active rulebook") are cached; errors are not.
//! Activation invalidates the cache entry for that id. Gating write paths use
//! [`LawbookResolver::require_active`], which fails closed when no rulebook is
//! configured; passive ingestion uses [`LawbookResolver::get_active`] and
//! tolerates a null.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;

use afu9_core::ErrorCode;
use afu9_core::LawbookId;
use afu9_core::Timestamp;

use crate::lawbook::Lawbook;
use crate::lawbook::LawbookError;
use crate::lawbook::LawbookStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum cache entry lifetime in milliseconds.
const CACHE_TTL_MS: i64 = 60_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the resolver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// No active rulebook is configured for the id (fail-closed).
    #[error("no active lawbook configured for {0} (fail-closed)")]
    NotConfigured(LawbookId),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] LawbookError),
}

impl ResolverError {
    /// Returns the stable error code for API surfacing.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConfigured(_) => ErrorCode::LawbookNotConfigured,
            Self::Store(_) => ErrorCode::Internal,
        }
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Cached resolution result for one rulebook id.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached active rulebook; `None` caches a confirmed absence.
    lawbook: Option<Lawbook>,
    /// Timestamp the entry was stored.
    cached_at: Timestamp,
}

/// Per-process, per-id cached lawbook resolver.
///
/// # Invariants
/// - Cache entries live at most [`CACHE_TTL_MS`]; errors are never cached.
/// - Activation through [`LawbookResolver::activate`] invalidates the entry.
pub struct LawbookResolver {
    /// Backing store.
    store: Arc<dyn LawbookStore>,
    /// Per-id cache entries.
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl LawbookResolver {
    /// Creates a resolver over a lawbook store.
    #[must_use]
    pub fn new(store: Arc<dyn LawbookStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the active rulebook for an id, tolerating absence.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Store`] when the backing store fails; store
    /// errors are never cached.
    pub fn get_active(
        &self,
        id: &LawbookId,
        now: Timestamp,
    ) -> Result<Option<Lawbook>, ResolverError> {
        if let Ok(cache) = self.cache.lock()
            && let Some(entry) = cache.get(id.as_str())
            && now.millis_since(entry.cached_at) < CACHE_TTL_MS
        {
            return Ok(entry.lawbook.clone());
        }
        let loaded = self.store.get_active(id)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                id.as_str().to_string(),
                CacheEntry {
                    lawbook: loaded.clone(),
                    cached_at: now,
                },
            );
        }
        Ok(loaded)
    }

    /// Returns the active rulebook version for an id, tolerating absence.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Store`] when the backing store fails.
    pub fn get_active_version(
        &self,
        id: &LawbookId,
        now: Timestamp,
    ) -> Result<Option<String>, ResolverError> {
        Ok(self.get_active(id, now)?.map(|lawbook| lawbook.version))
    }

    /// Returns the active rulebook for an id, failing closed on absence.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::NotConfigured`] when no rulebook is active and
    /// [`ResolverError::Store`] when the backing store fails.
    pub fn require_active(&self, id: &LawbookId, now: Timestamp) -> Result<Lawbook, ResolverError> {
        self.get_active(id, now)?.ok_or_else(|| ResolverError::NotConfigured(id.clone()))
    }

    /// Activates a rulebook version and invalidates its cache entry.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Store`] when persistence fails.
    pub fn activate(&self, lawbook: &Lawbook) -> Result<(), ResolverError> {
        self.store.activate(lawbook)?;
        self.invalidate(&lawbook.id);
        Ok(())
    }

    /// Drops the cache entry for an id.
    pub fn invalidate(&self, id: &LawbookId) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(id.as_str());
        }
    }
}

// ============================================================================
// SECTION: Version Attachment
// ============================================================================

/// Merges a `lawbookVersion` field onto a JSON artifact if absent.
///
/// An explicit value already set by the caller is preserved.
#[must_use]
pub fn attach_lawbook_version(mut artifact: Value, version: Option<&str>) -> Value {
    if let Value::Object(map) = &mut artifact {
        match version {
            Some(version) if !map.contains_key("lawbookVersion") => {
                map.insert("lawbookVersion".to_string(), Value::String(version.to_string()));
            }
            _ => {}
        }
    }
    artifact
}
