// crates/afu9-policy/tests/resolver.rs
// ============================================================================
// Module: Lawbook Resolver Tests
// Description: Tests for per-id caching, fail-closed gating, and attachment.
// Purpose: Pin the resolver cache and version-attachment semantics.
// Dependencies: afu9-core, afu9-policy, serde_json
// ============================================================================
//! ## Overview
//! Exercises cache TTL behavior, invalidation on activation, the fail-closed
//! `require_active` path, and `lawbookVersion` attachment.

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

use afu9_core::LawbookId;
use afu9_core::Timestamp;
use afu9_policy::InMemoryLawbookStore;
use afu9_policy::Lawbook;
use afu9_policy::LawbookResolver;
use afu9_policy::LawbookStore;
use afu9_policy::ResolverError;
use afu9_policy::attach_lawbook_version;
use serde_json::json;

/// Builds a lawbook with the given version.
fn lawbook(version: &str) -> Lawbook {
    Lawbook {
        id: LawbookId::default_id(),
        version: version.to_string(),
        automation_policies: Vec::new(),
        activated_at: Timestamp::from_unix_millis(0),
    }
}

/// Returns a fixed test timestamp.
fn at(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}

/// Verifies `require_active` fails closed when nothing is active.
#[test]
fn require_active_fails_closed() {
    let store = Arc::new(InMemoryLawbookStore::new());
    let resolver = LawbookResolver::new(store);
    let err = resolver.require_active(&LawbookId::default_id(), at(0)).unwrap_err();
    assert!(matches!(err, ResolverError::NotConfigured(_)));
}

/// Verifies `get_active` tolerates absence.
#[test]
fn get_active_tolerates_absence() {
    let store = Arc::new(InMemoryLawbookStore::new());
    let resolver = LawbookResolver::new(store);
    let loaded = resolver.get_active(&LawbookId::default_id(), at(0)).unwrap();
    assert!(loaded.is_none());
}

/// Verifies the cache serves stale reads inside the TTL.
#[test]
fn cache_serves_within_ttl() {
    let store = Arc::new(InMemoryLawbookStore::new());
    let resolver = LawbookResolver::new(Arc::clone(&store) as Arc<dyn LawbookStore>);
    store.activate(&lawbook("v1")).unwrap();

    let first = resolver.get_active_version(&LawbookId::default_id(), at(0)).unwrap();
    assert_eq!(first.as_deref(), Some("v1"));

    // Replacement behind the resolver's back stays invisible inside the TTL.
    store.activate(&lawbook("v2")).unwrap();
    let cached = resolver.get_active_version(&LawbookId::default_id(), at(30_000)).unwrap();
    assert_eq!(cached.as_deref(), Some("v1"));

    let expired = resolver.get_active_version(&LawbookId::default_id(), at(61_000)).unwrap();
    assert_eq!(expired.as_deref(), Some("v2"));
}

/// Verifies activation through the resolver invalidates the cache entry.
#[test]
fn activation_invalidates_cache() {
    let store = Arc::new(InMemoryLawbookStore::new());
    let resolver = LawbookResolver::new(Arc::clone(&store) as Arc<dyn LawbookStore>);
    resolver.activate(&lawbook("v1")).unwrap();
    assert_eq!(
        resolver.get_active_version(&LawbookId::default_id(), at(0)).unwrap().as_deref(),
        Some("v1")
    );

    resolver.activate(&lawbook("v2")).unwrap();
    let version = resolver.get_active_version(&LawbookId::default_id(), at(1)).unwrap();
    assert_eq!(version.as_deref(), Some("v2"));
}

/// Verifies version attachment preserves caller-set values.
#[test]
fn attach_preserves_explicit_version() {
    let artifact = json!({ "lawbookVersion": "explicit", "k": 1 });
    let merged = attach_lawbook_version(artifact, Some("v9"));
    assert_eq!(merged["lawbookVersion"], "explicit");

    let merged = attach_lawbook_version(json!({ "k": 1 }), Some("v9"));
    assert_eq!(merged["lawbookVersion"], "v9");

    let untouched = attach_lawbook_version(json!({ "k": 1 }), None);
    assert!(untouched.get("lawbookVersion").is_none());
}
