// crates/afu9-server/tests/webhook.rs
// ============================================================================
// Module: Webhook Intake Tests
// Description: Tests for signature verification, dedup, and dispatch mapping.
// Purpose: Pin the length-gated constant-time verify and exactly-once intake.
// Dependencies: afu9-core, afu9-server, hmac, serde_json, sha2
// ============================================================================
//! ## Overview
//! Signatures must be rejected on length mismatch before any comparison,
//! duplicate delivery ids must no-op, and workflow mappings must resolve
//! `event_type.action` before the bare event type.

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

use afu9_core::Timestamp;
use afu9_server::InMemoryWebhookStore;
use afu9_server::IntakeError;
use afu9_server::IntakeStatus;
use afu9_server::WebhookHeaders;
use afu9_server::handle_inbound_webhook;
use afu9_server::verify_signature;
use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;

/// Computes the `sha256=<hex>` signature header for a body.
fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("sha256={hex}")
}

/// Builds standard intake headers.
fn headers(delivery: &str) -> WebhookHeaders {
    WebhookHeaders {
        delivery_id: delivery.to_string(),
        event_type: "pull_request".to_string(),
        signature: String::new(),
    }
}

/// Verifies a correct signature passes verification.
#[test]
fn valid_signature_verifies() {
    let body = br#"{"action":"closed"}"#;
    let header = sign("secret", body);
    assert!(verify_signature("secret", body, &header));
}

/// Verifies wrong secrets and tampered bodies fail.
#[test]
fn wrong_secret_or_body_fails() {
    let body = br#"{"action":"closed"}"#;
    let header = sign("secret", body);
    assert!(!verify_signature("other", body, &header));
    assert!(!verify_signature("secret", br#"{"action":"opened"}"#, &header));
}

/// Verifies length mismatches are rejected before comparison.
#[test]
fn length_mismatch_rejected_before_compare() {
    let body = b"payload";
    assert!(!verify_signature("secret", body, "sha256=abcd"));
    assert!(!verify_signature("secret", body, &format!("sha256={}", "a".repeat(128))));
    assert!(!verify_signature("secret", body, "md5=whatever"));
    assert!(!verify_signature("secret", body, &format!("sha256={}", "z".repeat(64))));
}

/// Verifies a signed event is accepted and persisted once.
#[test]
fn signed_event_is_accepted() {
    let store = InMemoryWebhookStore::new();
    let body = br#"{"action":"closed","repository":{"full_name":"afu9/cc"}}"#;
    let mut head = headers("d-1");
    head.signature = sign("secret", body);

    let result = handle_inbound_webhook(
        &store,
        Some("secret"),
        &head,
        body,
        Timestamp::from_unix_millis(0),
    )
    .unwrap();
    assert_eq!(result.status, IntakeStatus::Ok);
    assert_eq!(store.event_count().unwrap(), 1);
}

/// Verifies duplicate delivery ids no-op.
#[test]
fn duplicate_delivery_noops() {
    let store = InMemoryWebhookStore::new();
    let body = br#"{"action":"closed"}"#;
    let mut head = headers("d-1");
    head.signature = sign("secret", body);

    let now = Timestamp::from_unix_millis(0);
    handle_inbound_webhook(&store, Some("secret"), &head, body, now).unwrap();
    let second = handle_inbound_webhook(&store, Some("secret"), &head, body, now).unwrap();
    assert_eq!(second.status, IntakeStatus::Duplicate);
    assert_eq!(store.event_count().unwrap(), 1);
}

/// Verifies the action-qualified mapping wins over the bare event type.
#[test]
fn action_qualified_mapping_wins() {
    let store = InMemoryWebhookStore::new();
    store.map_workflow("pull_request", "generic-flow", true).unwrap();
    store.map_workflow("pull_request.closed", "merge-flow", true).unwrap();

    let body = br#"{"action":"closed"}"#;
    let mut head = headers("d-1");
    head.signature = sign("secret", body);
    let result = handle_inbound_webhook(
        &store,
        Some("secret"),
        &head,
        body,
        Timestamp::from_unix_millis(0),
    )
    .unwrap();
    assert_eq!(result.dispatched_workflow.as_deref(), Some("merge-flow"));
}

/// Verifies a mapping without auto-trigger records but does not dispatch.
#[test]
fn manual_mapping_does_not_dispatch() {
    let store = InMemoryWebhookStore::new();
    store.map_workflow("pull_request", "manual-flow", false).unwrap();

    let body = br#"{"x":1}"#;
    let mut head = headers("d-1");
    head.signature = sign("secret", body);
    let result = handle_inbound_webhook(
        &store,
        Some("secret"),
        &head,
        body,
        Timestamp::from_unix_millis(0),
    )
    .unwrap();
    assert_eq!(result.status, IntakeStatus::Ok);
    assert!(result.dispatched_workflow.is_none());
}

/// Verifies a missing secret rejects every webhook.
#[test]
fn missing_secret_rejects_all() {
    let store = InMemoryWebhookStore::new();
    let body = br#"{"x":1}"#;
    let mut head = headers("d-1");
    head.signature = sign("secret", body);
    let err = handle_inbound_webhook(&store, None, &head, body, Timestamp::from_unix_millis(0))
        .unwrap_err();
    assert!(matches!(err, IntakeError::SignatureInvalid));
}
