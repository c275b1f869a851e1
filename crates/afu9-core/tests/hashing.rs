// crates/afu9-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Tests for RFC 8785 canonicalization and digest stability.
// Purpose: Pin hash determinism across key order and round-trips.
// Dependencies: afu9-core, proptest, serde_json
// ============================================================================
//! ## Overview
//! Canonical hashing must be insensitive to JSON key order and stable across
//! serialize/deserialize round-trips, since audit dedup and postmortem
//! idempotence key off these digests.

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

use afu9_core::hashing::canonical_json_bytes;
use afu9_core::hashing::hash_bytes;
use afu9_core::hashing::sha256_hex_canonical;
use proptest::prelude::any;
use proptest::prelude::proptest;
use proptest::prop_assert_eq;
use serde_json::Value;
use serde_json::json;

/// Verifies key order does not affect the canonical digest.
#[test]
fn key_order_is_canonicalized() {
    let a = json!({ "b": 1, "a": { "y": 2, "x": 3 } });
    let b = json!({ "a": { "x": 3, "y": 2 }, "b": 1 });
    assert_eq!(sha256_hex_canonical(&a).unwrap(), sha256_hex_canonical(&b).unwrap());
}

/// Verifies digests are lowercase 64-character hex strings.
#[test]
fn digest_is_lowercase_hex() {
    let digest = sha256_hex_canonical(&json!({ "k": "v" })).unwrap();
    assert_eq!(digest.len(), 64);
    assert!(digest.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
}

/// Verifies the well-known empty-input digest.
#[test]
fn empty_bytes_digest_matches_reference() {
    let digest = hash_bytes(b"");
    assert_eq!(
        digest.value,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

proptest! {
    /// Verifies canonical bytes survive a parse/re-canonicalize round-trip.
    #[test]
    fn canonical_round_trip_is_stable(text in any::<String>(), number in any::<i64>()) {
        let value = json!({ "text": text, "number": number, "nested": { "flag": true } });
        let bytes = canonical_json_bytes(&value).unwrap();
        let reparsed: Value = serde_json::from_slice(&bytes).unwrap();
        let second = canonical_json_bytes(&reparsed).unwrap();
        prop_assert_eq!(bytes, second);
    }
}
