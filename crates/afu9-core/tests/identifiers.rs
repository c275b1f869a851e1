// crates/afu9-core/tests/identifiers.rs
// ============================================================================
// Module: Identifier Tests
// Description: Tests for canonical identifier validation.
// Purpose: Pin the I<digits> / E<digits>.<digits> grammar.
// Dependencies: afu9-core
// ============================================================================
//! ## Overview
//! Canonical identifiers are validated at construction; everything else in
//! the system may assume a well-formed value.

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

use afu9_core::CanonicalId;
use afu9_core::IdentifierError;

/// Verifies well-formed identifiers parse.
#[test]
fn well_formed_ids_parse() {
    for raw in ["I1", "I042", "I999999", "E1.2", "E12.0", "E003.045"] {
        let id = CanonicalId::parse(raw).unwrap();
        assert_eq!(id.as_str(), raw);
    }
}

/// Verifies malformed identifiers are rejected.
#[test]
fn malformed_ids_are_rejected() {
    for raw in ["", "I", "E", "i1", "I1a", "E1", "E1.", "E.2", "E1.2.3", "X9", "I-1", "E1,2"] {
        let err = CanonicalId::parse(raw).unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidCanonicalId(_)), "accepted {raw}");
    }
}

/// Verifies serde deserialization enforces the grammar.
#[test]
fn serde_enforces_grammar() {
    let ok: CanonicalId = serde_json::from_str("\"E7.3\"").unwrap();
    assert_eq!(ok.as_str(), "E7.3");
    assert!(serde_json::from_str::<CanonicalId>("\"done\"").is_err());
}
