// crates/afu9-server/src/auth.rs
// ============================================================================
// Module: Service Token Auth
// Description: Constant-time shared-secret check for write endpoints.
// Purpose: Gate mutating endpoints without leaking timing information.
// Dependencies: axum, subtle
// ============================================================================

//! ## Overview
//! Write endpoints require the `X-Service-Token` shared secret; admin-only
//! endpoints additionally require the distinct `X-Admin-Token` secret, so a
//! service caller without admin rights is authenticated but forbidden.
//! Comparisons are length-gated and constant-time. When a secret is not
//! configured the server is in local development mode and that gate is open.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Comparison
// ============================================================================

/// Compares two byte strings in constant time.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Checks a token header against a configured secret.
///
/// A missing configured secret means local development mode: allowed.
fn token_header_ok(headers: &HeaderMap, header: &str, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| constant_time_eq(provided.as_bytes(), expected.as_bytes()))
}

/// Checks the `X-Service-Token` header against the configured secret.
#[must_use]
pub fn service_token_ok(headers: &HeaderMap, expected: Option<&str>) -> bool {
    token_header_ok(headers, "X-Service-Token", expected)
}

/// Checks the `X-Admin-Token` header against the configured admin secret.
#[must_use]
pub fn admin_token_ok(headers: &HeaderMap, expected: Option<&str>) -> bool {
    token_header_ok(headers, "X-Admin-Token", expected)
}
