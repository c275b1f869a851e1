// crates/afu9-server/src/webhook.rs
// ============================================================================
// Module: Webhook Intake
// Description: Signature verification, delivery dedup, and workflow dispatch.
// Purpose: Accept Forge webhooks exactly once and fail closed on bad signatures.
// Dependencies: afu9-core, hmac, serde, serde_json, sha2, subtle, thiserror
// ============================================================================

//! ## Overview
//! Intake is O(1) per event: verify the `sha256=<hex>` HMAC signature with a
//! length gate before the constant-time compare, deduplicate on the delivery
//! id with a conflict-ignore insert, persist the event, and look up the
//! workflow mapping for `event_type[.event_action]`. Dispatch is asynchronous
//! from the caller's perspective; intake only records the decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use hmac::Hmac;
use hmac::Mac;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use afu9_core::ErrorCode;
use afu9_core::Timestamp;

use crate::auth::constant_time_eq;

// ============================================================================
// SECTION: Signature Verification
// ============================================================================

/// Hex length of a SHA-256 HMAC signature.
const SIGNATURE_HEX_LEN: usize = 64;

/// Verifies a `sha256=<hex>` signature header against the body bytes.
///
/// Malformed headers, bad hex, and length mismatches are rejected before the
/// constant-time comparison runs.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    if hex.len() != SIGNATURE_HEX_LEN {
        return false;
    }
    let Some(provided) = decode_hex(hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();
    constant_time_eq(&provided, &expected)
}

/// Decodes a lowercase or uppercase hex string.
fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    let raw = hex.as_bytes();
    for pair in raw.chunks(2) {
        let high = hex_value(pair[0])?;
        let low = hex_value(pair[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Returns the numeric value of a hex digit.
const fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

// ============================================================================
// SECTION: Intake Store Contract
// ============================================================================

/// Errors raised by webhook stores.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookStoreError {
    /// Underlying store failure.
    #[error("webhook store error: {0}")]
    Store(String),
}

/// Store contract for webhook intake.
pub trait WebhookStore: Send + Sync {
    /// Records a delivery id; returns false when it was already seen.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookStoreError`] when persistence fails.
    fn record_delivery(
        &self,
        delivery_id: &str,
        event_type: &str,
        repo: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, WebhookStoreError>;

    /// Persists the event row and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookStoreError`] when persistence fails.
    fn persist_event(
        &self,
        delivery_id: &str,
        event_type: &str,
        event_action: Option<&str>,
        payload: &Value,
        signature: &str,
        now: Timestamp,
    ) -> Result<i64, WebhookStoreError>;

    /// Marks an event processed.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookStoreError`] when persistence fails.
    fn mark_processed(&self, event_id: i64) -> Result<(), WebhookStoreError>;

    /// Looks up the workflow mapping for an event key.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookStoreError`] when the query fails.
    fn workflow_for(&self, event_key: &str)
    -> Result<Option<(String, bool)>, WebhookStoreError>;
}

// ============================================================================
// SECTION: Intake
// ============================================================================

/// Outcome statuses of webhook intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStatus {
    /// Event accepted and (optionally) dispatched.
    Ok,
    /// Delivery id already seen; nothing done.
    Duplicate,
}

/// Result of webhook intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeResult {
    /// Intake status.
    pub status: IntakeStatus,
    /// Workflow dispatched, when a mapping matched with auto-trigger.
    pub dispatched_workflow: Option<String>,
}

/// Errors raised by webhook intake.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Signature missing or invalid.
    #[error("webhook signature invalid")]
    SignatureInvalid,
    /// Required header missing or payload malformed.
    #[error("webhook payload invalid: {0}")]
    Invalid(String),
    /// Store failure.
    #[error(transparent)]
    Store(#[from] WebhookStoreError),
}

impl IntakeError {
    /// Returns the stable error code for API surfacing.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::SignatureInvalid => ErrorCode::SignatureInvalid,
            Self::Invalid(_) => ErrorCode::InvalidInput,
            Self::Store(_) => ErrorCode::Internal,
        }
    }
}

/// Parsed webhook headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    /// Delivery identifier.
    pub delivery_id: String,
    /// Event type.
    pub event_type: String,
    /// Signature header value.
    pub signature: String,
}

/// Handles one inbound webhook.
///
/// # Errors
///
/// Returns [`IntakeError::SignatureInvalid`] on verification failure,
/// [`IntakeError::Invalid`] on malformed payloads, and store failures as
/// [`IntakeError::Store`].
pub fn handle_inbound_webhook(
    store: &dyn WebhookStore,
    secret: Option<&str>,
    headers: &WebhookHeaders,
    body: &[u8],
    now: Timestamp,
) -> Result<IntakeResult, IntakeError> {
    let Some(secret) = secret else {
        return Err(IntakeError::SignatureInvalid);
    };
    if !verify_signature(secret, body, &headers.signature) {
        return Err(IntakeError::SignatureInvalid);
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|err| IntakeError::Invalid(err.to_string()))?;
    let event_action = payload.get("action").and_then(Value::as_str).map(ToString::to_string);
    let repo = payload
        .get("repository")
        .and_then(|repository| repository.get("full_name"))
        .and_then(Value::as_str);

    let fresh =
        store.record_delivery(&headers.delivery_id, &headers.event_type, repo, now)?;
    if !fresh {
        return Ok(IntakeResult {
            status: IntakeStatus::Duplicate,
            dispatched_workflow: None,
        });
    }

    let event_id = store.persist_event(
        &headers.delivery_id,
        &headers.event_type,
        event_action.as_deref(),
        &payload,
        &headers.signature,
        now,
    )?;

    let keyed = event_action
        .as_deref()
        .map(|action| format!("{}.{action}", headers.event_type));
    let mapping = match keyed {
        Some(key) => match store.workflow_for(&key)? {
            Some(mapping) => Some(mapping),
            None => store.workflow_for(&headers.event_type)?,
        },
        None => store.workflow_for(&headers.event_type)?,
    };

    let dispatched_workflow = match mapping {
        Some((workflow, true)) => Some(workflow),
        _ => None,
    };
    store.mark_processed(event_id)?;
    Ok(IntakeResult {
        status: IntakeStatus::Ok,
        dispatched_workflow,
    })
}
