// crates/afu9-server/src/error.rs
// ============================================================================
// Module: API Error Envelope
// Description: Stable JSON error bodies with machine-readable codes.
// Purpose: Surface every failure as { errorCode, requestId, message, details }.
// Dependencies: afu9-core, axum, serde, serde_json
// ============================================================================

//! ## Overview
//! Every error leaving the API carries a stable [`ErrorCode`], the request id,
//! a human-readable message, and optional structured details. Status codes are
//! derived from the error code so transports stay consistent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use serde_json::Value;

use afu9_core::ErrorCode;
use afu9_core::RequestId;
use afu9_core::StoreError;

// ============================================================================
// SECTION: Error Body
// ============================================================================

/// JSON error body returned by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    #[serde(rename = "errorCode")]
    pub error_code: ErrorCode,
    /// Request identifier echoed back.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// API error carrying its HTTP mapping.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Request identifier echoed back.
    pub request_id: RequestId,
    /// Human-readable message.
    pub message: String,
    /// Structured details.
    pub details: Option<Value>,
}

impl ApiError {
    /// Builds an API error.
    #[must_use]
    pub fn new(code: ErrorCode, request_id: &RequestId, message: impl Into<String>) -> Self {
        Self {
            code,
            request_id: request_id.clone(),
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Maps a store error into an API error.
    #[must_use]
    pub fn from_store(error: &StoreError, request_id: &RequestId) -> Self {
        let mut api = Self::new(error.error_code(), request_id, error.to_string());
        if let StoreError::SingleActiveViolation {
            current_active,
        } = error
        {
            api = api.with_details(serde_json::json!({ "currentActive": current_active }));
        }
        api
    }

    /// Returns the HTTP status for the error code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.code {
            ErrorCode::InvalidInput
            | ErrorCode::AcceptanceCriteriaRequired
            | ErrorCode::InvalidEnv
            | ErrorCode::InvalidPath => StatusCode::BAD_REQUEST,
            ErrorCode::SignatureInvalid => StatusCode::UNAUTHORIZED,
            ErrorCode::RepoNotAllowed
            | ErrorCode::LawbookDenied
            | ErrorCode::TargetNotAllowed
            | ErrorCode::ApprovalRequired
            | ErrorCode::ManualOverrideBlocked
            | ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound
            | ErrorCode::RunNotFound
            | ErrorCode::DeployNotFound
            | ErrorCode::VerdictNotFound
            | ErrorCode::VerificationNotFound => StatusCode::NOT_FOUND,
            ErrorCode::SingleActiveViolation
            | ErrorCode::InvalidTransition
            | ErrorCode::TransitionPreconditionFailed
            | ErrorCode::Conflict
            | ErrorCode::SyncConflict
            | ErrorCode::EvidenceMissing => StatusCode::CONFLICT,
            ErrorCode::CooldownActive | ErrorCode::RateLimitExceeded => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::LawbookNotConfigured
            | ErrorCode::PolicyConfigError
            | ErrorCode::IngestionFailed
            | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error_code: self.code,
            request_id: self.request_id.as_str().to_string(),
            message: Some(self.message),
            details: self.details,
        };
        (status, [("X-Request-Id", body.request_id.clone())], Json(body)).into_response()
    }
}

// ============================================================================
// SECTION: Auth Failure Helper
// ============================================================================

/// Builds the standard unauthorized error for write endpoints.
#[must_use]
pub fn unauthorized(request_id: &RequestId) -> ApiError {
    ApiError::new(ErrorCode::SignatureInvalid, request_id, "missing or invalid service token")
}
