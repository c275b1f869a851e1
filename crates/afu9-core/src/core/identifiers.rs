// crates/afu9-core/src/core/identifiers.rs
// ============================================================================
// Module: AFU-9 Identifiers
// Description: Canonical opaque identifiers for Issues, runs, and governance records.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! the AFU-9 control plane. Most identifiers are opaque and serialize as
//! strings; [`CanonicalId`] additionally validates the project-wide
//! `I<digits>` / `E<digits>.<digits>` grammar at construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing validated identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Canonical identifier does not match `I<digits>` or `E<digits>.<digits>`.
    #[error("invalid canonical id: {0}")]
    InvalidCanonicalId(String),
}

// ============================================================================
// SECTION: Opaque Identifier Types
// ============================================================================

/// Declares an opaque string identifier newtype in the canonical shape.
macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident, $create_doc:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = $create_doc]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(
    /// Issue identifier (UUID string assigned at creation).
    IssueId,
    "Creates a new issue identifier."
);

opaque_id!(
    /// Run identifier grouping ordered steps and artifacts.
    RunId,
    "Creates a new run identifier."
);

opaque_id!(
    /// Incident identifier for failure classification.
    IncidentId,
    "Creates a new incident identifier."
);

opaque_id!(
    /// Rulebook identifier (default `AFU9-LAWBOOK`).
    LawbookId,
    "Creates a new lawbook identifier."
);

opaque_id!(
    /// Webhook delivery identifier used for intake deduplication.
    DeliveryId,
    "Creates a new delivery identifier."
);

opaque_id!(
    /// Request identifier echoed in API responses.
    RequestId,
    "Creates a new request identifier."
);

impl LawbookId {
    /// Returns the default rulebook identifier.
    #[must_use]
    pub fn default_id() -> Self {
        Self::new("AFU9-LAWBOOK")
    }
}

// ============================================================================
// SECTION: Canonical Identifier
// ============================================================================

/// Project-wide stable identifier of the form `I<digits>` or
/// `E<digits>.<digits>`.
///
/// # Invariants
/// - The wrapped string always matches the canonical grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Parses and validates a canonical identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::InvalidCanonicalId`] when the value does not
    /// match `I<digits>` or `E<digits>.<digits>`.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if is_canonical_form(&value) {
            Ok(Self(value))
        } else {
            Err(IdentifierError::InvalidCanonicalId(value))
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for CanonicalId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CanonicalId> for String {
    fn from(value: CanonicalId) -> Self {
        value.0
    }
}

/// Returns true when the value matches `I<digits>` or `E<digits>.<digits>`.
fn is_canonical_form(value: &str) -> bool {
    let Some(kind) = value.chars().next() else {
        return false;
    };
    let rest = &value[1..];
    match kind {
        'I' => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        'E' => {
            let Some((major, minor)) = rest.split_once('.') else {
                return false;
            };
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}
