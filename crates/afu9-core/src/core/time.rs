// crates/afu9-core/src/core/time.rs
// ============================================================================
// Module: AFU-9 Time Model
// Description: Canonical timestamp representation for Issues, events, and audits.
// Purpose: Provide deterministic, replayable time values across AFU-9 records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! AFU-9 uses explicit unix-epoch-millisecond timestamps embedded in records
//! to keep replay deterministic. The core never reads wall-clock time
//! directly; hosts supply `now` at every mutation boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix epoch milliseconds.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Monotonicity is a caller responsibility.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp shifted forward by whole seconds (saturating).
    #[must_use]
    pub const fn plus_seconds(self, seconds: i64) -> Self {
        Self(self.0.saturating_add(seconds.saturating_mul(1_000)))
    }

    /// Returns the elapsed milliseconds since `earlier` (saturating at zero).
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        let delta = self.0.saturating_sub(earlier.0);
        if delta < 0 { 0 } else { delta }
    }

    /// Returns the bucket index for a fixed window width in seconds.
    ///
    /// Buckets are `floor(epoch_seconds / window_seconds)`; a zero or negative
    /// window collapses to a single bucket so dedup still holds.
    #[must_use]
    pub const fn bucket(self, window_seconds: i64) -> i64 {
        if window_seconds <= 0 {
            return 0;
        }
        self.0.div_euclid(1_000).div_euclid(window_seconds)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
