// crates/p2n-core/src/core/time.rs
// ============================================================================
// Module: Paper2Notebook Time Model
// Description: Canonical timestamp representation for entities and events.
// Purpose: Provide explicit unix-millisecond time values with UTC date parts.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Paper2Notebook stores explicit unix-millisecond timestamps on entities and
//! run events. Blob paths are partitioned by the UTC date derived from the
//! ingest timestamp, so date math must be stable across hosts and locales.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp in unix milliseconds.
///
/// # Invariants
/// - Values are explicit; ordering is numeric and monotonicity is a caller
///   responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX));
        Self(millis)
    }

    /// Returns the raw unix-millisecond value.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the UTC date parts `(year, month, day)` for this timestamp.
    ///
    /// Timestamps outside the representable range clamp to the unix epoch
    /// date so path construction never fails.
    #[must_use]
    pub fn utc_date_parts(self) -> (i32, u8, u8) {
        let seconds = self.0.div_euclid(1_000);
        OffsetDateTime::from_unix_timestamp(seconds)
            .map_or((1970, 1, 1), |at| (at.year(), at.month() as u8, at.day()))
    }

}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::Timestamp;

    /// Tests UTC date part derivation for a known timestamp.
    #[test]
    fn utc_date_parts_known_value() {
        // 2024-03-05T12:00:00Z
        let at = Timestamp::from_unix_millis(1_709_640_000_000);
        assert_eq!(at.utc_date_parts(), (2024, 3, 5));
    }

    /// Tests date parts clamp instead of failing on out-of-range values.
    #[test]
    fn utc_date_parts_clamps_out_of_range() {
        let at = Timestamp::from_unix_millis(i64::MIN);
        assert_eq!(at.utc_date_parts(), (1970, 1, 1));
    }
}
