// crates/post-forge-core/src/core/time.rs
// ============================================================================
// Module: Post Forge Time Model
// Description: Canonical timestamp representation for records and artifacts.
// Purpose: Provide one wall-clock representation with a stable wire form.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! All persisted records carry unix-second timestamps. Ordering guarantees in
//! the store come from insertion order, not from these values; readers must
//! treat wall-clock ties as unordered. RFC 3339 rendering is provided for the
//! dashboard wire format and backup snapshot names.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch timestamp in whole seconds.
///
/// # Invariants
/// - Values are seconds since the unix epoch, UTC.
/// - Pre-epoch values are representable but never produced by [`Timestamp::now`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix seconds.
    #[must_use]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(secs)
    }

    /// Returns the timestamp as unix seconds.
    #[must_use]
    pub const fn as_unix_secs(self) -> i64 {
        self.0
    }

    /// Renders the timestamp as an RFC 3339 UTC string.
    ///
    /// Falls back to the raw unix-second value when the timestamp is outside
    /// the representable calendar range.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        OffsetDateTime::from_unix_timestamp(self.0)
            .ok()
            .and_then(|moment| moment.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}
