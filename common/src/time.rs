//! Time utilities and constants for rate freshness.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Timing defaults.
pub mod constants {
    use super::Duration;

    /// Window after which an automated rate counts as stale (24 hours).
    pub fn default_freshness_window() -> Duration {
        Duration::hours(24)
    }

    /// Upper bound for a single provider request (10 seconds).
    pub fn default_provider_timeout() -> Duration {
        Duration::seconds(10)
    }

    /// Interval between background staleness checks (1 hour).
    pub fn default_check_interval() -> Duration {
        Duration::hours(1)
    }

    /// Largest accepted freshness window (10 years).
    pub fn max_freshness_window() -> Duration {
        Duration::days(3650)
    }
}

/// A timestamp, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Whether `timestamp` is at least `window` before `reference`.
/// The boundary itself counts as stale. A cutoff outside the representable
/// range means nothing can be that old.
pub fn is_at_least_old(timestamp: Timestamp, window: Duration, reference: Timestamp) -> bool {
    match reference.checked_sub_signed(window) {
        Some(cutoff) => timestamp <= cutoff,
        None => false,
    }
}

/// Milliseconds since the Unix epoch, the storage representation.
pub fn to_millis(timestamp: Timestamp) -> i64 {
    timestamp.timestamp_millis()
}

/// Inverse of [`to_millis`].
pub fn from_millis(millis: i64) -> Option<Timestamp> {
    Utc.timestamp_millis_opt(millis).single()
}

/// Duration extensions for convenient construction.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}
