//! Refresh cycle state definitions.

use std::fmt;

/// Phase of the current refresh cycle.
///
/// `Idle → CheckingStaleness → Idle` when rates are fresh, otherwise
/// `AwaitingNetwork → Fetching → Persisting → RefreshingCache → Idle`.
/// Any failure returns straight to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// No cycle in flight.
    #[default]
    Idle,
    /// Reading staleness from the store.
    CheckingStaleness,
    /// Asking the connectivity source whether to go out.
    AwaitingNetwork,
    /// Waiting on a provider.
    Fetching,
    /// Writing the fetched batch.
    Persisting,
    /// Swapping in a new cache snapshot.
    RefreshingCache,
}

impl SyncPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, SyncPhase::Idle)
    }

    /// Check if a cycle is past the staleness check and doing work.
    pub fn is_refreshing(&self) -> bool {
        matches!(
            self,
            SyncPhase::AwaitingNetwork
                | SyncPhase::Fetching
                | SyncPhase::Persisting
                | SyncPhase::RefreshingCache
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::CheckingStaleness => "checking-staleness",
            SyncPhase::AwaitingNetwork => "awaiting-network",
            SyncPhase::Fetching => "fetching",
            SyncPhase::Persisting => "persisting",
            SyncPhase::RefreshingCache => "refreshing-cache",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What triggered a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Staleness check from the periodic driver or host foreground event.
    Background,
    /// Explicit user request.
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Background => "background",
            Trigger::Manual => "manual",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
