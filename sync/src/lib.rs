//! Ratekeeper Sync
//!
//! Decides when to refresh FX rates and keeps the rate store and cache in
//! step with the external providers. A refresh cycle checks staleness,
//! consults the host's connectivity, walks the provider chain until one
//! answers, persists the batch and swaps in a new cache snapshot.

pub mod config;
pub mod connectivity;
pub mod metrics;
pub mod orchestrator;
pub mod state;

pub use config::SyncConfig;
pub use connectivity::{Connectivity, ConnectivityProbe, NetworkMonitor, NetworkState, UnknownConnectivity};
pub use metrics::{SyncMetrics, SyncMetricsSnapshot};
pub use orchestrator::{CheckOutcome, RefreshOutcome, SharedSyncOrchestrator, SyncOrchestrator, SyncStatus};
pub use state::{SyncPhase, Trigger};
