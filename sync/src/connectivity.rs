//! Host connectivity as seen by the orchestrator.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

/// Answer from a connectivity source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The source knows whether the host can reach the internet.
    Available(bool),
    /// The source cannot tell.
    Unknown,
}

impl Connectivity {
    /// Only a definite "no" blocks an attempt. `Unknown` is treated as online.
    pub fn allows_attempt(&self) -> bool {
        !matches!(self, Connectivity::Available(false))
    }
}

/// Something that can say whether the host is online.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn connectivity(&self) -> Connectivity;
}

/// Network status as a host platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    /// A network interface is up.
    pub is_connected: bool,
    /// The internet is reachable over it. `None` while the platform is still probing.
    pub is_internet_reachable: Option<bool>,
}

impl NetworkState {
    pub fn connectivity(&self) -> Connectivity {
        if !self.is_connected {
            return Connectivity::Available(false);
        }
        match self.is_internet_reachable {
            Some(reachable) => Connectivity::Available(reachable),
            None => Connectivity::Available(true),
        }
    }
}

/// Connectivity probe fed by host network events.
///
/// Answers `Unknown` until the first `update`.
#[derive(Debug, Default)]
pub struct NetworkMonitor {
    state: RwLock<Option<NetworkState>>,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest status from the host.
    pub fn update(&self, state: NetworkState) {
        debug!(
            is_connected = state.is_connected,
            is_internet_reachable = ?state.is_internet_reachable,
            "Network state updated"
        );
        *self.state.write() = Some(state);
    }

    /// Forget the last status, e.g. when the host loses its network listener.
    pub fn reset(&self) {
        *self.state.write() = None;
    }

    pub fn state(&self) -> Option<NetworkState> {
        *self.state.read()
    }
}

#[async_trait]
impl ConnectivityProbe for NetworkMonitor {
    async fn connectivity(&self) -> Connectivity {
        self.state()
            .map(|state| state.connectivity())
            .unwrap_or(Connectivity::Unknown)
    }
}

/// Probe for hosts with no connectivity source at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownConnectivity;

#[async_trait]
impl ConnectivityProbe for UnknownConnectivity {
    async fn connectivity(&self) -> Connectivity {
        Connectivity::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_state_mapping() {
        let offline = NetworkState {
            is_connected: false,
            is_internet_reachable: Some(true),
        };
        assert_eq!(offline.connectivity(), Connectivity::Available(false));

        let captive = NetworkState {
            is_connected: true,
            is_internet_reachable: Some(false),
        };
        assert_eq!(captive.connectivity(), Connectivity::Available(false));

        let probing = NetworkState {
            is_connected: true,
            is_internet_reachable: None,
        };
        assert_eq!(probing.connectivity(), Connectivity::Available(true));
    }

    #[test]
    fn test_only_definite_offline_blocks() {
        assert!(Connectivity::Unknown.allows_attempt());
        assert!(Connectivity::Available(true).allows_attempt());
        assert!(!Connectivity::Available(false).allows_attempt());
    }

    #[tokio::test]
    async fn test_monitor_starts_unknown() {
        let monitor = NetworkMonitor::new();
        assert_eq!(monitor.connectivity().await, Connectivity::Unknown);

        monitor.update(NetworkState {
            is_connected: false,
            is_internet_reachable: None,
        });
        assert_eq!(monitor.connectivity().await, Connectivity::Available(false));

        monitor.reset();
        assert_eq!(monitor.connectivity().await, Connectivity::Unknown);
        assert_eq!(UnknownConnectivity.connectivity().await, Connectivity::Unknown);
    }
}
