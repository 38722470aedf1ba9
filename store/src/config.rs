//! Rate store configuration.

use chrono::Duration;
use ratekeeper_common::constants;

/// Configuration for the SQLite-backed rate store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite connection URL, e.g. `sqlite://ratekeeper.db` or `sqlite::memory:`.
    pub database_url: String,
    /// Maximum pooled connections. Forced to 1 for in-memory databases.
    pub max_connections: u32,
    /// Age at which automated rates count as stale.
    pub freshness_window: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://ratekeeper.db".to_string(),
            max_connections: 4,
            freshness_window: constants::default_freshness_window(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RATEKEEPER_DATABASE_URL") {
            config.database_url = url;
        }

        if let Ok(hours) = std::env::var("RATEKEEPER_FRESHNESS_HOURS") {
            if let Some(window) = hours.parse::<i64>().ok().and_then(Duration::try_hours) {
                config.freshness_window = window;
            }
        }

        config
    }

    /// Whether the URL points at a connection-private in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections cannot be 0".to_string());
        }

        if self.freshness_window <= Duration::zero() {
            return Err("Freshness window must be positive".to_string());
        }

        if self.freshness_window > constants::max_freshness_window() {
            return Err(format!(
                "Freshness window cannot exceed {} days",
                constants::max_freshness_window().num_days()
            ));
        }

        Ok(())
    }
}
