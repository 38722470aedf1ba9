//! Provider client configuration.

use std::sync::Arc;
use std::time::Duration;

use ratekeeper_common::{constants, DurationExt, FxResult};

use crate::frankfurter::{FrankfurterClient, FRANKFURTER_URL};
use crate::open_er::{OpenErApiClient, OPEN_ER_API_URL};
use crate::provider::RateProvider;

/// Endpoints and deadlines for the provider clients.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the primary API.
    pub primary_url: String,
    /// Base URL of the fallback API. `None` disables the fallback.
    pub fallback_url: Option<String>,
    /// Deadline for a single provider request.
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary_url: OPEN_ER_API_URL.to_string(),
            fallback_url: Some(FRANKFURTER_URL.to_string()),
            request_timeout: constants::default_provider_timeout().as_std(),
        }
    }
}

impl ProviderConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("RATEKEEPER_PRIMARY_URL") {
            config.primary_url = url;
        }

        if let Ok(url) = std::env::var("RATEKEEPER_FALLBACK_URL") {
            config.fallback_url = if url.is_empty() { None } else { Some(url) };
        }

        if let Ok(secs) = std::env::var("RATEKEEPER_PROVIDER_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.request_timeout = Duration::from_secs(secs);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.primary_url.is_empty() {
            return Err("Primary provider URL cannot be empty".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("Provider timeout cannot be zero".to_string());
        }

        Ok(())
    }

    /// Build the provider chain in fallback order: primary first.
    pub fn build_providers(&self) -> FxResult<Vec<Arc<dyn RateProvider>>> {
        let mut providers: Vec<Arc<dyn RateProvider>> = vec![Arc::new(OpenErApiClient::new(
            self.primary_url.clone(),
            self.request_timeout,
        )?)];

        if let Some(url) = &self.fallback_url {
            providers.push(Arc::new(FrankfurterClient::new(
                url.clone(),
                self.request_timeout,
            )?));
        }

        Ok(providers)
    }
}
