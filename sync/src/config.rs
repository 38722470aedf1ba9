//! Orchestrator configuration.

use std::time::Duration;

use ratekeeper_common::{constants, Currency, DurationExt};
use ratekeeper_fx::ProviderConfig;
use ratekeeper_store::StoreConfig;

/// Main sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Currency every provider request is anchored on.
    pub base_currency: Currency,
    /// Quote currencies to keep. Empty means everything the provider returns.
    pub target_currencies: Vec<Currency>,
    /// Interval between background staleness checks.
    pub check_interval: Duration,
    /// Rate store configuration.
    pub store: StoreConfig,
    /// Provider client configuration.
    pub providers: ProviderConfig,
    /// Log level.
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::usd(),
            target_currencies: Vec::new(),
            check_interval: constants::default_check_interval().as_std(),
            store: StoreConfig::default(),
            providers: ProviderConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            store: StoreConfig::from_env(),
            providers: ProviderConfig::from_env(),
            ..Self::default()
        };

        if let Ok(code) = std::env::var("RATEKEEPER_BASE_CURRENCY") {
            config.base_currency = Currency::new(code);
        }

        if let Ok(list) = std::env::var("RATEKEEPER_TARGET_CURRENCIES") {
            config.target_currencies = parse_currency_list(&list);
        }

        if let Ok(secs) = std::env::var("RATEKEEPER_CHECK_INTERVAL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.check_interval = Duration::from_secs(secs);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Targets as the provider clients expect them.
    pub fn targets(&self) -> Option<&[Currency]> {
        if self.target_currencies.is_empty() {
            None
        } else {
            Some(&self.target_currencies)
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_currency.is_valid() {
            return Err(format!("Invalid base currency '{}'", self.base_currency));
        }

        if let Some(bad) = self.target_currencies.iter().find(|c| !c.is_valid()) {
            return Err(format!("Invalid target currency '{bad}'"));
        }

        if self.target_currencies.contains(&self.base_currency) {
            return Err("Base currency cannot also be a target".to_string());
        }

        if self.check_interval.is_zero() {
            return Err("Check interval cannot be zero".to_string());
        }

        self.store.validate()?;
        self.providers.validate()?;

        Ok(())
    }
}

fn parse_currency_list(list: &str) -> Vec<Currency> {
    list.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(Currency::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.check_interval, Duration::from_secs(3600));
        assert!(config.targets().is_none());
    }

    #[test]
    fn test_parse_currency_list() {
        let parsed = parse_currency_list(" eur, GBP,,jpy ");
        assert_eq!(parsed, vec![Currency::eur(), Currency::gbp(), Currency::jpy()]);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = SyncConfig::default();
        config.target_currencies = vec![Currency::usd()];
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.base_currency = Currency::new("DOLLARS");
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
