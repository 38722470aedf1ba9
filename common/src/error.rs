//! Error types for the FX rate subsystem.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::{Currency, CurrencyPair, RateId};

/// Errors raised by the rate store, provider clients and sync orchestrator.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Rate is zero, negative, NaN or infinite.
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Currency code is not three ASCII letters.
    #[error("Invalid currency code: '{0}'")]
    InvalidCurrency(String),

    /// Base and quote are the same currency; identity rates are never stored.
    #[error("Refusing to store identity pair {0}/{0}")]
    SameCurrencyPair(Currency),

    /// Provider answered but reported a failure of its own.
    #[error("Provider {provider} reported an error: {message}")]
    ProviderError { provider: String, message: String },

    /// Provider answered with a payload missing expected fields.
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Request exceeded its deadline and was cancelled.
    #[error("Request to {provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    /// Provider has no rate for the requested pair.
    #[error("Rate not found for {0}")]
    RateNotFound(CurrencyPair),

    /// Transport failed before a response was received.
    #[error("Network error talking to {provider}: {message}")]
    Network { provider: String, message: String },

    /// Connectivity source reports no connection.
    #[error("No network connection")]
    Offline,

    /// Every configured provider failed during one refresh cycle.
    #[error("All rate providers failed: {}", describe_failures(.0))]
    AllProvidersFailed(Vec<ProviderFailure>),

    /// Underlying database failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No record with the given identifier.
    #[error("Rate record not found: {0}")]
    RecordNotFound(RateId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    /// Whether a different provider (or a later cycle) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FxError::ProviderError { .. } | FxError::Timeout { .. } | FxError::Network { .. }
        )
    }

    /// Stable code for logs and CLI output.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::InvalidRate(_) => "INVALID_RATE",
            FxError::InvalidCurrency(_) => "INVALID_CURRENCY",
            FxError::SameCurrencyPair(_) => "SAME_CURRENCY_PAIR",
            FxError::ProviderError { .. } => "PROVIDER_ERROR",
            FxError::InvalidResponse { .. } => "INVALID_RESPONSE",
            FxError::Timeout { .. } => "TIMEOUT",
            FxError::RateNotFound(_) => "RATE_NOT_FOUND",
            FxError::Network { .. } => "NETWORK_ERROR",
            FxError::Offline => "OFFLINE",
            FxError::AllProvidersFailed(_) => "ALL_PROVIDERS_FAILED",
            FxError::Storage(_) => "STORAGE_ERROR",
            FxError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            FxError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// One provider's failure inside an aggregated refresh error.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: Box<FxError>,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, error: FxError) -> Self {
        Self {
            provider: provider.into(),
            error: Box::new(error),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.error)
    }
}

fn describe_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(ProviderFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = FxError::Timeout {
            provider: "primary".into(),
            after: Duration::from_secs(3),
        };
        assert!(timeout.is_retryable());
        assert!(!FxError::InvalidRate("0".into()).is_retryable());
        assert!(!FxError::InvalidResponse {
            provider: "primary".into(),
            message: "missing rates".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_aggregated_message_lists_each_provider() {
        let err = FxError::AllProvidersFailed(vec![
            ProviderFailure::new("open-er-api", FxError::Offline),
            ProviderFailure::new(
                "frankfurter",
                FxError::ProviderError {
                    provider: "frankfurter".into(),
                    message: "not found".into(),
                },
            ),
        ]);
        let text = err.to_string();
        assert!(text.contains("open-er-api"));
        assert!(text.contains("frankfurter"));
        assert_eq!(err.error_code(), "ALL_PROVIDERS_FAILED");
    }
}
