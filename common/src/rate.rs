//! Rate records, sources and derived staleness information.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::currency::{Currency, CurrencyPair};
use crate::error::{FxError, FxResult};
use crate::identifiers::RateId;

/// Priority given to manual overrides unless the caller picks one.
pub const MANUAL_PRIORITY: i32 = 100;

/// Priority given to automatically fetched rates unless the caller picks one.
pub const AUTOMATED_PRIORITY: i32 = 50;

/// Free-form annotations attached to a rate record.
pub type RateMetadata = BTreeMap<String, serde_json::Value>;

/// Where a rate observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateSource {
    /// The primary HTTP rate API.
    PrimaryApi,
    /// The secondary HTTP rate API used when the primary fails.
    FallbackApi,
    /// A user-entered override.
    Manual,
}

impl RateSource {
    /// Stable wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::PrimaryApi => "primary-api",
            RateSource::FallbackApi => "fallback-api",
            RateSource::Manual => "manual",
        }
    }

    /// Priority used when a write does not specify one.
    pub fn default_priority(&self) -> i32 {
        match self {
            RateSource::Manual => MANUAL_PRIORITY,
            RateSource::PrimaryApi | RateSource::FallbackApi => AUTOMATED_PRIORITY,
        }
    }

    /// Manual rates never age out and are excluded from staleness counts.
    pub fn is_manual(&self) -> bool {
        matches!(self, RateSource::Manual)
    }
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateSource {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary-api" => Ok(RateSource::PrimaryApi),
            "fallback-api" => Ok(RateSource::FallbackApi),
            "manual" => Ok(RateSource::Manual),
            other => Err(FxError::Storage(format!("unknown rate source '{other}'"))),
        }
    }
}

/// One immutable observation of an exchange rate.
///
/// Value fields never change after insertion. The only transition is
/// `is_archived` flipping from `false` to `true` when a newer record for the
/// same pair supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub id: RateId,
    pub base: Currency,
    pub quote: Currency,
    /// Units of `quote` for one unit of `base`.
    pub rate: Decimal,
    pub source: RateSource,
    /// When the rate was observed.
    pub fetched_at: DateTime<Utc>,
    /// Higher wins during resolution.
    pub priority: i32,
    pub metadata: RateMetadata,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateRecord {
    /// Get the currency pair of this record.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.quote.clone())
    }

    /// Whether the record takes part in resolution.
    pub fn is_active(&self) -> bool {
        !self.is_archived
    }
}

/// Request to write a new rate for a pair.
#[derive(Debug, Clone)]
pub struct SetRateInput {
    pub base: Currency,
    pub quote: Currency,
    /// Raw rate as received; validated before any write.
    pub rate: f64,
    pub source: RateSource,
    /// Defaults to the time of the write.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Defaults to the source's priority tier.
    pub priority: Option<i32>,
    pub metadata: RateMetadata,
}

impl SetRateInput {
    /// Create a new input with default priority and timestamp.
    pub fn new(base: Currency, quote: Currency, rate: f64, source: RateSource) -> Self {
        Self {
            base,
            quote,
            rate,
            source,
            fetched_at: None,
            priority: None,
            metadata: RateMetadata::new(),
        }
    }

    /// Shorthand for a user override.
    pub fn manual(base: Currency, quote: Currency, rate: f64) -> Self {
        Self::new(base, quote, rate, RateSource::Manual)
    }

    /// Override the priority tier.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the observation time.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: RateMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the currency pair of this input.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.quote.clone())
    }

    /// Effective priority for this write.
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or_else(|| self.source.default_priority())
    }
}

/// A normalized rate as returned by a provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRate {
    pub base: Currency,
    pub quote: Currency,
    pub rate: f64,
}

impl ProviderRate {
    /// Create a new provider rate.
    pub fn new(base: Currency, quote: Currency, rate: f64) -> Self {
        Self { base, quote, rate }
    }

    /// Get the currency pair of this rate.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base.clone(), self.quote.clone())
    }
}

/// Outcome of resolving a pair: either a stored record or the implicit
/// identity rate for `base == quote`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRate {
    Identity(Currency),
    Record(RateRecord),
}

impl ResolvedRate {
    /// The conversion rate.
    pub fn rate(&self) -> Decimal {
        match self {
            ResolvedRate::Identity(_) => Decimal::ONE,
            ResolvedRate::Record(record) => record.rate,
        }
    }

    /// The resolved pair.
    pub fn pair(&self) -> CurrencyPair {
        match self {
            ResolvedRate::Identity(currency) => CurrencyPair::new(currency.clone(), currency.clone()),
            ResolvedRate::Record(record) => record.pair(),
        }
    }

    /// The backing record, if any.
    pub fn record(&self) -> Option<&RateRecord> {
        match self {
            ResolvedRate::Identity(_) => None,
            ResolvedRate::Record(record) => Some(record),
        }
    }

    /// Consume into the backing record, if any.
    pub fn into_record(self) -> Option<RateRecord> {
        match self {
            ResolvedRate::Identity(_) => None,
            ResolvedRate::Record(record) => Some(record),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ResolvedRate::Identity(_))
    }
}

/// Summary of how current the active rates are. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessInfo {
    /// Active records of any source.
    pub total_rates: u64,
    /// Active non-manual records at least one freshness window old.
    pub stale_rates: u64,
    /// Oldest observation among all active records, manual included.
    pub oldest_fetched_at: Option<DateTime<Utc>>,
}

impl StalenessInfo {
    /// An empty store needs a fetch just as much as an outdated one.
    pub fn needs_refresh(&self) -> bool {
        self.total_rates == 0 || self.stale_rates > 0
    }

    /// Whole days since the oldest active observation.
    pub fn days_old(&self, now: DateTime<Utc>) -> Option<i64> {
        self.oldest_fetched_at
            .map(|oldest| now.signed_duration_since(oldest).num_days().max(0))
    }
}

/// Validate a raw rate and convert it to a decimal.
///
/// Rejects NaN, infinities, zero and negatives. Positive rates are stored as
/// `Decimal`, so values above `Decimal::MAX` (about 7.9e28) or below its
/// smallest positive step (1e-28) are rejected as well.
pub fn validate_rate(rate: f64) -> FxResult<Decimal> {
    if !rate.is_finite() {
        return Err(FxError::InvalidRate(format!("rate {rate} is not finite")));
    }
    if rate <= 0.0 {
        return Err(FxError::InvalidRate(format!("rate {rate} must be positive")));
    }
    match Decimal::from_f64(rate) {
        Some(value) if value > Decimal::ZERO => Ok(value.normalize()),
        _ if rate >= 1.0 => Err(FxError::InvalidRate(format!(
            "rate {rate} exceeds the largest storable rate"
        ))),
        _ => Err(FxError::InvalidRate(format!(
            "rate {rate} is below the smallest storable rate"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_rate() {
        assert_eq!(validate_rate(0.93).unwrap(), dec!(0.93));
        assert_eq!(validate_rate(150.0).unwrap(), dec!(150));
        assert!(matches!(validate_rate(0.0), Err(FxError::InvalidRate(_))));
        assert!(matches!(validate_rate(-1.2), Err(FxError::InvalidRate(_))));
        assert!(matches!(validate_rate(f64::NAN), Err(FxError::InvalidRate(_))));
        assert!(matches!(validate_rate(f64::INFINITY), Err(FxError::InvalidRate(_))));
    }

    #[test]
    fn test_validate_rate_outside_decimal_range() {
        match validate_rate(1e30) {
            Err(FxError::InvalidRate(msg)) => assert!(msg.contains("largest storable")),
            other => panic!("unexpected {other:?}"),
        }
        match validate_rate(1e-30) {
            Err(FxError::InvalidRate(msg)) => assert!(msg.contains("smallest storable")),
            other => panic!("unexpected {other:?}"),
        }

        assert!(validate_rate(1e20).is_ok());
        assert!(validate_rate(1e-12).unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_source_priorities() {
        assert_eq!(RateSource::Manual.default_priority(), MANUAL_PRIORITY);
        assert_eq!(RateSource::PrimaryApi.default_priority(), AUTOMATED_PRIORITY);
        assert!(RateSource::Manual.default_priority() > RateSource::FallbackApi.default_priority());
    }

    #[test]
    fn test_source_names_roundtrip() {
        for source in [RateSource::PrimaryApi, RateSource::FallbackApi, RateSource::Manual] {
            assert_eq!(source.as_str().parse::<RateSource>().unwrap(), source);
        }
        assert!("carrier-pigeon".parse::<RateSource>().is_err());
    }

    #[test]
    fn test_input_effective_priority() {
        let input = SetRateInput::manual(Currency::usd(), Currency::eur(), 0.9);
        assert_eq!(input.effective_priority(), MANUAL_PRIORITY);
        assert_eq!(input.with_priority(7).effective_priority(), 7);
    }

    #[test]
    fn test_identity_resolution() {
        let resolved = ResolvedRate::Identity(Currency::jpy());
        assert_eq!(resolved.rate(), Decimal::ONE);
        assert!(resolved.pair().is_identity());
        assert!(resolved.record().is_none());
    }

    #[test]
    fn test_staleness_days_old() {
        let now = Utc::now();
        let info = StalenessInfo {
            total_rates: 2,
            stale_rates: 1,
            oldest_fetched_at: Some(now - Duration::hours(50)),
        };
        assert_eq!(info.days_old(now), Some(2));
        assert!(info.needs_refresh());

        let empty = StalenessInfo {
            total_rates: 0,
            stale_rates: 0,
            oldest_fetched_at: None,
        };
        assert_eq!(empty.days_old(now), None);
        assert!(empty.needs_refresh());
    }
}
