//! Rate provider trait and test double.

use std::time::Duration;

use async_trait::async_trait;
use ratekeeper_common::{Currency, CurrencyPair, FxError, FxResult, ProviderRate, RateSource};

/// Adapter for one external rate source.
///
/// Implementations normalize the source's payload into [`ProviderRate`]s and
/// map its failure modes onto the shared error taxonomy:
/// timeouts are [`FxError::Timeout`], provider-reported failures are
/// [`FxError::ProviderError`], malformed payloads are
/// [`FxError::InvalidResponse`].
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Source tag persisted with rates from this provider.
    fn source(&self) -> RateSource;

    /// Latest rates from `base` to every currency the provider knows, or only
    /// to `targets` when given. The `base/base` pair is never included.
    ///
    /// `timeout` overrides the client's default request deadline.
    async fn fetch_latest_rates(
        &self,
        base: &Currency,
        targets: Option<&[Currency]>,
        timeout: Option<Duration>,
    ) -> FxResult<Vec<ProviderRate>>;

    /// Rate for a single pair. Fails with [`FxError::RateNotFound`] when the
    /// provider's answer does not include `quote`.
    async fn fetch_rate(&self, base: &Currency, quote: &Currency) -> FxResult<ProviderRate> {
        if base == quote {
            return Ok(ProviderRate::new(base.clone(), quote.clone(), 1.0));
        }

        let targets = std::slice::from_ref(quote);
        self.fetch_latest_rates(base, Some(targets), None)
            .await?
            .into_iter()
            .find(|rate| &rate.quote == quote)
            .ok_or_else(|| FxError::RateNotFound(CurrencyPair::new(base.clone(), quote.clone())))
    }

    /// Whether the provider currently answers. Never fails.
    async fn check_availability(&self) -> bool;
}

/// Keep the provider's answer to the requested targets, dropping the self-rate.
pub(crate) fn select_rates(
    base: &Currency,
    targets: Option<&[Currency]>,
    rates: impl IntoIterator<Item = (String, f64)>,
) -> Vec<ProviderRate> {
    rates
        .into_iter()
        .map(|(code, rate)| (Currency::new(code), rate))
        .filter(|(quote, _)| quote != base)
        .filter(|(quote, _)| targets.map_or(true, |wanted| wanted.contains(quote)))
        .map(|(quote, rate)| ProviderRate::new(base.clone(), quote, rate))
        .collect()
}

/// Scripted provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    source: RateSource,
    rates: dashmap::DashMap<Currency, Vec<(Currency, f64)>>,
    failure: parking_lot::RwLock<Option<FxError>>,
    delay: parking_lot::RwLock<Option<Duration>>,
    available: std::sync::atomic::AtomicBool,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>, source: RateSource) -> Self {
        Self {
            name: name.into(),
            source,
            rates: dashmap::DashMap::new(),
            failure: parking_lot::RwLock::new(None),
            delay: parking_lot::RwLock::new(None),
            available: std::sync::atomic::AtomicBool::new(true),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set a rate returned for `base`.
    pub fn set_rate(&self, base: &str, quote: &str, rate: f64) {
        let mut entry = self.rates.entry(Currency::new(base)).or_default();
        entry.retain(|(q, _)| q.code() != quote);
        entry.push((Currency::new(quote), rate));
    }

    /// Make every fetch fail with `error` until cleared.
    pub fn fail_with(&self, error: FxError) {
        *self.failure.write() = Some(error);
    }

    /// Stop failing.
    pub fn clear_failure(&self) {
        *self.failure.write() = None;
    }

    /// Delay every fetch by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }

    pub fn set_available(&self, available: bool) {
        self.available
            .store(available, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of `fetch_latest_rates` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> RateSource {
        self.source
    }

    async fn fetch_latest_rates(
        &self,
        base: &Currency,
        targets: Option<&[Currency]>,
        timeout: Option<Duration>,
    ) -> FxResult<Vec<ProviderRate>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            match timeout {
                Some(limit) if limit < delay => {
                    tokio::time::sleep(limit).await;
                    return Err(FxError::Timeout {
                        provider: self.name.clone(),
                        after: limit,
                    });
                }
                _ => tokio::time::sleep(delay).await,
            }
        }

        let failure = self.failure.read().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let rates = self
            .rates
            .get(base)
            .map(|r| r.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|(quote, rate)| (quote.code().to_string(), rate));

        Ok(select_rates(base, targets, rates))
    }

    async fn check_availability(&self) -> bool {
        self.available.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_rates_excludes_base_and_filters_targets() {
        let usd = Currency::usd();
        let raw = vec![
            ("USD".to_string(), 1.0),
            ("EUR".to_string(), 0.93),
            ("GBP".to_string(), 0.79),
        ];

        let all = select_rates(&usd, None, raw.clone());
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.quote != usd));

        let targets = [Currency::gbp()];
        let some = select_rates(&usd, Some(&targets), raw);
        assert_eq!(some, vec![ProviderRate::new(usd, Currency::gbp(), 0.79)]);
    }

    #[tokio::test]
    async fn test_mock_provider_fetch_rate() {
        let provider = MockRateProvider::new("mock", RateSource::PrimaryApi);
        provider.set_rate("USD", "EUR", 0.93);

        let rate = provider.fetch_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert_eq!(rate.rate, 0.93);

        let missing = provider.fetch_rate(&Currency::usd(), &Currency::jpy()).await;
        assert!(matches!(missing, Err(FxError::RateNotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_rate_identity_skips_provider() {
        let provider = MockRateProvider::new("mock", RateSource::PrimaryApi);
        let rate = provider.fetch_rate(&Currency::eur(), &Currency::eur()).await.unwrap();
        assert_eq!(rate.rate, 1.0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_mock_provider_delay_respects_timeout() {
        let provider = MockRateProvider::new("slow", RateSource::PrimaryApi);
        provider.set_rate("USD", "EUR", 0.93);
        provider.set_delay(Duration::from_millis(200));

        let result = provider
            .fetch_latest_rates(&Currency::usd(), None, Some(Duration::from_millis(10)))
            .await;

        assert!(matches!(result, Err(FxError::Timeout { .. })));
    }
}
