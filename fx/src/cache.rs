//! Read-through rate cache over the rate store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use ratekeeper_common::{Currency, CurrencyPair, FxResult, RateRecord, ResolvedRate, SetRateInput};
use ratekeeper_store::RateStore;
use tracing::{debug, info, instrument, warn};

type Snapshot = HashMap<CurrencyPair, RateRecord>;

const REFRESH_ATTEMPTS: usize = 3;

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Store records fetched on a miss so the next read hits.
    pub populate_on_miss: bool,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            populate_on_miss: true,
        }
    }
}

/// In-memory view of the resolved active rate per pair.
///
/// The map is held behind an `Arc` and replaced wholesale on refresh, so a
/// reader always sees either the previous or the next complete snapshot. The
/// cache never decides staleness and never outranks the store: on a miss it
/// reads through.
pub struct RateCache {
    store: Arc<RateStore>,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Bumped on every refresh or invalidation. A read-through result is only
    /// inserted if no bump happened while it was being read.
    generation: AtomicU64,
    initialized: AtomicBool,
    config: RateCacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    populations: AtomicU64,
    refreshes: AtomicU64,
}

impl RateCache {
    /// Create a cache over `store` with default configuration.
    pub fn new(store: Arc<RateStore>) -> Self {
        Self::with_config(store, RateCacheConfig::default())
    }

    /// Create a cache with custom configuration.
    pub fn with_config(store: Arc<RateStore>, config: RateCacheConfig) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Arc::new(Snapshot::new())),
            generation: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            populations: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// Warm the cache from the store.
    pub async fn init(&self) -> FxResult<usize> {
        let loaded = self.refresh_cache().await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(loaded)
    }

    /// Whether `init` has completed and `dispose` has not been called since.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Drop the snapshot. Reads keep working straight from the store until
    /// the next `init`.
    pub fn dispose(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.replace(Snapshot::new());
        info!("Rate cache disposed");
    }

    /// Rebuild the snapshot from the store's active rates and swap it in.
    ///
    /// A snapshot read while a write invalidated some pair is discarded and
    /// read again. If writes keep racing, the cache is emptied instead so
    /// reads go through to the store.
    ///
    /// Returns the number of cached pairs.
    #[instrument(skip(self))]
    pub async fn refresh_cache(&self) -> FxResult<usize> {
        for attempt in 1..=REFRESH_ATTEMPTS {
            let generation = self.generation.load(Ordering::SeqCst);
            let records = self.store.get_all_active_rates().await?;

            // Records arrive best first, so the first one per pair is the resolved one.
            let mut next = Snapshot::with_capacity(records.len());
            for record in records {
                next.entry(record.pair()).or_insert(record);
            }
            let size = next.len();

            if self.install(generation, next) {
                self.refreshes.fetch_add(1, Ordering::Relaxed);
                info!(pairs = size, attempt, "Rate cache refreshed");
                return Ok(size);
            }
            debug!(attempt, "Snapshot invalidated while loading, reloading");
        }

        warn!(attempts = REFRESH_ATTEMPTS, "Rate cache kept changing during refresh, cleared");
        self.replace(Snapshot::new());
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(0)
    }

    /// Resolve a pair, serving from the snapshot and reading through on a miss.
    pub async fn get_rate(&self, base: &Currency, quote: &Currency) -> FxResult<Option<ResolvedRate>> {
        if base == quote {
            return Ok(Some(ResolvedRate::Identity(base.clone())));
        }

        let pair = CurrencyPair::new(base.clone(), quote.clone());
        let current = self.snapshot.read().clone();
        if let Some(record) = current.get(&pair) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(pair = %pair, "Cache hit");
            return Ok(Some(ResolvedRate::Record(record.clone())));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(pair = %pair, "Cache miss");

        let generation = self.generation.load(Ordering::SeqCst);
        let resolved = self.store.get_rate(base, quote).await?;

        if let Some(ResolvedRate::Record(record)) = &resolved {
            if self.config.populate_on_miss && self.is_initialized() {
                self.populate(generation, pair, record.clone());
            }
        }

        Ok(resolved)
    }

    /// Write a rate through the store and drop the cached entry for its pair.
    pub async fn set_rate(&self, input: SetRateInput) -> FxResult<RateRecord> {
        let pair = input.pair();
        let record = self.store.set_rate(input).await?;
        self.invalidate(&pair);
        Ok(record)
    }

    /// Forget one pair so the next read goes to the store.
    pub fn invalidate(&self, pair: &CurrencyPair) {
        let mut guard = self.snapshot.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if guard.contains_key(pair) {
            Arc::make_mut(&mut guard).remove(pair);
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<HashMap<CurrencyPair, RateRecord>> {
        self.snapshot.read().clone()
    }

    /// Get the number of cached pairs.
    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            populations: self.populations.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }

    fn replace(&self, next: Snapshot) {
        let mut guard = self.snapshot.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        *guard = Arc::new(next);
    }

    /// Swap in `next` unless the snapshot changed since `observed_generation`.
    fn install(&self, observed_generation: u64, next: Snapshot) -> bool {
        let mut guard = self.snapshot.write();
        if self.generation.load(Ordering::SeqCst) != observed_generation {
            return false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *guard = Arc::new(next);
        true
    }

    fn populate(&self, observed_generation: u64, pair: CurrencyPair, record: RateRecord) {
        let mut guard = self.snapshot.write();
        if self.generation.load(Ordering::SeqCst) != observed_generation {
            debug!(pair = %pair, "Snapshot changed during read-through, not caching");
            return;
        }
        Arc::make_mut(&mut guard).insert(pair, record);
        self.populations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub populations: u64,
    pub refreshes: u64,
}

/// Shared rate cache.
pub type SharedRateCache = Arc<RateCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_common::{ProviderRate, RateMetadata, RateSource};
    use rust_decimal_macros::dec;

    async fn setup() -> (Arc<RateStore>, RateCache) {
        let store = Arc::new(RateStore::in_memory().await.unwrap());
        let cache = RateCache::new(store.clone());
        (store, cache)
    }

    #[tokio::test]
    async fn test_identity_never_touches_cache() {
        let (_, cache) = setup().await;
        let resolved = cache.get_rate(&Currency::gbp(), &Currency::gbp()).await.unwrap().unwrap();
        assert!(resolved.is_identity());
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_init_loads_active_rates() {
        let (store, cache) = setup().await;
        let usd = Currency::usd();
        store
            .batch_update_rates(
                RateSource::PrimaryApi,
                &[
                    ProviderRate::new(usd.clone(), Currency::eur(), 0.93),
                    ProviderRate::new(usd.clone(), Currency::gbp(), 0.79),
                ],
                chrono::Utc::now(),
                RateMetadata::new(),
            )
            .await
            .unwrap();

        assert_eq!(cache.init().await.unwrap(), 2);
        assert!(cache.is_initialized());

        let eur = cache.get_rate(&usd, &Currency::eur()).await.unwrap().unwrap();
        assert_eq!(eur.rate(), dec!(0.93));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_miss_reads_through_and_populates() {
        let (store, cache) = setup().await;
        cache.init().await.unwrap();
        assert!(cache.is_empty());

        store
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::jpy(), 148.5))
            .await
            .unwrap();

        let first = cache.get_rate(&Currency::usd(), &Currency::jpy()).await.unwrap().unwrap();
        assert_eq!(first.rate(), dec!(148.5));
        assert_eq!(cache.len(), 1);

        cache.get_rate(&Currency::usd(), &Currency::jpy()).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.populations, 1);
    }

    #[tokio::test]
    async fn test_absent_pair_is_none_and_not_cached() {
        let (_, cache) = setup().await;
        cache.init().await.unwrap();
        assert!(cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let (store, cache) = setup().await;
        store
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.90))
            .await
            .unwrap();
        cache.init().await.unwrap();
        let before = cache.snapshot();

        store
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.95))
            .await
            .unwrap();
        store
            .set_rate(SetRateInput::manual(Currency::eur(), Currency::gbp(), 0.86))
            .await
            .unwrap();
        cache.refresh_cache().await.unwrap();

        let pair = CurrencyPair::new(Currency::usd(), Currency::eur());
        assert_eq!(before.len(), 1);
        assert_eq!(before[&pair].rate, dec!(0.90));
        assert_eq!(cache.snapshot()[&pair].rate, dec!(0.95));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_set_rate_invalidates_pair() {
        let (_, cache) = setup().await;
        cache
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.90))
            .await
            .unwrap();
        cache.init().await.unwrap();
        assert_eq!(cache.len(), 1);

        cache
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.97))
            .await
            .unwrap();
        assert!(cache.is_empty());

        let resolved = cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap().unwrap();
        assert_eq!(resolved.rate(), dec!(0.97));
    }

    #[tokio::test]
    async fn test_dispose_falls_back_to_store() {
        let (store, cache) = setup().await;
        store
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.93))
            .await
            .unwrap();
        cache.init().await.unwrap();

        cache.dispose();
        assert!(!cache.is_initialized());
        assert!(cache.is_empty());

        let resolved = cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap();
        assert!(resolved.is_some());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_populate_skipped_after_generation_change() {
        let (store, cache) = setup().await;
        let record = store
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.93))
            .await
            .unwrap();
        cache.init().await.unwrap();
        cache.invalidate(&record.pair());

        let stale_generation = cache.generation.load(Ordering::SeqCst) - 1;
        cache.populate(stale_generation, record.pair(), record);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_loaded_before_write_is_not_installed() {
        let (store, cache) = setup().await;
        cache
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.90))
            .await
            .unwrap();
        cache.init().await.unwrap();

        // A refresh reads the old rate, then a write lands before the swap.
        let observed = cache.generation.load(Ordering::SeqCst);
        let mut loaded = Snapshot::new();
        for record in store.get_all_active_rates().await.unwrap() {
            loaded.entry(record.pair()).or_insert(record);
        }
        cache
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.97))
            .await
            .unwrap();

        assert!(!cache.install(observed, loaded));
        let resolved = cache.get_rate(&Currency::usd(), &Currency::eur()).await.unwrap().unwrap();
        assert_eq!(resolved.rate(), dec!(0.97));

        assert_eq!(cache.refresh_cache().await.unwrap(), 1);
        let pair = CurrencyPair::new(Currency::usd(), Currency::eur());
        assert_eq!(cache.snapshot()[&pair].rate, dec!(0.97));
    }
}
