//! Staleness-driven refresh orchestration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use ratekeeper_common::{
    now, FxError, FxResult, ProviderFailure, RateMetadata, RateSource, StalenessInfo,
};
use ratekeeper_fx::{RateCache, RateProvider};
use ratekeeper_store::RateStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityProbe;
use crate::metrics::{SharedSyncMetrics, SyncMetrics, SyncMetricsSnapshot};
use crate::state::{SyncPhase, Trigger};

/// A refresh that persisted a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Provider that served the batch.
    pub provider: String,
    pub source: RateSource,
    /// Records written.
    pub persisted: usize,
    pub fetched_at: DateTime<Utc>,
    /// The first provider failed and a later one answered.
    pub used_fallback: bool,
}

/// How a background staleness check ended. Errors are carried, never raised.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// Nothing to do.
    Fresh(StalenessInfo),
    /// Rates were stale and have been refreshed.
    Refreshed(RefreshOutcome),
    /// Rates were stale but the host is offline.
    SkippedOffline,
    /// Another cycle held the gate.
    AlreadyRunning,
    /// The cycle failed. Logged and absorbed.
    Failed(FxError),
}

/// Last-known sync status.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    /// Staleness from the most recent successful evaluation.
    pub staleness: Option<StalenessInfo>,
    /// When staleness was last evaluated.
    pub last_checked: Option<DateTime<Utc>>,
    pub last_refresh: Option<RefreshOutcome>,
    /// Error of the most recent cycle, cleared by the next success.
    pub last_error: Option<FxError>,
}

struct Driver {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Keeps the store and cache in step with the rate providers.
///
/// At most one cycle runs at a time. A background check that finds the gate
/// taken returns immediately; a manual refresh waits for the running cycle and
/// reuses its result when that cycle refreshed successfully.
pub struct SyncOrchestrator {
    config: SyncConfig,
    store: Arc<RateStore>,
    cache: Arc<RateCache>,
    /// In fallback order.
    providers: Vec<Arc<dyn RateProvider>>,
    connectivity: Arc<dyn ConnectivityProbe>,
    phase: RwLock<SyncPhase>,
    status: RwLock<SyncStatus>,
    cycle_gate: tokio::sync::Mutex<()>,
    /// Bumped after every successful refresh.
    refresh_generation: AtomicU64,
    metrics: SharedSyncMetrics,
    driver: Mutex<Option<Driver>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator over already constructed components.
    pub fn new(
        config: SyncConfig,
        store: Arc<RateStore>,
        cache: Arc<RateCache>,
        providers: Vec<Arc<dyn RateProvider>>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            providers,
            connectivity,
            phase: RwLock::new(SyncPhase::Idle),
            status: RwLock::new(SyncStatus::default()),
            cycle_gate: tokio::sync::Mutex::new(()),
            refresh_generation: AtomicU64::new(0),
            metrics: Arc::new(SyncMetrics::new()),
            driver: Mutex::new(None),
        }
    }

    /// Open the store, warm the cache and build the provider chain.
    #[instrument(skip(config, connectivity))]
    pub async fn bootstrap(
        config: SyncConfig,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> FxResult<Self> {
        config.validate().map_err(FxError::Configuration)?;

        let store = Arc::new(RateStore::connect(config.store.clone()).await?);
        let cache = Arc::new(RateCache::new(store.clone()));
        let cached = cache.init().await?;
        let providers = config.providers.build_providers()?;

        info!(
            base = %config.base_currency,
            cached_pairs = cached,
            providers = providers.len(),
            "Sync orchestrator ready"
        );

        Ok(Self::new(config, store, cache, providers, connectivity))
    }

    /// Background staleness check.
    ///
    /// Refreshes when there are no active rates or any automated rate has
    /// aged past the freshness window. Never returns an error: failures are
    /// logged and reported through [`CheckOutcome::Failed`].
    #[instrument(skip(self))]
    pub async fn check_staleness(&self) -> CheckOutcome {
        let Ok(_cycle) = self.cycle_gate.try_lock() else {
            debug!("Refresh cycle already in flight, skipping check");
            self.metrics.skipped_busy();
            return CheckOutcome::AlreadyRunning;
        };
        self.metrics.cycle_started();

        self.set_phase(SyncPhase::CheckingStaleness);
        let staleness = match self.evaluate_staleness().await {
            Ok(staleness) => staleness,
            Err(e) => {
                self.cycle_failed(Trigger::Background, &e);
                return CheckOutcome::Failed(e);
            }
        };

        if !staleness.needs_refresh() {
            debug!(total = staleness.total_rates, "Rates are fresh");
            self.metrics.cycle_fresh();
            self.set_phase(SyncPhase::Idle);
            return CheckOutcome::Fresh(staleness);
        }

        info!(
            total = staleness.total_rates,
            stale = staleness.stale_rates,
            "Rates are stale"
        );

        self.set_phase(SyncPhase::AwaitingNetwork);
        let connectivity = self.connectivity.connectivity().await;
        if !connectivity.allows_attempt() {
            info!("Offline, skipping background refresh");
            self.metrics.skipped_offline();
            self.set_phase(SyncPhase::Idle);
            return CheckOutcome::SkippedOffline;
        }

        match self.run_refresh(Trigger::Background).await {
            Ok(outcome) => CheckOutcome::Refreshed(outcome),
            Err(e) => CheckOutcome::Failed(e),
        }
    }

    /// Manual refresh.
    ///
    /// Always fetches, regardless of staleness. Fails with
    /// [`FxError::Offline`] when the host is known to be offline and with
    /// [`FxError::AllProvidersFailed`] when no provider could serve a batch.
    #[instrument(skip(self))]
    pub async fn refresh_now(&self) -> FxResult<RefreshOutcome> {
        let seen = self.refresh_generation.load(Ordering::SeqCst);

        let _cycle = match self.cycle_gate.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Refresh cycle in flight, waiting for it");
                let guard = self.cycle_gate.lock().await;

                if self.refresh_generation.load(Ordering::SeqCst) != seen {
                    let joined = self.status.read().last_refresh.clone();
                    if let Some(outcome) = joined {
                        debug!(provider = %outcome.provider, "Joined in-flight refresh");
                        self.metrics.joined_in_flight();
                        return Ok(outcome);
                    }
                }
                guard
            }
        };
        self.metrics.cycle_started();

        self.set_phase(SyncPhase::AwaitingNetwork);
        let connectivity = self.connectivity.connectivity().await;
        if !connectivity.allows_attempt() {
            let e = FxError::Offline;
            self.cycle_failed(Trigger::Manual, &e);
            return Err(e);
        }

        self.run_refresh(Trigger::Manual).await
    }

    /// Whole days since the oldest active observation, as of the last check.
    pub fn days_old(&self) -> Option<i64> {
        self.status
            .read()
            .staleness
            .and_then(|staleness| staleness.days_old(now()))
    }

    /// Whether the last check found rates in need of a refresh.
    ///
    /// `false` until the first check completes.
    pub fn is_stale(&self) -> bool {
        self.status
            .read()
            .staleness
            .map_or(false, |staleness| staleness.needs_refresh())
    }

    /// When staleness was last evaluated.
    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.status.read().last_checked
    }

    /// Get the current cycle phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Spawn the periodic staleness check. The first check runs immediately.
    pub fn start(self: &Arc<Self>) {
        let mut driver = self.driver.lock();
        if driver.is_some() {
            warn!("Background driver already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let orchestrator = Arc::clone(self);
        let interval = self.config.check_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        orchestrator.check_staleness().await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        *driver = Some(Driver {
            shutdown_tx,
            handle,
        });
        info!(interval_secs = interval.as_secs(), "Background driver started");
    }

    /// Stop the periodic check, letting a running cycle finish.
    pub async fn stop(&self) {
        let driver = self.driver.lock().take();
        let Some(Driver {
            shutdown_tx,
            handle,
        }) = driver
        else {
            return;
        };

        let _ = shutdown_tx.send(()).await;
        if let Err(e) = handle.await {
            error!(error = %e, "Background driver ended abnormally");
        }
        info!("Background driver stopped");
    }

    /// Check if the periodic driver is running.
    pub fn is_running(&self) -> bool {
        self.driver.lock().is_some()
    }

    // --- Private methods ---

    fn set_phase(&self, phase: SyncPhase) {
        let previous = std::mem::replace(&mut *self.phase.write(), phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "Sync phase");
        }
    }

    async fn evaluate_staleness(&self) -> FxResult<StalenessInfo> {
        let staleness = self.store.get_staleness_info().await?;

        let mut status = self.status.write();
        status.staleness = Some(staleness);
        status.last_checked = Some(now());

        Ok(staleness)
    }

    async fn run_refresh(&self, trigger: Trigger) -> FxResult<RefreshOutcome> {
        let result = self.fetch_and_persist(trigger).await;

        match &result {
            Ok(outcome) => {
                if let Err(e) = self.evaluate_staleness().await {
                    warn!(error = %e, "Could not re-evaluate staleness after refresh");
                }
                self.cycle_succeeded(trigger, outcome);
            }
            Err(e) => self.cycle_failed(trigger, e),
        }

        result
    }

    /// Try each provider in order until one yields a persisted batch.
    async fn fetch_and_persist(&self, trigger: Trigger) -> FxResult<RefreshOutcome> {
        let base = &self.config.base_currency;
        let targets = self.config.targets();
        let timeout = self.config.providers.request_timeout;
        let mut failures = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            let name = provider.name();

            self.set_phase(SyncPhase::Fetching);
            let fetched = match provider.fetch_latest_rates(base, targets, Some(timeout)).await {
                Ok(rates) if rates.is_empty() => Err(FxError::InvalidResponse {
                    provider: name.to_string(),
                    message: format!("no usable rates for base {base}"),
                }),
                other => other,
            };

            let rates = match fetched {
                Ok(rates) => rates,
                Err(e) => {
                    warn!(provider = name, error = %e, "Provider failed");
                    self.metrics.provider_failed();
                    failures.push(ProviderFailure::new(name, e));
                    continue;
                }
            };

            self.set_phase(SyncPhase::Persisting);
            let fetched_at = now();
            let persisted = self
                .store
                .batch_update_rates(
                    provider.source(),
                    &rates,
                    fetched_at,
                    self.batch_metadata(name, trigger),
                )
                .await?;

            if persisted == 0 {
                let e = FxError::InvalidResponse {
                    provider: name.to_string(),
                    message: format!("none of {} rates were valid", rates.len()),
                };
                warn!(provider = name, error = %e, "Provider failed");
                self.metrics.provider_failed();
                failures.push(ProviderFailure::new(name, e));
                continue;
            }

            self.set_phase(SyncPhase::RefreshingCache);
            self.cache.refresh_cache().await?;

            return Ok(RefreshOutcome {
                provider: name.to_string(),
                source: provider.source(),
                persisted,
                fetched_at,
                used_fallback: index > 0,
            });
        }

        Err(FxError::AllProvidersFailed(failures))
    }

    fn batch_metadata(&self, provider: &str, trigger: Trigger) -> RateMetadata {
        let mut metadata = RateMetadata::new();
        metadata.insert("provider".to_string(), provider.into());
        metadata.insert("base".to_string(), self.config.base_currency.code().into());
        metadata.insert("trigger".to_string(), trigger.as_str().into());
        metadata
    }

    fn cycle_succeeded(&self, trigger: Trigger, outcome: &RefreshOutcome) {
        self.metrics
            .cycle_refreshed(outcome.persisted, outcome.used_fallback);
        {
            let mut status = self.status.write();
            status.last_refresh = Some(outcome.clone());
            status.last_error = None;
        }
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        self.set_phase(SyncPhase::Idle);

        info!(
            %trigger,
            provider = %outcome.provider,
            persisted = outcome.persisted,
            used_fallback = outcome.used_fallback,
            "Rates refreshed"
        );
    }

    fn cycle_failed(&self, trigger: Trigger, e: &FxError) {
        self.metrics.cycle_failed();
        self.status.write().last_error = Some(e.clone());
        self.set_phase(SyncPhase::Idle);

        match trigger {
            Trigger::Background => {
                warn!(%trigger, code = e.error_code(), error = %e, "Refresh failed, keeping last-known rates")
            }
            Trigger::Manual => {
                error!(%trigger, code = e.error_code(), error = %e, "Refresh failed")
            }
        }
    }
}

/// Shared orchestrator.
pub type SharedSyncOrchestrator = Arc<SyncOrchestrator>;
