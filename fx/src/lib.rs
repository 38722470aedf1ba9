//! Ratekeeper FX
//!
//! Rate provider clients and the read-through rate cache.
//!
//! # Features
//!
//! - Primary (open.er-api.com) and fallback (Frankfurter) HTTP clients
//!   behind one [`RateProvider`] trait
//! - Per-request deadlines that cancel the in-flight request
//! - Snapshot cache over the rate store with atomic swap on refresh
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratekeeper_fx::{ProviderConfig, RateCache};
//! use ratekeeper_store::RateStore;
//! use ratekeeper_common::Currency;
//!
//! let store = Arc::new(RateStore::in_memory().await?);
//! let cache = RateCache::new(store.clone());
//! cache.init().await?;
//!
//! let providers = ProviderConfig::default().build_providers()?;
//! let rates = providers[0].fetch_latest_rates(&Currency::usd(), None, None).await?;
//! store.batch_update_rates(providers[0].source(), &rates, chrono::Utc::now(), Default::default()).await?;
//! cache.refresh_cache().await?;
//!
//! let eur = cache.get_rate(&Currency::usd(), &Currency::eur()).await?;
//! ```

pub mod cache;
pub mod config;
pub mod frankfurter;
mod http;
pub mod open_er;
pub mod provider;

pub use cache::{CacheStats, RateCache, RateCacheConfig, SharedRateCache};
pub use config::ProviderConfig;
pub use frankfurter::FrankfurterClient;
pub use open_er::OpenErApiClient;
pub use provider::RateProvider;

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateProvider;
