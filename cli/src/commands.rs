//! Command execution against the rate store and orchestrator.

use std::sync::Arc;

use anyhow::Context;
use ratekeeper_common::{now, Currency, RateId, RateMetadata, SetRateInput};
use ratekeeper_store::RateStore;
use ratekeeper_sync::{CheckOutcome, SyncConfig, SyncOrchestrator, UnknownConnectivity};
use tracing::info;

use crate::output::{self, Format};

/// Resolve the current rate for a pair.
pub async fn get(store: &RateStore, base: &Currency, quote: &Currency, format: Format) -> anyhow::Result<String> {
    match store.get_rate(base, quote).await? {
        Some(rate) => Ok(output::resolved(&rate, format)),
        None => anyhow::bail!("no rate stored for {base}/{quote}"),
    }
}

/// Write a manual override.
pub async fn set(
    store: &RateStore,
    base: Currency,
    quote: Currency,
    rate: f64,
    priority: Option<i32>,
    note: Option<String>,
    format: Format,
) -> anyhow::Result<String> {
    let mut input = SetRateInput::manual(base, quote, rate);
    if let Some(priority) = priority {
        input = input.with_priority(priority);
    }
    if let Some(note) = note {
        let mut metadata = RateMetadata::new();
        metadata.insert("note".to_string(), note.into());
        input = input.with_metadata(metadata);
    }

    let record = store.set_rate(input).await?;
    info!(pair = %record.pair(), id = %record.id, "Manual rate stored");
    Ok(output::record(&record, format))
}

pub async fn list(store: &RateStore, format: Format) -> anyhow::Result<String> {
    let records = store.get_all_active_rates().await?;
    Ok(output::records(&records, format))
}

pub async fn history(store: &RateStore, base: &Currency, quote: &Currency, format: Format) -> anyhow::Result<String> {
    let records = store.get_rate_history(base, quote).await?;
    Ok(output::records(&records, format))
}

pub async fn archive(store: &RateStore, id: RateId, format: Format) -> anyhow::Result<String> {
    store.archive_rate(id).await?;
    let record = store
        .get_record(id)
        .await?
        .with_context(|| format!("record {id} vanished after archiving"))?;
    Ok(output::record(&record, format))
}

pub async fn staleness(store: &RateStore, format: Format) -> anyhow::Result<String> {
    let info = store.get_staleness_info().await?;
    Ok(output::staleness(&info, now(), format))
}

/// Fetch from the providers now, whatever the staleness.
pub async fn refresh(config: SyncConfig, format: Format) -> anyhow::Result<String> {
    let orchestrator = bootstrap(config).await?;
    let result = orchestrator.refresh_now().await;
    orchestrator.store().close().await;

    let outcome = result.context("refresh failed")?;
    Ok(output::refresh(&outcome, format))
}

/// Run one staleness check, refreshing when needed, and report the result.
pub async fn status(config: SyncConfig, format: Format) -> anyhow::Result<String> {
    let orchestrator = bootstrap(config).await?;

    match orchestrator.check_staleness().await {
        CheckOutcome::Fresh(_) => info!("Rates are fresh"),
        CheckOutcome::Refreshed(outcome) => info!(provider = %outcome.provider, "Stale rates refreshed"),
        CheckOutcome::SkippedOffline => info!("Offline, refresh skipped"),
        CheckOutcome::AlreadyRunning => info!("Refresh already running"),
        CheckOutcome::Failed(e) => info!(error = %e, "Refresh failed, showing last-known rates"),
    }

    let rendered = output::status(&orchestrator.status(), &orchestrator.metrics(), now(), format);
    orchestrator.store().close().await;
    Ok(rendered)
}

async fn bootstrap(config: SyncConfig) -> anyhow::Result<Arc<SyncOrchestrator>> {
    let orchestrator = SyncOrchestrator::bootstrap(config, Arc::new(UnknownConnectivity))
        .await
        .context("cannot start sync orchestrator")?;
    Ok(Arc::new(orchestrator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratekeeper_common::FxError;

    async fn store() -> RateStore {
        RateStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = store().await;
        let out = set(
            &store,
            Currency::usd(),
            Currency::eur(),
            0.92,
            None,
            Some("bank quote".to_string()),
            Format::Text,
        )
        .await
        .unwrap();
        assert!(out.starts_with("USD/EUR 0.92 (manual, priority 100"));

        let got = get(&store, &Currency::usd(), &Currency::eur(), Format::Text).await.unwrap();
        assert_eq!(got, out);

        let active = store.get_all_active_rates().await.unwrap();
        assert_eq!(active[0].metadata["note"], "bank quote");
    }

    #[tokio::test]
    async fn test_get_missing_and_identity() {
        let store = store().await;
        assert!(get(&store, &Currency::usd(), &Currency::jpy(), Format::Text).await.is_err());

        let identity = get(&store, &Currency::jpy(), &Currency::jpy(), Format::Text).await.unwrap();
        assert_eq!(identity, "JPY/JPY 1 (identity)");
    }

    #[tokio::test]
    async fn test_set_rejects_invalid_rate() {
        let store = store().await;
        let err = set(&store, Currency::usd(), Currency::eur(), -1.0, None, None, Format::Text)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<FxError>(), Some(FxError::InvalidRate(_))));
    }

    #[tokio::test]
    async fn test_history_and_archive() {
        let store = store().await;
        set(&store, Currency::usd(), Currency::eur(), 0.90, None, None, Format::Text).await.unwrap();
        let latest = store
            .set_rate(SetRateInput::manual(Currency::usd(), Currency::eur(), 0.91))
            .await
            .unwrap();

        let table = history(&store, &Currency::usd(), &Currency::eur(), Format::Text).await.unwrap();
        assert_eq!(table.lines().count(), 3);

        archive(&store, latest.id, Format::Text).await.unwrap();
        assert_eq!(list(&store, Format::Text).await.unwrap(), "no rates");

        let missing = archive(&store, RateId::new(), Format::Text).await.unwrap_err();
        assert!(matches!(missing.downcast_ref::<FxError>(), Some(FxError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn test_staleness_of_empty_store() {
        let store = store().await;
        let out = staleness(&store, Format::Text).await.unwrap();
        assert!(out.contains("total rates:   0"));
        assert!(out.contains("needs refresh: yes"));
    }
}
