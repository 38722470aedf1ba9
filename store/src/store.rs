//! Versioned rate store.

use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use ratekeeper_common::{
    is_at_least_old, to_millis, validate_rate, Currency, CurrencyPair, FxError, FxResult,
    ProviderRate, RateId, RateMetadata, RateRecord, RateSource, ResolvedRate, SetRateInput,
    StalenessInfo,
};

use crate::config::StoreConfig;
use crate::row::{storage_error, RateRow, RECORD_COLUMNS, RESOLUTION_ORDER};

/// Durable, append-only storage of rate records.
///
/// Every write that supersedes an active record runs archive-then-insert in a
/// single SQLite transaction, and write transactions are serialized through
/// `write_gate`, so no reader ever sees zero or two active records for a pair
/// produced by the write path.
pub struct RateStore {
    pool: SqlitePool,
    config: StoreConfig,
    write_gate: Mutex<()>,
}

impl RateStore {
    /// Open (creating if needed) the database and apply migrations.
    pub async fn connect(config: StoreConfig) -> FxResult<Self> {
        config.validate().map_err(FxError::Configuration)?;

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| FxError::Configuration(format!("bad database url: {e}")))?
            .create_if_missing(true);

        // Each connection to `:memory:` is its own database, so keep exactly one alive.
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| FxError::Storage(format!("migration failed: {e}")))?;

        info!(database_url = %config.database_url, "Rate store ready");

        Ok(Self {
            pool,
            config,
            write_gate: Mutex::new(()),
        })
    }

    /// Open a private in-memory store.
    pub async fn in_memory() -> FxResult<Self> {
        Self::connect(StoreConfig::in_memory()).await
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Resolve the best active rate for a pair.
    ///
    /// Identical currencies resolve to an identity rate without touching the
    /// database. `Ok(None)` means no active record exists.
    #[instrument(skip(self))]
    pub async fn get_rate(&self, base: &Currency, quote: &Currency) -> FxResult<Option<ResolvedRate>> {
        if base == quote {
            return Ok(Some(ResolvedRate::Identity(base.clone())));
        }

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM rate_records \
             WHERE base_currency = ? AND quote_currency = ? AND is_archived = 0 \
             ORDER BY {RESOLUTION_ORDER} LIMIT 1"
        );
        let row: Option<RateRow> = sqlx::query_as(&sql)
            .bind(base.code())
            .bind(quote.code())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => Ok(Some(ResolvedRate::Record(RateRecord::try_from(row)?))),
            None => {
                debug!("No active rate");
                Ok(None)
            }
        }
    }

    /// Write a new rate for a pair, archiving whatever was active before.
    #[instrument(skip(self, input), fields(pair = %input.pair(), source = %input.source))]
    pub async fn set_rate(&self, input: SetRateInput) -> FxResult<RateRecord> {
        let record = build_record(
            &input.base,
            &input.quote,
            input.rate,
            input.source,
            input.fetched_at,
            input.effective_priority(),
            input.metadata,
        )?;

        let _guard = self.write_gate.lock().await;
        let archived_at = storage_now();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let archived = archive_active(&mut tx, &record.pair(), archived_at).await?;
        insert_record(&mut tx, &record).await?;

        tx.commit().await.map_err(storage_error)?;

        info!(
            rate_id = %record.id,
            rate = %record.rate,
            priority = record.priority,
            archived,
            "Rate stored"
        );

        Ok(record)
    }

    /// Apply `set_rate` semantics to many pairs from one source in a single
    /// transaction. Entries that fail validation are skipped.
    ///
    /// Returns the number of records created.
    #[instrument(skip(self, rates, metadata), fields(source = %source, entries = rates.len()))]
    pub async fn batch_update_rates(
        &self,
        source: RateSource,
        rates: &[ProviderRate],
        fetched_at: DateTime<Utc>,
        metadata: RateMetadata,
    ) -> FxResult<usize> {
        let mut records = Vec::with_capacity(rates.len());
        for entry in rates {
            match build_record(
                &entry.base,
                &entry.quote,
                entry.rate,
                source,
                Some(fetched_at),
                source.default_priority(),
                metadata.clone(),
            ) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(pair = %entry.pair(), rate = entry.rate, error = %e, "Skipping batch entry");
                }
            }
        }

        if records.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_gate.lock().await;
        let archived_at = storage_now();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        for record in &records {
            archive_active(&mut tx, &record.pair(), archived_at).await?;
            insert_record(&mut tx, record).await?;
        }

        tx.commit().await.map_err(storage_error)?;

        info!(
            created = records.len(),
            skipped = rates.len() - records.len(),
            "Batch stored"
        );

        Ok(records.len())
    }

    /// All active records, best candidates first.
    #[instrument(skip(self))]
    pub async fn get_all_active_rates(&self) -> FxResult<Vec<RateRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM rate_records WHERE is_archived = 0 \
             ORDER BY {RESOLUTION_ORDER}"
        );
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.into_iter().map(RateRecord::try_from).collect()
    }

    /// Staleness summary relative to now.
    pub async fn get_staleness_info(&self) -> FxResult<StalenessInfo> {
        self.get_staleness_info_at(Utc::now()).await
    }

    /// Staleness summary relative to `reference`.
    #[instrument(skip(self))]
    pub async fn get_staleness_info_at(&self, reference: DateTime<Utc>) -> FxResult<StalenessInfo> {
        let records = self.get_all_active_rates().await?;
        let window = self.config.freshness_window;

        let stale_rates = records
            .iter()
            .filter(|r| !r.source.is_manual())
            .filter(|r| is_at_least_old(r.fetched_at, window, reference))
            .count() as u64;

        Ok(StalenessInfo {
            total_rates: records.len() as u64,
            stale_rates,
            oldest_fetched_at: records.iter().map(|r| r.fetched_at).min(),
        })
    }

    /// Mark a record as superseded. Archiving twice is a no-op.
    #[instrument(skip(self))]
    pub async fn archive_rate(&self, id: RateId) -> FxResult<()> {
        let _guard = self.write_gate.lock().await;
        let now = to_millis(storage_now());

        let result = sqlx::query(
            "UPDATE rate_records SET is_archived = 1, updated_at = ? \
             WHERE id = ? AND is_archived = 0",
        )
        .bind(now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_records WHERE id = ?")
                .bind(id.to_string())
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error)?;
            if exists == 0 {
                return Err(FxError::RecordNotFound(id));
            }
            debug!(rate_id = %id, "Already archived");
        } else {
            info!(rate_id = %id, "Rate archived");
        }

        Ok(())
    }

    /// Fetch one record by id, archived or not.
    pub async fn get_record(&self, id: RateId) -> FxResult<Option<RateRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM rate_records WHERE id = ?");
        let row: Option<RateRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.map(RateRecord::try_from).transpose()
    }

    /// Full audit trail for a pair, newest first.
    pub async fn get_rate_history(&self, base: &Currency, quote: &Currency) -> FxResult<Vec<RateRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM rate_records \
             WHERE base_currency = ? AND quote_currency = ? \
             ORDER BY created_at DESC, id DESC"
        );
        let rows: Vec<RateRow> = sqlx::query_as(&sql)
            .bind(base.code())
            .bind(quote.code())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        rows.into_iter().map(RateRecord::try_from).collect()
    }

    /// Insert previously exported records verbatim in one transaction.
    ///
    /// Ids, timestamps and archive flags are kept as given and nothing is
    /// archived, so an import reproduces the exported history exactly.
    #[instrument(skip(self, records), fields(records = records.len()))]
    pub async fn restore_records(&self, records: &[RateRecord]) -> FxResult<usize> {
        for record in records {
            check_pair(&record.base, &record.quote)?;
            if record.rate <= rust_decimal::Decimal::ZERO {
                return Err(FxError::InvalidRate(format!(
                    "record {} has non-positive rate {}",
                    record.id, record.rate
                )));
            }
        }

        let _guard = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        for record in records {
            insert_record(&mut tx, record).await?;
        }
        tx.commit().await.map_err(storage_error)?;

        info!(restored = records.len(), "Records restored");
        Ok(records.len())
    }

    /// Total number of stored records, archived included.
    pub async fn count_records(&self) -> FxResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_records")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(count as u64)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Current time at storage precision, so returned records equal re-read ones.
fn storage_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn check_pair(base: &Currency, quote: &Currency) -> FxResult<()> {
    if !base.is_valid() {
        return Err(FxError::InvalidCurrency(base.code().to_string()));
    }
    if !quote.is_valid() {
        return Err(FxError::InvalidCurrency(quote.code().to_string()));
    }
    if base == quote {
        return Err(FxError::SameCurrencyPair(base.clone()));
    }
    Ok(())
}

/// Validate raw input and build the record to insert. Nothing is written here.
fn build_record(
    base: &Currency,
    quote: &Currency,
    rate: f64,
    source: RateSource,
    fetched_at: Option<DateTime<Utc>>,
    priority: i32,
    metadata: RateMetadata,
) -> FxResult<RateRecord> {
    let rate = validate_rate(rate)?;
    check_pair(base, quote)?;

    let now = storage_now();
    Ok(RateRecord {
        id: RateId::new(),
        base: base.clone(),
        quote: quote.clone(),
        rate,
        source,
        fetched_at: fetched_at.map(|t| t.trunc_subsecs(3)).unwrap_or(now),
        priority,
        metadata,
        is_archived: false,
        created_at: now,
        updated_at: now,
    })
}

async fn archive_active(
    tx: &mut Transaction<'_, Sqlite>,
    pair: &CurrencyPair,
    at: DateTime<Utc>,
) -> FxResult<u64> {
    let result = sqlx::query(
        "UPDATE rate_records SET is_archived = 1, updated_at = ? \
         WHERE base_currency = ? AND quote_currency = ? AND is_archived = 0",
    )
    .bind(to_millis(at))
    .bind(pair.base.code())
    .bind(pair.quote.code())
    .execute(&mut **tx)
    .await
    .map_err(storage_error)?;

    Ok(result.rows_affected())
}

async fn insert_record(tx: &mut Transaction<'_, Sqlite>, record: &RateRecord) -> FxResult<()> {
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|e| FxError::Storage(format!("cannot encode metadata: {e}")))?;

    sqlx::query(
        "INSERT INTO rate_records (id, base_currency, quote_currency, rate, source, \
         fetched_at, priority, metadata, is_archived, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.id.to_string())
    .bind(record.base.code())
    .bind(record.quote.code())
    .bind(record.rate.to_string())
    .bind(record.source.as_str())
    .bind(to_millis(record.fetched_at))
    .bind(record.priority)
    .bind(metadata)
    .bind(record.is_archived)
    .bind(to_millis(record.created_at))
    .bind(to_millis(record.updated_at))
    .execute(&mut **tx)
    .await
    .map_err(storage_error)?;

    Ok(())
}
