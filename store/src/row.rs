//! Mapping between `rate_records` rows and [`RateRecord`].

use std::str::FromStr;

use ratekeeper_common::{
    from_millis, Currency, FxError, FxResult, RateId, RateMetadata, RateRecord, RateSource,
};
use rust_decimal::Decimal;

/// Columns selected by every record query, in [`RateRow`] order.
pub(crate) const RECORD_COLUMNS: &str = "id, base_currency, quote_currency, rate, source, \
     fetched_at, priority, metadata, is_archived, created_at, updated_at";

/// Best candidate first: highest priority, then most recent observation.
/// `created_at` and `id` only break exact ties so results are deterministic.
pub(crate) const RESOLUTION_ORDER: &str =
    "priority DESC, fetched_at DESC, created_at DESC, id DESC";

/// Raw row as stored in SQLite.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RateRow {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub rate: String,
    pub source: String,
    pub fetched_at: i64,
    pub priority: i64,
    pub metadata: String,
    pub is_archived: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TryFrom<RateRow> for RateRecord {
    type Error = FxError;

    fn try_from(row: RateRow) -> FxResult<Self> {
        let id = RateId::parse(&row.id)
            .map_err(|e| corrupt(&row.id, format!("bad id: {e}")))?;
        let rate = Decimal::from_str(&row.rate)
            .map_err(|e| corrupt(&row.id, format!("bad rate '{}': {e}", row.rate)))?;
        let source = RateSource::from_str(&row.source)?;
        let metadata: RateMetadata = serde_json::from_str(&row.metadata)
            .map_err(|e| corrupt(&row.id, format!("bad metadata: {e}")))?;
        let priority = i32::try_from(row.priority)
            .map_err(|_| corrupt(&row.id, format!("priority {} out of range", row.priority)))?;

        Ok(RateRecord {
            id,
            base: Currency::new(row.base_currency),
            quote: Currency::new(row.quote_currency),
            rate,
            source,
            fetched_at: timestamp(&row.id, row.fetched_at)?,
            priority,
            metadata,
            is_archived: row.is_archived,
            created_at: timestamp(&row.id, row.created_at)?,
            updated_at: timestamp(&row.id, row.updated_at)?,
        })
    }
}

fn timestamp(id: &str, millis: i64) -> FxResult<chrono::DateTime<chrono::Utc>> {
    from_millis(millis).ok_or_else(|| corrupt(id, format!("timestamp {millis} out of range")))
}

fn corrupt(id: &str, detail: String) -> FxError {
    FxError::Storage(format!("corrupt rate record {id}: {detail}"))
}

/// Map any sqlx failure into the storage variant.
pub(crate) fn storage_error(error: sqlx::Error) -> FxError {
    FxError::Storage(error.to_string())
}
