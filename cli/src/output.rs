//! Rendering of command results.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use ratekeeper_common::{RateRecord, ResolvedRate, StalenessInfo};
use ratekeeper_sync::{RefreshOutcome, SyncMetricsSnapshot, SyncStatus};

/// Output style selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Json,
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn pretty(value: Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
}

pub fn resolved(rate: &ResolvedRate, format: Format) -> String {
    match (rate, format) {
        (ResolvedRate::Identity(currency), Format::Text) => {
            format!("{currency}/{currency} 1 (identity)")
        }
        (ResolvedRate::Identity(currency), Format::Json) => pretty(json!({
            "base": currency,
            "quote": currency,
            "rate": "1",
            "identity": true,
        })),
        (ResolvedRate::Record(record), Format::Text) => format!(
            "{} {} ({}, priority {}, fetched {})\nid {}",
            record.pair(),
            record.rate,
            record.source,
            record.priority,
            timestamp(record.fetched_at),
            record.id,
        ),
        (ResolvedRate::Record(record), Format::Json) => pretty(json!(record)),
    }
}

pub fn record(record: &RateRecord, format: Format) -> String {
    resolved(&ResolvedRate::Record(record.clone()), format)
}

/// Tabulate records, one per line.
pub fn records(records: &[RateRecord], format: Format) -> String {
    if format == Format::Json {
        return pretty(json!(records));
    }
    if records.is_empty() {
        return "no rates".to_string();
    }

    let mut lines = vec![format!(
        "{:<8} {:>14} {:<13} {:>4} {:<24} {:<8} {}",
        "PAIR", "RATE", "SOURCE", "PRIO", "FETCHED", "STATE", "ID"
    )];
    for record in records {
        lines.push(format!(
            "{:<8} {:>14} {:<13} {:>4} {:<24} {:<8} {}",
            record.pair().to_string(),
            record.rate.to_string(),
            record.source.as_str(),
            record.priority,
            timestamp(record.fetched_at),
            if record.is_archived { "archived" } else { "active" },
            record.id,
        ));
    }
    lines.join("\n")
}

pub fn staleness(info: &StalenessInfo, now: DateTime<Utc>, format: Format) -> String {
    let days_old = info.days_old(now);
    match format {
        Format::Json => pretty(json!({
            "total_rates": info.total_rates,
            "stale_rates": info.stale_rates,
            "oldest_fetched_at": info.oldest_fetched_at,
            "days_old": days_old,
            "needs_refresh": info.needs_refresh(),
        })),
        Format::Text => {
            let oldest = match (info.oldest_fetched_at, days_old) {
                (Some(ts), Some(days)) => format!("{} ({days} days old)", timestamp(ts)),
                _ => "-".to_string(),
            };
            format!(
                "total rates:   {}\nstale rates:   {}\noldest:        {}\nneeds refresh: {}",
                info.total_rates,
                info.stale_rates,
                oldest,
                if info.needs_refresh() { "yes" } else { "no" },
            )
        }
    }
}

pub fn refresh(outcome: &RefreshOutcome, format: Format) -> String {
    match format {
        Format::Json => pretty(refresh_json(outcome)),
        Format::Text => format!(
            "refreshed {} rates from {}{}",
            outcome.persisted,
            outcome.provider,
            if outcome.used_fallback { " (fallback)" } else { "" },
        ),
    }
}

fn refresh_json(outcome: &RefreshOutcome) -> Value {
    json!({
        "provider": outcome.provider,
        "source": outcome.source,
        "persisted": outcome.persisted,
        "fetched_at": outcome.fetched_at,
        "used_fallback": outcome.used_fallback,
    })
}

pub fn status(
    status: &SyncStatus,
    metrics: &SyncMetricsSnapshot,
    now: DateTime<Utc>,
    format: Format,
) -> String {
    match format {
        Format::Json => pretty(json!({
            "is_stale": status.staleness.map(|s| s.needs_refresh()),
            "days_old": status.staleness.and_then(|s| s.days_old(now)),
            "last_checked": status.last_checked,
            "last_refresh": status.last_refresh.as_ref().map(refresh_json),
            "last_error": status.last_error.as_ref().map(|e| json!({
                "code": e.error_code(),
                "message": e.to_string(),
            })),
            "metrics": metrics,
        })),
        Format::Text => {
            let mut lines = Vec::new();
            if let Some(info) = &status.staleness {
                lines.push(staleness(info, now, Format::Text));
            }
            lines.push(format!(
                "last checked:  {}",
                status.last_checked.map(timestamp).unwrap_or_else(|| "never".into())
            ));
            if let Some(outcome) = &status.last_refresh {
                lines.push(format!("last refresh:  {}", refresh(outcome, Format::Text)));
            }
            if let Some(e) = &status.last_error {
                lines.push(format!("last error:    [{}] {e}", e.error_code()));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ratekeeper_common::{Currency, FxError, RateId, RateMetadata, RateSource};
    use rust_decimal_macros::dec;

    fn sample() -> RateRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        RateRecord {
            id: RateId::new(),
            base: Currency::usd(),
            quote: Currency::eur(),
            rate: dec!(0.93),
            source: RateSource::PrimaryApi,
            fetched_at: at,
            priority: 50,
            metadata: RateMetadata::new(),
            is_archived: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_resolved_text() {
        let text = resolved(&ResolvedRate::Record(sample()), Format::Text);
        assert!(text.starts_with("USD/EUR 0.93 (primary-api, priority 50, fetched 2024-01-05T12:00:00.000Z)"));

        let identity = resolved(&ResolvedRate::Identity(Currency::gbp()), Format::Text);
        assert_eq!(identity, "GBP/GBP 1 (identity)");
    }

    #[test]
    fn test_records_json_is_parseable() {
        let out = records(&[sample()], Format::Json);
        let parsed: Vec<RateRecord> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0].rate, dec!(0.93));
    }

    #[test]
    fn test_records_table() {
        assert_eq!(records(&[], Format::Text), "no rates");

        let mut archived = sample();
        archived.is_archived = true;
        let table = records(&[sample(), archived], Format::Text);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("PAIR"));
        assert!(lines[1].contains("active"));
        assert!(lines[2].contains("archived"));
    }

    #[test]
    fn test_staleness_text() {
        let now = Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap();
        let info = StalenessInfo {
            total_rates: 2,
            stale_rates: 1,
            oldest_fetched_at: Some(sample().fetched_at),
        };
        let text = staleness(&info, now, Format::Text);
        assert!(text.contains("(3 days old)"));
        assert!(text.contains("needs refresh: yes"));

        let empty = StalenessInfo {
            total_rates: 0,
            stale_rates: 0,
            oldest_fetched_at: None,
        };
        assert!(staleness(&empty, now, Format::Text).contains("oldest:        -"));
    }

    #[test]
    fn test_status_json_reports_error_code() {
        let status = SyncStatus {
            last_error: Some(FxError::Offline),
            ..Default::default()
        };
        let out = super::status(&status, &SyncMetricsSnapshot::default(), Utc::now(), Format::Json);
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["last_error"]["code"], "OFFLINE");
        assert_eq!(value["is_stale"], Value::Null);
    }
}
