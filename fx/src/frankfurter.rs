//! Fallback provider: Frankfurter (ECB reference rates).
//!
//! `GET {base_url}/latest?from=USD&to=EUR,GBP` answers
//! `{ "amount": 1.0, "base": "USD", "date": "2024-01-05", "rates": { "EUR": 0.91 } }`;
//! failures come back with a non-success status and `{ "message": "not found" }`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ratekeeper_common::{Currency, FxError, FxResult, ProviderRate, RateSource};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::http;
use crate::provider::{select_rates, RateProvider};

/// Default public endpoint.
pub const FRANKFURTER_URL: &str = "https://api.frankfurter.app";

const PROVIDER_NAME: &str = "frankfurter";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    base: Option<String>,
    rates: Option<BTreeMap<String, f64>>,
    message: Option<String>,
}

/// Client for the fallback rate API.
pub struct FrankfurterClient {
    client: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
}

impl FrankfurterClient {
    /// Create a new client.
    pub fn new(base_url: impl Into<String>, default_timeout: Duration) -> FxResult<Self> {
        Ok(Self {
            client: http::build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout,
        })
    }

    fn latest_url(&self, base: &Currency, targets: Option<&[Currency]>) -> String {
        let mut url = format!("{}/latest?from={}", self.base_url, base.code());
        if let Some(targets) = targets.filter(|t| !t.is_empty()) {
            let codes: Vec<&str> = targets.iter().map(Currency::code).collect();
            url.push_str("&to=");
            url.push_str(&codes.join(","));
        }
        url
    }
}

#[async_trait]
impl RateProvider for FrankfurterClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn source(&self) -> RateSource {
        RateSource::FallbackApi
    }

    #[instrument(skip(self, targets), fields(provider = PROVIDER_NAME))]
    async fn fetch_latest_rates(
        &self,
        base: &Currency,
        targets: Option<&[Currency]>,
        timeout: Option<Duration>,
    ) -> FxResult<Vec<ProviderRate>> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let url = self.latest_url(base, targets);
        let (status, body) = http::get_text(&self.client, PROVIDER_NAME, &url, timeout).await?;

        debug!(%status, bytes = body.len(), "Response received");
        parse_latest(status, &body, base, targets)
    }

    async fn check_availability(&self) -> bool {
        let url = format!("{}/currencies", self.base_url);
        http::probe(&self.client, &url, self.default_timeout).await
    }
}

/// Normalize a `latest` payload.
pub fn parse_latest(
    status: StatusCode,
    body: &str,
    base: &Currency,
    targets: Option<&[Currency]>,
) -> FxResult<Vec<ProviderRate>> {
    let parsed: Result<LatestResponse, _> = serde_json::from_str(body);

    if !status.is_success() {
        let message = match parsed {
            Ok(LatestResponse { message: Some(message), .. }) => message,
            _ => format!("HTTP {status}"),
        };
        return Err(FxError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message,
        });
    }

    let response = parsed.map_err(|e| invalid(e.to_string()))?;

    if let Some(message) = response.message {
        return Err(FxError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message,
        });
    }

    let reported_base = response
        .base
        .ok_or_else(|| invalid("missing field `base`".to_string()))?;
    if Currency::new(&reported_base) != *base {
        return Err(invalid(format!(
            "asked for base {base} but got {reported_base}"
        )));
    }

    let rates = response
        .rates
        .ok_or_else(|| invalid("missing field `rates`".to_string()))?;

    Ok(select_rates(base, targets, rates))
}

fn invalid(message: String) -> FxError {
    FxError::InvalidResponse {
        provider: PROVIDER_NAME.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;

    const SUCCESS: &str =
        r#"{"amount":1.0,"base":"USD","date":"2024-01-05","rates":{"EUR":0.91,"GBP":0.79}}"#;

    #[test]
    fn test_parse_success() {
        let rates = parse_latest(StatusCode::OK, SUCCESS, &Currency::usd(), None).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0], ProviderRate::new(Currency::usd(), Currency::eur(), 0.91));
    }

    #[test]
    fn test_parse_error_status_carries_message() {
        let err = parse_latest(
            StatusCode::NOT_FOUND,
            r#"{"message":"not found"}"#,
            &Currency::usd(),
            None,
        )
        .unwrap_err();

        match err {
            FxError::ProviderError { message, .. } => assert_eq!(message, "not found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_fields() {
        let body = r#"{"amount":1.0,"base":"USD","date":"2024-01-05"}"#;
        assert!(matches!(
            parse_latest(StatusCode::OK, body, &Currency::usd(), None),
            Err(FxError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_url_lists_targets() {
        let client = FrankfurterClient::new("http://localhost/", Duration::from_secs(1)).unwrap();
        let targets = [Currency::eur(), Currency::gbp()];
        assert_eq!(
            client.latest_url(&Currency::usd(), Some(&targets)),
            "http://localhost/latest?from=USD&to=EUR,GBP"
        );
        assert_eq!(
            client.latest_url(&Currency::usd(), None),
            "http://localhost/latest?from=USD"
        );
    }

    #[tokio::test]
    async fn test_fetch_over_http_with_targets() {
        let url = test_server::respond_with(200, SUCCESS).await;
        let client = FrankfurterClient::new(url, Duration::from_secs(5)).unwrap();

        let targets = [Currency::gbp()];
        let rates = client
            .fetch_latest_rates(&Currency::usd(), Some(&targets), None)
            .await
            .unwrap();

        assert_eq!(rates, vec![ProviderRate::new(Currency::usd(), Currency::gbp(), 0.79)]);
    }

    #[tokio::test]
    async fn test_timeout() {
        let url = test_server::black_hole().await;
        let client = FrankfurterClient::new(url, Duration::from_millis(100)).unwrap();

        let result = client.fetch_latest_rates(&Currency::usd(), None, None).await;
        assert!(matches!(result, Err(FxError::Timeout { .. })));
    }
}
