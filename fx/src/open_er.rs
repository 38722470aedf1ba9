//! Primary provider: ExchangeRate-API open access endpoint.
//!
//! `GET {base_url}/v6/latest/{BASE}` answers
//! `{ "result": "success", "base_code": "USD", "rates": { "EUR": 0.93, ... } }`
//! or `{ "result": "error", "error-type": "unsupported-code" }`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use ratekeeper_common::{Currency, FxError, FxResult, ProviderRate, RateSource};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::http;
use crate::provider::{select_rates, RateProvider};

/// Default public endpoint.
pub const OPEN_ER_API_URL: &str = "https://open.er-api.com";

const PROVIDER_NAME: &str = "open-er-api";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    base_code: Option<String>,
    rates: Option<BTreeMap<String, f64>>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// Client for the primary rate API.
pub struct OpenErApiClient {
    client: reqwest::Client,
    base_url: String,
    default_timeout: Duration,
}

impl OpenErApiClient {
    /// Create a new client.
    pub fn new(base_url: impl Into<String>, default_timeout: Duration) -> FxResult<Self> {
        Ok(Self {
            client: http::build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_timeout,
        })
    }

    fn latest_url(&self, base: &Currency) -> String {
        format!("{}/v6/latest/{}", self.base_url, base.code())
    }
}

#[async_trait]
impl RateProvider for OpenErApiClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn source(&self) -> RateSource {
        RateSource::PrimaryApi
    }

    #[instrument(skip(self, targets), fields(provider = PROVIDER_NAME))]
    async fn fetch_latest_rates(
        &self,
        base: &Currency,
        targets: Option<&[Currency]>,
        timeout: Option<Duration>,
    ) -> FxResult<Vec<ProviderRate>> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let (status, body) =
            http::get_text(&self.client, PROVIDER_NAME, &self.latest_url(base), timeout).await?;

        debug!(%status, bytes = body.len(), "Response received");
        match parse_latest(&body, base, targets) {
            Err(FxError::InvalidResponse { .. }) if !status.is_success() => {
                Err(FxError::ProviderError {
                    provider: PROVIDER_NAME.to_string(),
                    message: format!("HTTP {status}"),
                })
            }
            parsed => parsed,
        }
    }

    async fn check_availability(&self) -> bool {
        http::probe(&self.client, &self.latest_url(&Currency::usd()), self.default_timeout).await
    }
}

/// Normalize a `latest` payload.
pub fn parse_latest(
    body: &str,
    base: &Currency,
    targets: Option<&[Currency]>,
) -> FxResult<Vec<ProviderRate>> {
    let response: LatestResponse = serde_json::from_str(body).map_err(|e| invalid(e.to_string()))?;

    if response.result != "success" {
        return Err(FxError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            message: response
                .error_type
                .unwrap_or_else(|| format!("result '{}': {body}", response.result)),
        });
    }

    let base_code = response
        .base_code
        .ok_or_else(|| invalid("missing field `base_code`".to_string()))?;
    if Currency::new(&base_code) != *base {
        return Err(invalid(format!(
            "asked for base {base} but got {base_code}"
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
