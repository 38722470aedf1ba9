//! Shared HTTP plumbing for provider clients.

use std::time::Duration;

use ratekeeper_common::{FxError, FxResult};
use reqwest::StatusCode;
use tracing::debug;

/// Build the HTTP client shared by a provider.
pub(crate) fn build_client() -> FxResult<reqwest::Client> {
    reqwest::Client::builder()
        .gzip(true)
        .build()
        .map_err(|e| FxError::Configuration(format!("cannot build HTTP client: {e}")))
}

/// GET `url` and read the whole body, bounded by `timeout`.
///
/// When the deadline passes the in-flight request future is dropped, which
/// cancels the request.
pub(crate) async fn get_text(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    timeout: Duration,
) -> FxResult<(StatusCode, String)> {
    debug!(provider, url, ?timeout, "Requesting rates");

    let request = async {
        let response = client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok::<_, reqwest::Error>((status, body))
    };

    match tokio::time::timeout(timeout, request).await {
        Ok(Ok(answer)) => Ok(answer),
        Ok(Err(e)) if e.is_timeout() => Err(FxError::Timeout {
            provider: provider.to_string(),
            after: timeout,
        }),
        Ok(Err(e)) => Err(FxError::Network {
            provider: provider.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(FxError::Timeout {
            provider: provider.to_string(),
            after: timeout,
        }),
    }
}

/// Whether `url` answers with a success status within `timeout`.
pub(crate) async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, client.get(url).send()).await {
        Ok(Ok(response)) => response.status().is_success(),
        Ok(Err(e)) => {
            debug!(url, error = %e, "Availability probe failed");
            false
        }
        Err(_) => {
            debug!(url, "Availability probe timed out");
            false
        }
    }
}
