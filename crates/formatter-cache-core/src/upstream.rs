//! HTTP plumbing shared by the catalog-backed renderer and catalog client.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::CatalogConfig;
use crate::error::{Error, Result};

/// Seconds to wait on a 429 without a `Retry-After` header
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 5;
/// Never sleep longer than this on a single `Retry-After`
const MAX_RATE_LIMIT_WAIT_SECS: u64 = 60;

/// Catalog API client with retry logic.
///
/// Transport failures, 5xx responses and rate limiting are retried up to
/// `retry_count` attempts. Every other response is handed back to the caller,
/// which maps statuses onto domain errors.
pub struct UpstreamClient {
    client: Client,
    /// Base URL for the API (e.g., "http://localhost:8080/geonetwork/api")
    pub api_base: String,
    /// Service credential used when no caller credential is forwarded
    pub api_key: Option<String>,
    /// Number of attempts per request
    pub retry_count: u32,
    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl UpstreamClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::UpstreamRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            retry_count: config.retry_count.max(1),
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    /// Join a relative API path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// `authorization` is forwarded verbatim when present; otherwise the
    /// service API key is sent as a bearer token.
    pub async fn send<F>(&self, build: F, authorization: Option<&str>) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..self.retry_count {
            debug!("Catalog request attempt {}/{}", attempt + 1, self.retry_count);

            let mut req = build(&self.client);
            if let Some(auth) = authorization {
                req = req.header(reqwest::header::AUTHORIZATION, auth);
            } else if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse().ok());

                        warn!("Rate limited, retry after {:?}s", retry_after);
                        last_error = Some(Error::UpstreamRateLimited { retry_after });

                        let wait = retry_after
                            .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS)
                            .min(MAX_RATE_LIMIT_WAIT_SECS);
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                        continue;
                    }

                    if !status.is_server_error() {
                        return Ok(response);
                    }

                    let body = response.text().await.unwrap_or_default();
                    warn!("Catalog error: {} - {}", status, body);
                    last_error = Some(Error::UpstreamRequest(format!("HTTP {status}: {body}")));
                }
                Err(e) => {
                    warn!("Request failed: {}", e);
                    last_error = Some(if e.is_timeout() {
                        Error::UpstreamTimeout
                    } else {
                        Error::UpstreamRequest(e.to_string())
                    });
                }
            }

            // Wait before retry
            if attempt + 1 < self.retry_count {
                tokio::time::sleep(Duration::from_millis(self.retry_delay_ms)).await;
            }
        }

        error!("Catalog request failed after {} attempts", self.retry_count);
        Err(last_error.unwrap_or_else(|| {
            Error::UpstreamRequest("request failed after maximum retries".to_string())
        }))
    }

    /// Decode a successful JSON response; any other status becomes an error.
    pub async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamRequest(format!("HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::UpstreamInvalidResponse(e.to_string()))
    }
}
