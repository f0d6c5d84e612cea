//! ATSD REST API Client
//!
//! HTTP client for the ATSD metadata and series endpoints.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::types::{
    EntityInfo, EntityTags, MetricInfo, NameFilter, SeriesQuery, SeriesRequest, SeriesResponse,
    SeriesResult,
};
use super::AtsdBackend;

/// ATSD REST API client
pub struct AtsdClient {
    client: Client,
    config: AtsdConfig,
}

/// Configuration for the ATSD client
#[derive(Debug, Clone)]
pub struct AtsdConfig {
    /// Base URL of the ATSD server (e.g., "http://localhost:8088")
    pub base_url: String,
    /// Basic auth user
    pub username: String,
    /// Basic auth password
    pub password: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Maximum attempts per request
    pub max_retries: u32,
}

impl Default for AtsdConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8088".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout_ms: 10_000,
            max_retries: 3,
        }
    }
}

impl AtsdClient {
    /// Create a new ATSD client with the given configuration
    pub fn new(config: AtsdConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &AtsdConfig {
        &self.config
    }

    /// Full URL of an API v1 path
    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.config.username.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.config.username, Some(&self.config.password))
        }
    }

    /// Check if ATSD is reachable with the configured credentials
    pub async fn health_check(&self) -> Result<(), BackendError> {
        let _: Vec<serde_json::Value> = self
            .get_json("metrics", &[("limit", "1".to_string())])
            .await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let url = self.url(path);
        tracing::debug!(url = %url, params = ?params, "ATSD GET");

        let response = self
            .send_with_retry(|| self.authed(self.client.get(&url).query(params)))
            .await?;
        decode(response).await
    }

    async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "ATSD POST");

        let response = self
            .send_with_retry(|| self.authed(self.client.post(&url).json(body)))
            .await?;
        decode(response).await
    }

    /// Send a request with retry logic
    ///
    /// Connection failures, timeouts and 429 responses are retried with
    /// quadratic backoff; any other status is returned to the caller.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, BackendError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = BackendError::Unavailable;

        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                // Exponential backoff: 1s, 4s, 9s...
                let delay = std::time::Duration::from_secs((attempt as u64).pow(2));
                tokio::time::sleep(delay).await;
            }

            match build().send().await {
                Ok(response) if response.status().as_u16() == 429 => {
                    if let Some(retry_after) = response.headers().get("Retry-After") {
                        if let Ok(secs) = retry_after.to_str().unwrap_or("5").parse::<u64>() {
                            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                        }
                    }
                    last_error = BackendError::RateLimited;
                }
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() => last_error = BackendError::Timeout,
                Err(e) if e.is_connect() => last_error = BackendError::Unavailable,
                Err(e) => return Err(BackendError::Request(e)),
            }

            tracing::debug!(attempt, error = %last_error, "ATSD request failed, retrying");
        }

        Err(last_error)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(BackendError::Api {
            status: status.as_u16(),
            message: text,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
}

fn expression_params(filter: &NameFilter) -> Vec<(&'static str, String)> {
    filter
        .expression()
        .map(|expr| vec![("expression", expr)])
        .unwrap_or_default()
}

#[async_trait]
impl AtsdBackend for AtsdClient {
    async fn health_check(&self) -> Result<(), BackendError> {
        AtsdClient::health_check(self).await
    }

    async fn entities(&self, filter: &NameFilter) -> Result<Vec<EntityInfo>, BackendError> {
        self.get_json("entities", &expression_params(filter)).await
    }

    async fn metrics(&self, filter: &NameFilter) -> Result<Vec<MetricInfo>, BackendError> {
        self.get_json("metrics", &expression_params(filter)).await
    }

    async fn entity_metrics(
        &self,
        entity: &str,
        filter: &NameFilter,
    ) -> Result<Vec<MetricInfo>, BackendError> {
        let path = format!("entities/{}/metrics", urlencoding::encode(entity));
        self.get_json(&path, &expression_params(filter)).await
    }

    async fn entity_and_tags(&self, metric: &str) -> Result<Vec<EntityTags>, BackendError> {
        let path = format!("metrics/{}/entity-and-tags", urlencoding::encode(metric));
        self.get_json(&path, &[]).await
    }

    async fn metric(&self, name: &str) -> Result<MetricInfo, BackendError> {
        let path = format!("metrics/{}", urlencoding::encode(name));
        self.get_json(&path, &[]).await
    }

    async fn entity(&self, name: &str) -> Result<EntityInfo, BackendError> {
        let path = format!("entities/{}", urlencoding::encode(name));
        self.get_json(&path, &[]).await
    }

    async fn query_series(
        &self,
        queries: &[SeriesQuery],
    ) -> Result<Vec<SeriesResult>, BackendError> {
        let response: SeriesResponse = self
            .post_json("series", &SeriesRequest { queries })
            .await?;
        Ok(response.series)
    }
}

// ============================================
// Errors
// ============================================

/// Errors that can occur when communicating with ATSD
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("ATSD unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Rate limited")]
    RateLimited,

    #[error("Malformed response: {0}")]
    Decode(String),
}
