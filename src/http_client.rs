use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{MigrationError, Result};

/// Read-only access to the documents served by a target system
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// GET `url` with the given `Accept` media type and return the body as text
    async fn get_text(&self, url: Url, media_type: &'static str) -> Result<String>;
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    pub user_agent: String,
    /// Idle connections kept per host; comparison workers hit the same two hosts
    pub max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            user_agent: format!("sample-migration/{}", env!("CARGO_PKG_VERSION")),
            max_idle_per_host: 32,
        }
    }
}

/// Async HTTP client shared by every fetcher and comparator of a run
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()?;

        Ok(Self { client, config })
    }

    /// Get response with retry logic and exponential backoff
    async fn get_response_with_retry(&self, url: &Url, media_type: &str) -> Result<Response> {
        let mut current_attempt = 0;

        loop {
            match self.make_request(url, media_type).await {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    let error = MigrationError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                        message: format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        ),
                    };

                    // Retry on server errors (5xx) but not client errors (4xx)
                    if status.is_server_error() && current_attempt < self.config.retry_attempts {
                        debug!(%url, status = status.as_u16(), attempt = current_attempt, "Retrying after server error");
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }

                    return Err(error);
                }
                Err(error) => {
                    if current_attempt < self.config.retry_attempts && self.is_retryable_error(&error)
                    {
                        debug!(%url, error = %error, attempt = current_attempt, "Retrying after network error");
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Make a single HTTP request with timeout
    async fn make_request(&self, url: &Url, media_type: &str) -> Result<Response> {
        let request_future = self
            .client
            .get(url.clone())
            .header(ACCEPT, media_type)
            .send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| MigrationError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(MigrationError::from)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }

    async fn wait_before_retry(&self, attempt: u32) {
        sleep(self.retry_delay(attempt)).await;
    }

    fn is_retryable_error(&self, error: &MigrationError) -> bool {
        match error {
            MigrationError::Http(reqwest_error) => {
                reqwest_error.is_timeout() || reqwest_error.is_connect() || reqwest_error.is_request()
            }
            MigrationError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[async_trait]
impl DocumentSource for AsyncHttpClient {
    async fn get_text(&self, url: Url, media_type: &'static str) -> Result<String> {
        let response = self.get_response_with_retry(&url, media_type).await?;
        Ok(response.text().await?)
    }
}

/// Append path segments and replace the query of a base URL
pub fn build_url(base: &Url, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| MigrationError::InvalidUrl {
            url: base.to_string(),
            details: "URL cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);

    url.set_query(None);
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}
