//! HTTP utilities for plugins.
//!
//! A thin client over reqwest with retry logic and per-plugin rate
//! limiting. Transient failures (timeouts, connection errors, 5xx, 429)
//! are retried with exponential backoff and jitter; other client errors
//! are permanent and abandoned immediately.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Type alias for a direct (unkeyed) token-bucket rate limiter.
pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Builds a slackless token bucket admitting `per_second` requests.
pub fn rate_limiter(per_second: u32) -> Arc<DirectRateLimiter> {
    let rate = NonZeroU32::new(per_second.max(1)).expect("non-zero rate");
    let quota = Quota::per_second(rate).allow_burst(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(quota))
}

/// Errors that can occur on plugin HTTP requests.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("timeout: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("not found")]
    NotFound,

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl HttpError {
    /// Returns true if the failure is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HttpError::Timeout(_) | HttpError::ConnectionFailed(_) | HttpError::RateLimited(_)
        )
    }
}

/// Result type for HTTP operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Configuration for the plugin HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for transient failures.
    pub max_retries: u32,
    /// User-Agent header value.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            user_agent: concat!("surfacer/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP client with retry and optional rate limiting.
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    rate_limiter: Option<Arc<DirectRateLimiter>>,
}

impl HttpClient {
    /// Creates a client from configuration.
    pub fn new(config: HttpClientConfig) -> HttpResult<Self> {
        Self::with_rate_limit(config, None)
    }

    /// Creates a client that also waits on a shared rate limiter before
    /// every request.
    pub fn with_rate_limit(
        config: HttpClientConfig,
        rate_limiter: Option<Arc<DirectRateLimiter>>,
    ) -> HttpResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| HttpError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            rate_limiter,
        })
    }

    /// Executes a GET request and returns the response body.
    pub async fn get(&self, url: &str) -> HttpResult<String> {
        let response = self.execute_with_retry(url).await?;
        response
            .text()
            .await
            .map_err(|e| HttpError::InvalidResponse(e.to_string()))
    }

    /// Executes a GET request and deserializes the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> HttpResult<T> {
        let body = self.get(url).await?;
        serde_json::from_str(&body).map_err(|e| {
            HttpError::InvalidResponse(format!(
                "failed to parse response: {} - body: {}",
                e,
                body.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Executes a request with rate limiting, retries, and error handling.
    async fn execute_with_retry(&self, url: &str) -> HttpResult<reqwest::Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("retry attempt {} after {:?}", attempt, delay);
                sleep(delay).await;
                delay = std::cmp::min(delay * 2 + jitter(), Duration::from_secs(30));
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);

                        if attempt < self.max_retries {
                            warn!("rate limited, waiting {} seconds", retry_after);
                            sleep(Duration::from_secs(retry_after)).await;
                            continue;
                        }
                        return Err(HttpError::RateLimited(retry_after));
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!("server error {}, retrying", status);
                        last_error =
                            Some(HttpError::RequestFailed(format!("server error: {status}")));
                        continue;
                    }

                    if status.is_client_error() {
                        return match status {
                            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                                Err(HttpError::AuthenticationFailed)
                            }
                            StatusCode::NOT_FOUND => Err(HttpError::NotFound),
                            _ => Err(HttpError::RequestFailed(format!("client error: {status}"))),
                        };
                    }

                    if status.is_server_error() {
                        return Err(HttpError::RequestFailed(format!("server error: {status}")));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(HttpError::Timeout(e.to_string()));
                    } else if e.is_connect() {
                        last_error = Some(HttpError::ConnectionFailed(e.to_string()));
                    } else {
                        last_error = Some(HttpError::RequestFailed(e.to_string()));
                    }

                    if attempt >= self.max_retries {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| HttpError::RequestFailed("unknown error".to_string())))
    }
}

/// Small deterministic-enough jitter for exponential backoff.
fn jitter() -> Duration {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    Duration::from_millis(hasher.finish() % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert!(config.user_agent.starts_with("surfacer/"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(HttpError::Timeout("t".into()).is_transient());
        assert!(HttpError::RateLimited(60).is_transient());
        assert!(!HttpError::NotFound.is_transient());
        assert!(!HttpError::AuthenticationFailed.is_transient());
        assert!(!HttpError::InvalidResponse("bad json".into()).is_transient());
    }

    #[tokio::test]
    async fn test_rate_limiter_admits_first_request_immediately() {
        let limiter = rate_limiter(5);
        // First token is available without waiting.
        assert!(limiter.check().is_ok());
    }
}
