//! Rate-limited HTTP fetch layer shared by the provider clients.
//!
//! Each provider gets its own sliding-window limiter. A caller at capacity
//! blocks until the oldest request leaves the window; throttling responses
//! are retried with exponential backoff before surfacing as `RateLimited`.

use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Default window: 39 requests per 10 seconds (providers allow 40).
pub const DEFAULT_MAX_REQUESTS: usize = 39;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Successful fetch outcomes.
///
/// 404 is not an error: it means the provider has nothing for this item, and
/// callers treat it as zero candidates.
#[derive(Debug)]
pub enum FetchResponse {
    Json(Value),
    NotFound,
}

/// Fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{service}: network error: {message}")]
    Network { service: String, message: String },

    #[error("{service}: rate limit exhausted after {attempts} attempts")]
    RateLimited { service: String, attempts: u32 },
}

/// Sliding window rate limiter.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Block until a request slot is free, then claim it.
    ///
    /// Holding the lock across the sleep serializes callers, which is the
    /// backpressure we want: nobody may race past the window.
    pub async fn acquire(&self, service: &str) {
        let mut stamps = self.timestamps.lock().await;

        loop {
            let now = Instant::now();
            while stamps
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.window)
            {
                stamps.pop_front();
            }

            if stamps.len() < self.max_requests {
                stamps.push_back(now);
                return;
            }

            let oldest = *stamps.front().expect("window at capacity");
            let wait = self.window.saturating_sub(now.duration_since(oldest))
                + Duration::from_millis(100);
            tracing::debug!(
                service,
                used = stamps.len(),
                max = self.max_requests,
                wait_ms = wait.as_millis() as u64,
                "Rate limit window full, waiting"
            );
            sleep(wait).await;
        }
    }
}

/// Per-provider HTTP client enforcing the sliding window and backoff policy.
pub struct RateLimitedFetcher {
    client: reqwest::Client,
    limiter: RateLimiter,
    service: String,
    max_retries: u32,
    base_backoff: Duration,
}

impl RateLimitedFetcher {
    pub fn new(service: impl Into<String>, max_requests: usize, window: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("artfetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");

        Self {
            client,
            limiter: RateLimiter::new(max_requests, window),
            service: service.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: DEFAULT_BASE_BACKOFF,
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    /// Fetch a JSON document.
    ///
    /// Retries 429 with exponentially doubling backoff and transient I/O
    /// errors with the same schedule. Other 4xx/5xx fail immediately.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<FetchResponse, FetchError> {
        let mut attempt = 0u32;

        loop {
            self.limiter.acquire(&self.service).await;

            tracing::debug!(service = %self.service, url = %redact_query(url), "GET");

            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(
                        service = %self.service,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "Transient error, retrying: {}", e
                    );
                    sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => {
                    return Err(FetchError::Network {
                        service: self.service.clone(),
                        message: e.to_string(),
                    });
                }
            };

            let status = response.status();

            if status.as_u16() == 429 {
                if attempt < self.max_retries {
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(
                        service = %self.service,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        backoff_secs = backoff.as_secs(),
                        "Throttled (429), backing off"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
                return Err(FetchError::RateLimited {
                    service: self.service.clone(),
                    attempts: attempt + 1,
                });
            }

            if status.as_u16() == 404 {
                tracing::debug!(service = %self.service, "404, no data available");
                return Ok(FetchResponse::NotFound);
            }

            if !status.is_success() {
                return Err(FetchError::Network {
                    service: self.service.clone(),
                    message: format!("HTTP {}", status),
                });
            }

            return response
                .json::<Value>()
                .await
                .map(FetchResponse::Json)
                .map_err(|e| FetchError::Network {
                    service: self.service.clone(),
                    message: format!("invalid JSON: {}", e),
                });
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.pow(attempt)
    }
}

/// Strip query strings from logged URLs; they can carry API keys.
fn redact_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limiter_allows_burst_up_to_cap() {
        let limiter = RateLimiter::new(39, Duration::from_secs(10));

        let start = Instant::now();
        for _ in 0..39 {
            limiter.acquire("test").await;
        }
        // Full burst admitted without waiting.
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_delays_request_past_cap() {
        let limiter = RateLimiter::new(39, Duration::from_secs(10));

        for _ in 0..39 {
            limiter.acquire("test").await;
        }

        // The 40th request must wait for the window to advance, not error.
        let start = Instant::now();
        limiter.acquire("test").await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));

        limiter.acquire("test").await;
        limiter.acquire("test").await;
        tokio::time::advance(Duration::from_millis(1500)).await;

        // Both earlier timestamps left the window; no wait needed.
        let start = Instant::now();
        limiter.acquire("test").await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[test]
    fn test_backoff_doubles() {
        let fetcher = RateLimitedFetcher::new("test", 39, Duration::from_secs(10))
            .with_retry_policy(3, Duration::from_secs(2));
        assert_eq!(fetcher.backoff_for(0), Duration::from_secs(2));
        assert_eq!(fetcher.backoff_for(1), Duration::from_secs(4));
        assert_eq!(fetcher.backoff_for(2), Duration::from_secs(8));
    }

    #[test]
    fn test_redact_query() {
        assert_eq!(
            redact_query("https://api.example.com/3/movie?api_key=secret"),
            "https://api.example.com/3/movie"
        );
        assert_eq!(redact_query("plain"), "plain");
    }
}
