use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

/// Bearer token for an external API. Passed explicitly per request; never stored globally.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    pub backoff: BackoffPolicy,
    pub rate_limit: Option<RateLimit>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 8,
            per_source_concurrency: 1,
            backoff: BackoffPolicy::default(),
            rate_limit: None,
        }
    }
}

/// Request budget: `burst` requests back to back, then one more per `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub burst: u32,
    pub interval: Duration,
}

/// Shared request budget across every source using one fetcher. Retries spend budget too.
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    state: Mutex<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    available: u32,
    refilled_at: Instant,
}

impl LimiterState {
    fn refill(&mut self, limit: RateLimit) {
        if limit.interval.is_zero() {
            self.available = limit.burst;
            return;
        }
        let earned = self.refilled_at.elapsed().as_nanos() / limit.interval.as_nanos();
        if earned == 0 {
            return;
        }
        let earned = u32::try_from(earned).unwrap_or(u32::MAX);
        self.available = self.available.saturating_add(earned).min(limit.burst);
        if self.available == limit.burst {
            self.refilled_at = Instant::now();
        } else {
            // keep the partial interval already waited
            self.refilled_at += limit.interval * earned;
        }
    }
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        let limit = RateLimit {
            burst: limit.burst.max(1),
            ..limit
        };
        Self {
            limit,
            state: Mutex::new(LimiterState {
                available: limit.burst,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Waits until a request slot is free and takes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill(self.limit);
                if state.available > 0 {
                    state.available -= 1;
                    return;
                }
                self.limit.interval.saturating_sub(state.refilled_at.elapsed())
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    /// 401: the credential was rejected. Never retried.
    #[error("credential rejected for {url}")]
    Unauthorized { url: String },
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Request(err) => err.status().map(|s| s.as_u16()),
            Self::Decode { .. } => None,
        }
    }
}

/// Shared rate-limited GET client: global and per-source concurrency caps, an optional request
/// budget, exponential backoff on 5xx/429 and transport errors.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    rate_limiter: Option<RateLimiter>,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            rate_limiter: config.rate_limit.map(RateLimiter::new),
            backoff: config.backoff,
        })
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limiter.as_ref().map(RateLimiter::limit)
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    pub async fn fetch_bytes(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", %run_id, source_id, url);
        self.fetch_with_retries(source_id, url, credential)
            .instrument(span)
            .await
    }

    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        run_id: Uuid,
        source_id: &str,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<T, FetchError> {
        let response = self.fetch_bytes(run_id, source_id, url, credential).await?;
        serde_json::from_slice(&response.body).map_err(|source| FetchError::Decode {
            url: response.final_url,
            source,
        })
    }

    async fn fetch_with_retries(
        &self,
        source_id: &str,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<FetchedResponse, FetchError> {
        // Semaphores are owned by `self` and never closed.
        let _global = self.global_limit.acquire().await.expect("semaphore not closed");
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source.acquire().await.expect("semaphore not closed");

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire().await;
            }

            let mut request = self.client.get(url);
            if let Some(credential) = credential {
                request =
                    request.header(reqwest::header::AUTHORIZATION, credential.header_value());
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        return Err(FetchError::Unauthorized { url: final_url });
                    }

                    let disposition = classify_status(status);
                    if disposition == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(status = status.as_u16(), attempt, "retryable status, backing off");
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    let disposition = classify_reqwest_error(&err);
                    if disposition == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        warn!(error = %err, attempt, "transport error, backing off");
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_logic_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(350));
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), RetryDisposition::Retryable);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), RetryDisposition::NonRetryable);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            RetryDisposition::NonRetryable
        );
    }

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::bearer("secret-token");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
        assert_eq!(credential.header_value(), "Bearer secret-token");
        assert!(Credential::bearer("  ").is_empty());
    }

    #[tokio::test]
    async fn limiter_spends_burst_then_waits_one_interval() {
        let limiter = RateLimiter::new(RateLimit {
            burst: 2,
            interval: Duration::from_millis(60),
        });
        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(50));
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn zero_burst_still_admits_one_request() {
        let limiter = RateLimiter::new(RateLimit {
            burst: 0,
            interval: Duration::from_secs(1),
        });
        assert_eq!(limiter.limit().burst, 1);
    }

    #[test]
    fn fetcher_carries_configured_rate_limit() {
        let limit = RateLimit {
            burst: 5,
            interval: Duration::from_millis(200),
        };
        let fetcher = HttpFetcher::new(HttpClientConfig {
            rate_limit: Some(limit),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(fetcher.rate_limit(), Some(limit));
        assert_eq!(HttpFetcher::new(HttpClientConfig::default()).unwrap().rate_limit(), None);
    }
}
