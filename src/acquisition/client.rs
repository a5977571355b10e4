//! Rate-limited, retrying page acquisition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;

use super::rate_limiter::RateLimiter;
use super::retry::{RetryError, RetryHandler, RetryPolicy, Retryable};
use crate::error::Result;
use crate::models::{Config, HttpConfig};
use crate::utils::get_domain;

/// Failure of a single fetch attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to read body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("request to {url} could not be sent: {message}")]
    Request { url: String, message: String },

    #[error("URL has no host: {0}")]
    InvalidUrl(String),

    #[error("fetch of {0} was cancelled")]
    Cancelled(String),
}

impl FetchError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::Status { status: 429, .. })
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Connect { .. } | FetchError::Timeout { .. } | FetchError::Body { .. } => {
                true
            }
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Request { .. } | FetchError::InvalidUrl(_) | FetchError::Cancelled(_) => {
                false
            }
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// Raw network access, one request per call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<PageResponse, FetchError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    fn classify(url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_builder() || error.is_redirect() {
            FetchError::Request {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            FetchError::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> std::result::Result<PageResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "ja,en-US;q=0.7,en;q=0.3")
            .send()
            .await
            .map_err(|e| Self::classify(url, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(PageResponse { status, body })
    }
}

/// Result of one URL in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub url: String,
    pub result: std::result::Result<String, RetryError<FetchError>>,
}

/// Fetches pages through the per-domain rate limiter and the retry handler.
pub struct AcquisitionClient<T = ReqwestTransport> {
    transport: T,
    limiter: Arc<RateLimiter>,
    retry: RetryHandler,
}

impl AcquisitionClient<ReqwestTransport> {
    /// Build a client with a `reqwest` transport and a fresh rate limiter.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            ReqwestTransport::new(&config.http)?,
            Arc::new(RateLimiter::new(config.rate_limit.clone())),
            RetryHandler::new(RetryPolicy::from(&config.retry)),
        ))
    }
}

impl<T: Transport> AcquisitionClient<T> {
    pub fn new(transport: T, limiter: Arc<RateLimiter>, retry: RetryHandler) -> Self {
        Self {
            transport,
            limiter,
            retry,
        }
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch one page body.
    ///
    /// Each attempt, including retries, is admitted by the rate limiter of
    /// the URL's host and reported back to it.
    pub async fn fetch(&self, url: &str) -> std::result::Result<String, RetryError<FetchError>> {
        let domain = get_domain(url)
            .ok_or_else(|| RetryError::Terminal(FetchError::InvalidUrl(url.to_string())))?;

        self.retry
            .execute_with_retry(|_| self.attempt(url, &domain))
            .await
    }

    async fn attempt(&self, url: &str, domain: &str) -> std::result::Result<String, FetchError> {
        self.limiter.acquire(domain).await;
        log::debug!("Requesting: {}", url);

        match self.transport.get(url).await {
            Ok(response) if response.status < 400 => {
                self.limiter.record_success(domain);
                log::debug!("Success: {} ({})", url, response.status);
                Ok(response.body)
            }
            Ok(response) => {
                self.limiter.record_error(domain);
                log::warn!("HTTP error: {} ({})", url, response.status);
                Err(FetchError::Status {
                    url: url.to_string(),
                    status: response.status,
                })
            }
            Err(error) => {
                self.limiter.record_error(domain);
                log::warn!("Request failed: {} - {}", url, error);
                Err(error)
            }
        }
    }

    /// Fetch many pages with at most `max_concurrent` in flight.
    ///
    /// One URL failing never affects the others. Outcomes are returned in
    /// input order regardless of completion order.
    pub async fn fetch_many(&self, urls: &[String], max_concurrent: usize) -> Vec<FetchOutcome> {
        self.fetch_many_until(urls, max_concurrent, std::future::pending::<()>())
            .await
    }

    /// Like [`fetch_many`](Self::fetch_many), giving up on unfinished URLs
    /// once `timeout` elapses.
    pub async fn fetch_many_with_timeout(
        &self,
        urls: &[String],
        max_concurrent: usize,
        timeout: Option<Duration>,
    ) -> Vec<FetchOutcome> {
        match timeout {
            Some(limit) => {
                self.fetch_many_until(urls, max_concurrent, tokio::time::sleep(limit))
                    .await
            }
            None => self.fetch_many(urls, max_concurrent).await,
        }
    }

    /// Fetch many pages until `cancel` resolves.
    ///
    /// In-flight requests are dropped on cancellation; their entries, and
    /// those never started, report [`FetchError::Cancelled`].
    pub async fn fetch_many_until<C>(
        &self,
        urls: &[String],
        max_concurrent: usize,
        cancel: C,
    ) -> Vec<FetchOutcome>
    where
        C: Future<Output = ()>,
    {
        let mut results: Vec<Option<std::result::Result<String, RetryError<FetchError>>>> =
            urls.iter().map(|_| None).collect();

        {
            let mut pending = stream::iter(urls.iter().enumerate())
                .map(|(index, url)| async move { (index, self.fetch(url).await) })
                .buffer_unordered(max_concurrent.max(1));
            tokio::pin!(cancel);

            loop {
                tokio::select! {
                    next = pending.next() => match next {
                        Some((index, result)) => results[index] = Some(result),
                        None => break,
                    },
                    _ = &mut cancel => {
                        let unfinished = results.iter().filter(|r| r.is_none()).count();
                        log::warn!("Batch cancelled with {} of {} URLs unfinished", unfinished, urls.len());
                        break;
                    }
                }
            }
        }

        urls.iter()
            .zip(results)
            .map(|(url, result)| FetchOutcome {
                url: url.clone(),
                result: result.unwrap_or_else(|| {
                    Err(RetryError::Terminal(FetchError::Cancelled(url.clone())))
                }),
            })
            .collect()
    }
}
