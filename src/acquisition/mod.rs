// src/acquisition/mod.rs

//! Polite page acquisition.
//!
//! - [`rate_limiter`] - adaptive per-domain token buckets
//! - [`retry`] - classified retry with jittered exponential backoff
//! - [`client`] - the HTTP client combining both, single and batched

pub mod client;
pub mod rate_limiter;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{AcquisitionClient, FetchError, FetchOutcome, PageResponse, ReqwestTransport, Transport};
pub use rate_limiter::{BudgetSnapshot, RateLimiter};
pub use retry::{RetryError, RetryHandler, RetryPolicy, Retryable};
