//! Scripted transport for exercising the client without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::client::{FetchError, PageResponse, Transport};

/// Replies to each URL with a queue of status codes, in order.
///
/// A successful reply carries the body `page N`, where `N` is the call
/// number for that URL.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<u16>>>,
    pages: HashMap<String, String>,
    calls: Mutex<HashMap<String, usize>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, url: &str, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), statuses.into_iter().collect());
        self
    }

    /// Serve `body` for every successful reply to `url`.
    pub(crate) fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<PageResponse, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let status = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match status {
            Some(status) => Ok(PageResponse {
                status,
                body: self
                    .pages
                    .get(url)
                    .cloned()
                    .unwrap_or_else(|| format!("page {call}")),
            }),
            None => Err(FetchError::Connect {
                url: url.to_string(),
                message: "no scripted response".to_string(),
            }),
        }
    }
}
