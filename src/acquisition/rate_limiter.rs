//! Per-domain adaptive token bucket.
//!
//! Every target domain owns a budget that refills continuously at its
//! current rate, capped at the burst limit. A request takes one token; a
//! caller that finds the bucket empty reserves the next token anyway (the
//! balance goes negative) and sleeps for exactly the time the refill needs
//! to cover it. Reservations are made under the lock, sleeping happens
//! outside it, so one domain's queue never delays another domain.
//!
//! Independently of the refill rate, no one-second window ever holds more
//! than `burst_limit` grants: each budget remembers its last `burst_limit`
//! grant instants and a new grant waits until the oldest is a full second
//! behind it. This keeps the cap when the adapted rate exceeds 1 req/s.
//!
//! ## Adaptation
//!
//! Once per adjustment window, and only with enough observations, the
//! domain's rate is multiplied by `tighten_factor` when the error rate is
//! above `tighten_error_rate`, or by `loosen_factor` when it is below
//! `loosen_error_rate`. The result is kept within
//! `[min_rate_multiplier, max_rate_multiplier] x base rate`. This is a plain
//! multiplicative step controller; it makes no optimality claim.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::models::RateLimitConfig;

/// Span over which at most `burst_limit` grants are admitted.
const ADMISSION_WINDOW: Duration = Duration::from_secs(1);

/// Point-in-time view of one domain's budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSnapshot {
    /// Current admissions per second
    pub rate: f64,
    /// Token balance (negative while callers are queued)
    pub tokens: f64,
    /// Successes recorded in the current window
    pub successes: u64,
    /// Errors recorded in the current window
    pub errors: u64,
}

#[derive(Debug, Clone)]
struct RateBudget {
    tokens: f64,
    rate: f64,
    last_refill: Instant,
    successes: u64,
    errors: u64,
    window_start: Instant,
    /// Most recent grant instants, oldest first, at most `burst_limit`
    grants: VecDeque<Instant>,
}

impl RateBudget {
    fn new(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.burst_limit as f64,
            rate: config.requests_per_second,
            last_refill: now,
            successes: 0,
            errors: 0,
            window_start: now,
            grants: VecDeque::new(),
        }
    }

    fn refill(&mut self, now: Instant, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(burst);
        self.last_refill = now;
    }

    fn deficit_wait(&self, needed: f64) -> Duration {
        if self.tokens >= needed {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64((needed - self.tokens) / self.rate).unwrap_or(Duration::MAX)
    }

    /// Earliest instant a grant with `token_wait` may be admitted without
    /// putting more than `burst` grants in one admission window.
    fn admission_time(&self, now: Instant, token_wait: Duration, burst: usize) -> Instant {
        let mut at = now.checked_add(token_wait).unwrap_or(now);
        if let Some(last) = self.grants.back() {
            at = at.max(*last);
        }
        if burst > 0 && self.grants.len() >= burst {
            let oldest = self.grants[self.grants.len() - burst];
            at = at.max(oldest + ADMISSION_WINDOW);
        }
        at
    }

    fn record_grant(&mut self, at: Instant, burst: usize) {
        self.grants.push_back(at);
        while self.grants.len() > burst.max(1) {
            self.grants.pop_front();
        }
    }
}

/// Keep an adapted rate positive and within `[floor, ceiling]`; a
/// non-finite result keeps the previous rate.
fn bounded(rate: f64, floor: f64, ceiling: f64, previous: f64) -> f64 {
    if !rate.is_finite() || !(floor > 0.0) {
        return previous;
    }
    rate.clamp(floor, ceiling)
}

/// Adaptive per-domain rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    budgets: Mutex<HashMap<String, RateBudget>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            budgets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait until a request to `domain` may proceed.
    ///
    /// Never fails; only delays.
    pub async fn acquire(&self, domain: &str) {
        let wait = self.reserve(domain, Instant::now());
        if !wait.is_zero() {
            log::debug!("Rate limit: waiting {:.2}s for {}", wait.as_secs_f64(), domain);
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one token for `domain` and return how long the caller must wait
    /// before using it.
    fn reserve(&self, domain: &str, now: Instant) -> Duration {
        let mut budgets = self.lock();
        let budget = budgets
            .entry(domain.to_string())
            .or_insert_with(|| RateBudget::new(&self.config, now));

        self.adapt(domain, budget, now);
        let burst = self.config.burst_limit as usize;
        budget.refill(now, burst as f64);
        budget.tokens -= 1.0;

        let at = budget.admission_time(now, budget.deficit_wait(0.0), burst);
        budget.record_grant(at, burst);
        at.saturating_duration_since(now)
    }

    fn adapt(&self, domain: &str, budget: &mut RateBudget, now: Instant) {
        if now.saturating_duration_since(budget.window_start) < self.config.adjustment_window() {
            return;
        }
        let total = budget.successes + budget.errors;
        if total < self.config.min_observations {
            return;
        }

        // Bank tokens earned at the old rate before switching.
        budget.refill(now, self.config.burst_limit as f64);

        let base = self.config.requests_per_second;
        let floor = base * self.config.min_rate_multiplier;
        let ceiling = (base * self.config.max_rate_multiplier).max(floor);
        let error_rate = budget.errors as f64 / total as f64;
        let previous = budget.rate;

        if error_rate > self.config.tighten_error_rate {
            budget.rate = bounded(budget.rate * self.config.tighten_factor, floor, ceiling, previous);
            log::warn!(
                "Rate limit tightened for {}: {:.3} -> {:.3} req/s (error rate {:.1}%)",
                domain,
                previous,
                budget.rate,
                error_rate * 100.0
            );
        } else if error_rate < self.config.loosen_error_rate {
            budget.rate = bounded(budget.rate * self.config.loosen_factor, floor, ceiling, previous);
            log::info!(
                "Rate limit loosened for {}: {:.3} -> {:.3} req/s (error rate {:.1}%)",
                domain,
                previous,
                budget.rate,
                error_rate * 100.0
            );
        }

        budget.successes = 0;
        budget.errors = 0;
        budget.window_start = now;
    }

    pub fn record_success(&self, domain: &str) {
        self.with_budget(domain, |b| b.successes += 1);
    }

    pub fn record_error(&self, domain: &str) {
        self.with_budget(domain, |b| b.errors += 1);
    }

    /// Recommended wait before the next request to `domain`.
    pub fn delay_hint(&self, domain: &str) -> Duration {
        let now = Instant::now();
        let budgets = self.lock();
        match budgets.get(domain) {
            Some(budget) => {
                let mut projected = budget.clone();
                let burst = self.config.burst_limit as usize;
                projected.refill(now, burst as f64);
                projected
                    .admission_time(now, projected.deficit_wait(1.0), burst)
                    .saturating_duration_since(now)
            }
            None => Duration::ZERO,
        }
    }

    /// Current admission rate for `domain` (the base rate if unseen).
    pub fn current_rate(&self, domain: &str) -> f64 {
        self.lock()
            .get(domain)
            .map_or(self.config.requests_per_second, |b| b.rate)
    }

    pub fn snapshot(&self, domain: &str) -> Option<BudgetSnapshot> {
        self.lock().get(domain).map(|b| BudgetSnapshot {
            rate: b.rate,
            tokens: b.tokens,
            successes: b.successes,
            errors: b.errors,
        })
    }

    /// Forget everything known about `domain`.
    pub fn reset(&self, domain: &str) {
        self.lock().remove(domain);
    }

    fn with_budget(&self, domain: &str, f: impl FnOnce(&mut RateBudget)) {
        let now = Instant::now();
        let mut budgets = self.lock();
        let budget = budgets
            .entry(domain.to_string())
            .or_insert_with(|| RateBudget::new(&self.config, now));
        f(budget);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, RateBudget>> {
        // Budgets hold plain counters, so a poisoned map is still consistent.
        self.budgets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
