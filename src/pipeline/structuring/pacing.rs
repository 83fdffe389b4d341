//! Per-minute token budget for hosted backends.
//!
//! Each request pessimistically consumes a fixed estimate before it is sent.
//! Response headers (`x-ratelimit-remaining-tokens-minute`,
//! `x-ratelimit-reset-tokens-minute`) resynchronise the budget with the
//! provider's own accounting. When the estimate no longer fits, the caller
//! waits until the advertised reset and the budget is refilled.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;

pub const REMAINING_TOKENS_HEADER: &str = "x-ratelimit-remaining-tokens-minute";
pub const RESET_TOKENS_HEADER: &str = "x-ratelimit-reset-tokens-minute";

/// Default per-request estimate when none is configured.
pub const DEFAULT_REQUEST_ESTIMATE: u32 = 10_000;
/// Slack added after the advertised reset before the budget is trusted again.
const RESET_MARGIN: Duration = Duration::from_secs(1);
/// Upper bound on an advertised reset. The budget is per minute.
const MAX_RESET_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct BudgetState {
    remaining: i64,
    reset_at: Option<Instant>,
}

#[derive(Debug)]
pub struct TokenBudget {
    capacity: u32,
    request_estimate: u32,
    state: Mutex<BudgetState>,
}

impl TokenBudget {
    pub fn new(tokens_per_minute: u32) -> Self {
        Self::with_estimate(tokens_per_minute, DEFAULT_REQUEST_ESTIMATE.min(tokens_per_minute))
    }

    pub fn with_estimate(tokens_per_minute: u32, request_estimate: u32) -> Self {
        Self {
            capacity: tokens_per_minute,
            request_estimate,
            state: Mutex::new(BudgetState {
                remaining: i64::from(tokens_per_minute),
                reset_at: None,
            }),
        }
    }

    /// Wait until the budget admits one more request, then consume the estimate.
    pub async fn acquire(&self) {
        if let Some(wait) = self.pending_wait() {
            tracing::warn!(
                wait_secs = wait.as_secs_f32(),
                estimate = self.request_estimate,
                "Token budget exhausted, pausing until reset"
            );
            tokio::time::sleep(wait + RESET_MARGIN).await;
            self.refill();
        }
        self.consume();
    }

    /// Resynchronise from provider response headers.
    pub fn sync_headers(&self, headers: &HeaderMap) {
        let read = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        self.sync(read(REMAINING_TOKENS_HEADER), read(RESET_TOKENS_HEADER));
    }

    /// `reset` is seconds until the window resets; a trailing `s` is tolerated.
    pub fn sync(&self, remaining: Option<&str>, reset: Option<&str>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(n) = remaining.and_then(|r| r.trim().parse::<i64>().ok()) {
            state.remaining = n;
        }
        if let Some(wait) = reset
            .map(|r| r.trim().trim_end_matches('s'))
            .and_then(|r| r.parse::<f64>().ok())
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        {
            state.reset_at = Instant::now().checked_add(wait.min(MAX_RESET_WAIT));
        }
    }

    pub fn remaining(&self) -> i64 {
        self.state.lock().map(|s| s.remaining).unwrap_or(0)
    }

    fn pending_wait(&self) -> Option<Duration> {
        let state = self.state.lock().ok()?;
        if state.remaining >= i64::from(self.request_estimate) {
            return None;
        }
        let reset_at = state.reset_at?;
        let wait = reset_at.saturating_duration_since(Instant::now());
        (!wait.is_zero()).then_some(wait)
    }

    fn refill(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.remaining = i64::from(self.capacity);
            state.reset_at = None;
        }
    }

    fn consume(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.remaining -= i64::from(self.request_estimate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_consumes_estimate() {
        let budget = TokenBudget::with_estimate(60_000, 10_000);
        budget.acquire().await;
        assert_eq!(budget.remaining(), 50_000);
    }

    #[test]
    fn headers_override_local_accounting() {
        let budget = TokenBudget::new(60_000);
        let mut headers = HeaderMap::new();
        headers.insert(REMAINING_TOKENS_HEADER, "1234".parse().unwrap());
        headers.insert(RESET_TOKENS_HEADER, "12.5s".parse().unwrap());
        budget.sync_headers(&headers);
        assert_eq!(budget.remaining(), 1234);
        assert!(budget.pending_wait().is_some());
    }

    #[test]
    fn unparseable_headers_are_ignored() {
        let budget = TokenBudget::new(60_000);
        budget.sync(Some("lots"), Some("soon"));
        assert_eq!(budget.remaining(), 60_000);
    }

    #[tokio::test]
    async fn exhausted_budget_without_reset_does_not_block() {
        let budget = TokenBudget::with_estimate(5_000, 4_000);
        budget.acquire().await;
        budget.acquire().await;
        assert_eq!(budget.remaining(), -3_000);
    }

    #[test]
    fn hostile_reset_headers_are_ignored_or_clamped() {
        let budget = TokenBudget::with_estimate(60_000, 10_000);
        for reset in ["-5", "NaN", "inf", "1e300"] {
            budget.sync(Some("10"), Some(reset));
            assert!(budget.pending_wait().is_none(), "reset {reset}");
        }

        budget.sync(Some("10"), Some("1e12"));
        let wait = budget.pending_wait().unwrap();
        assert!(wait <= MAX_RESET_WAIT);
    }

    #[test]
    fn elapsed_reset_means_no_wait() {
        let budget = TokenBudget::with_estimate(60_000, 10_000);
        budget.sync(Some("10"), Some("0"));
        assert!(budget.pending_wait().is_none());
    }
}
