//! Adaptive rate limiter for the Steam store endpoints.
//!
//! Epistemic foundation:
//! - K_i: The store answers 429 when polled too eagerly
//! - K_i: 429 errors require exponential backoff
//! - B_i: A `Retry-After` header, when present, is authoritative
//! - I^B: Exact store limits are undocumented → keep a minimum spacing

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest backoff after repeated 429s, also the cap for `Retry-After`.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Rate limit state for a single endpoint.
#[derive(Debug, Default)]
pub struct EndpointRateLimitState {
    /// Consecutive 429 errors (for backoff)
    pub consecutive_429s: u32,
    /// Backoff until this time
    pub backoff_until: Option<Instant>,
    /// When the last request was sent
    pub last_request_at: Option<Instant>,
}

impl EndpointRateLimitState {
    /// Get time to wait before proceeding.
    pub fn wait_time(&self, min_spacing: Duration) -> Duration {
        let now = Instant::now();
        let mut max_wait = Duration::ZERO;

        if let Some(backoff_until) = self.backoff_until.filter(|&t| t > now) {
            max_wait = max_wait.max(backoff_until - now);
        }

        if let Some(next_slot) = self.last_request_at.map(|t| t + min_spacing) {
            if next_slot > now {
                max_wait = max_wait.max(next_slot - now);
            }
        }

        max_wait
    }

    /// Record a 429 error and calculate backoff.
    ///
    /// A server-provided `retry_after` wins over the exponential schedule.
    pub fn record_429(&mut self, retry_after: Option<Duration>) {
        self.consecutive_429s += 1;
        let exponent = self.consecutive_429s.min(16);
        let backoff = retry_after
            .unwrap_or_else(|| Duration::from_secs(1u64 << exponent))
            .min(MAX_BACKOFF);
        self.backoff_until = Instant::now().checked_add(backoff);
        warn!(
            consecutive_429s = self.consecutive_429s,
            backoff_secs = backoff.as_secs(),
            "Rate limited (429), backing off"
        );
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        if self.consecutive_429s > 0 {
            self.consecutive_429s = 0;
            self.backoff_until = None;
        }
    }
}

/// Per-endpoint rate limiter.
///
/// Tracks backoff after 429s and keeps requests to one endpoint at least
/// `min_spacing` apart.
#[derive(Debug)]
pub struct RateLimiter {
    states: DashMap<String, EndpointRateLimitState>,
    min_spacing: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            states: DashMap::new(),
            min_spacing,
        }
    }

    /// Wait if necessary before calling the given endpoint, then reserve the slot.
    ///
    /// Returns the duration waited.
    pub async fn acquire(&self, endpoint: &str) -> Duration {
        let wait_time = {
            let state = self.states.entry(endpoint.to_string()).or_default();
            state.wait_time(self.min_spacing)
        };

        if wait_time > Duration::ZERO {
            debug!(
                endpoint = endpoint,
                wait_ms = wait_time.as_millis(),
                "Waiting for rate limit"
            );
            tokio::time::sleep(wait_time).await;
        }

        self.states
            .entry(endpoint.to_string())
            .or_default()
            .last_request_at = Some(Instant::now());
        wait_time
    }

    /// Record a request result.
    pub fn record_response(&self, endpoint: &str, status: u16, retry_after: Option<Duration>) {
        let mut state = self.states.entry(endpoint.to_string()).or_default();
        if status == 429 {
            state.record_429(retry_after);
        } else if status < 400 {
            state.record_success();
        }
    }
}
