//! Minimum-interval rate limiter with adaptive backoff for the Last.fm
//! client.

use std::thread;
use std::time::{Duration, Instant};

/// Enforces a minimum interval between requests. The interval doubles on
/// failures (up to `max_interval`) and halves back towards the base after
/// `successes_to_reduce` consecutive successes.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    last_request: Option<Instant>,
    current_interval: Duration,
    base_interval: Duration,
    max_interval: Duration,
    success_count: u32,
    successes_to_reduce: u32,
}

impl RateLimiter {
    pub fn new(name: &str, base_interval: Duration, max_interval: Duration, successes_to_reduce: u32) -> Self {
        RateLimiter {
            name: name.to_string(),
            last_request: None,
            current_interval: base_interval,
            base_interval,
            max_interval,
            success_count: 0,
            successes_to_reduce,
        }
    }

    /// Max interval = 16x base, reduce after 10 successes.
    pub fn from_millis(name: &str, millis: u64) -> Self {
        let base = Duration::from_millis(millis);
        Self::new(name, base, base * 16, 10)
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    /// Time left before the next request may start.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleep if not enough time has elapsed since the last request.
    /// Must be called before making a request.
    pub fn wait_if_needed(&mut self) {
        let wait_time = self.time_until_ready();
        if !wait_time.is_zero() {
            tracing::trace!("[{}] rate limiting: waiting {:.2}s", self.name, wait_time.as_secs_f64());
            thread::sleep(wait_time);
        }
        self.last_request = Some(Instant::now());
    }

    pub fn report_success(&mut self) {
        if self.successes_to_reduce == 0 {
            return;
        }

        self.success_count += 1;

        if self.success_count >= self.successes_to_reduce && self.current_interval > self.base_interval {
            self.current_interval = (self.current_interval / 2).max(self.base_interval);
            tracing::debug!(
                "[{}] rate limit reduced to {:.2}s after {} successes",
                self.name,
                self.current_interval.as_secs_f64(),
                self.success_count
            );
            self.success_count = 0;
        }
    }

    pub fn report_failure(&mut self) {
        self.current_interval = (self.current_interval * 2).min(self.max_interval);
        tracing::debug!(
            "[{}] rate limit increased to {:.2}s due to error",
            self.name,
            self.current_interval.as_secs_f64()
        );
        self.success_count = 0;
    }
}
