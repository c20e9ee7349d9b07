//! Reconnect policies
//!
//! The client never computes backoff itself. After every failed attempt or dropped
//! session it asks the configured [`RetryPolicy`] for the next delay and gives up
//! when the policy returns `None`.

use std::time::Duration;

/// What the client knows about the reconnect cycle in progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryContext {
    /// Retries already made in this cycle (0 before the first retry)
    pub previous_retry_count: u32,
    /// Time since the cycle started (initial connect or transport drop)
    pub elapsed: Duration,
    /// Why the last attempt failed or the session ended
    pub retry_reason: String,
}

/// Decides how long to wait before the next connection attempt
pub trait RetryPolicy: Send + Sync + 'static {
    /// Delay before the next attempt, or `None` to stop retrying
    fn next_retry_delay(&self, context: &RetryContext) -> Option<Duration>;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RetryContext) -> Option<Duration> + Send + Sync + 'static,
{
    fn next_retry_delay(&self, context: &RetryContext) -> Option<Duration> {
        self(context)
    }
}

/// Walks a fixed list of delays, then gives up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDelays {
    delays: Vec<Duration>,
}

impl FixedDelays {
    pub fn new(delays: impl Into<Vec<Duration>>) -> Self {
        Self {
            delays: delays.into(),
        }
    }
}

impl Default for FixedDelays {
    /// 0s, 2s, 10s, 30s
    fn default() -> Self {
        Self::new([0, 2, 10, 30].map(Duration::from_secs))
    }
}

impl RetryPolicy for FixedDelays {
    fn next_retry_delay(&self, context: &RetryContext) -> Option<Duration> {
        self.delays
            .get(context.previous_retry_count as usize)
            .copied()
    }
}

/// Doubles the delay after every retry, capped at `max_delay`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Give up after this many retries; retry forever when `None`
    pub max_retries: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_retries: None,
        }
    }

    /// Stop after `retries` retries
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_retry_delay(&self, context: &RetryContext) -> Option<Duration> {
        let attempt = context.previous_retry_count;
        if self.max_retries.is_some_and(|max| attempt >= max) {
            return None;
        }

        let factor = 2u32.saturating_pow(attempt);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// Never retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_retry_delay(&self, _context: &RetryContext) -> Option<Duration> {
        None
    }
}
