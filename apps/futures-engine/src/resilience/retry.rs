//! Retry policy with exponential backoff for exchange calls.
//!
//! # Retryable Outcomes
//!
//! | Retryable | Non-Retryable |
//! |-----------|---------------|
//! | Network errors, timeouts | HTTP 400 with a validation code |
//! | HTTP 5xx, 408 | HTTP 401/403 (auth) |
//! | HTTP 429/418, code -1003 | Insufficient margin, bad symbol |
//! | Codes -1001, -1007, -1015, -1016 | Duplicate client order id |
//!
//! Delays grow exponentially with ±jitter and never decrease within one
//! call, so a slow-down from the exchange is never followed by a burst.

use std::time::Duration;

use rand::Rng;

/// Retry configuration for one logical exchange call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry (default: 500ms).
    pub initial_backoff: Duration,
    /// Delay ceiling (default: 5s).
    pub max_backoff: Duration,
    /// Growth factor between retries (default: 2.0).
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the base delay (default: 0.25 = ±25%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff calculator for a fresh call.
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoffCalculator {
        ExponentialBackoffCalculator::new(self)
    }
}

/// Backoff state for one logical call.
#[derive(Debug)]
pub struct ExponentialBackoffCalculator {
    retries: u32,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
    last_backoff_ms: u64,
}

impl ExponentialBackoffCalculator {
    /// Create a calculator from a policy.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            retries: 0,
            max_retries: policy.max_attempts.saturating_sub(1),
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
            last_backoff_ms: 0,
        }
    }

    /// Delay before the next retry, or `None` once attempts are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }

        let base = self.base_backoff_ms();
        let jittered = self.apply_jitter(base);
        let delay = jittered.max(self.last_backoff_ms).min(self.max_backoff_ms);

        self.retries += 1;
        self.last_backoff_ms = delay;
        Some(Duration::from_millis(delay))
    }

    /// Consume a retry using a server-provided delay, still capped.
    pub fn next_with_hint(&mut self, hint: Duration) -> Option<Duration> {
        let computed = self.next_backoff()?;
        let hinted = (hint.as_millis() as u64).min(self.max_backoff_ms);
        let delay = computed.max(Duration::from_millis(hinted));
        self.last_backoff_ms = delay.as_millis() as u64;
        Some(delay)
    }

    fn base_backoff_ms(&self) -> u64 {
        let multiplier = self.backoff_multiplier.powi(self.retries as i32);
        let backoff = (self.initial_backoff_ms as f64 * multiplier) as u64;
        backoff.min(self.max_backoff_ms)
    }

    fn apply_jitter(&self, backoff_ms: u64) -> u64 {
        if self.jitter_factor <= 0.0 || backoff_ms == 0 {
            return backoff_ms;
        }
        let spread = backoff_ms as f64 * self.jitter_factor;
        let low = (backoff_ms as f64 - spread).max(0.0);
        let high = backoff_ms as f64 + spread;
        rand::rng().random_range(low..=high) as u64
    }

    /// Retries consumed so far.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether another retry is allowed.
    #[must_use]
    pub const fn has_remaining_attempts(&self) -> bool {
        self.retries < self.max_retries
    }
}

/// Parse a `Retry-After` header given in seconds.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// HTTP statuses worth retrying regardless of body.
#[must_use]
pub const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500..=599)
}

/// HTTP statuses that signal a rate limit or IP ban.
#[must_use]
pub const fn is_rate_limit_status(status: u16) -> bool {
    matches!(status, 418 | 429)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.max_backoff, Duration::from_secs(5));
        assert!((policy.jitter_factor - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_backoff_sequence_without_jitter() {
        let policy = RetryPolicy {
            max_attempts: 5,
            jitter_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = policy.backoff();

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(1000)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(2000)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(4000)));
        assert!(backoff.next_backoff().is_none());
    }

    #[test]
    fn test_max_attempts_counts_first_try() {
        let mut backoff = RetryPolicy::default().backoff();
        assert!(backoff.next_backoff().is_some());
        assert!(backoff.next_backoff().is_some());
        assert!(backoff.next_backoff().is_none());
        assert_eq!(backoff.retries(), 2);

        let mut none = RetryPolicy::no_retry().backoff();
        assert!(none.next_backoff().is_none());
    }

    #[test]
    fn test_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 10.0,
            jitter_factor: 0.0,
        };
        let mut backoff = policy.backoff();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(1)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_jitter_range() {
        for _ in 0..100 {
            let mut backoff = RetryPolicy::default().backoff();
            let first = backoff.next_backoff().unwrap();
            assert!(
                first >= Duration::from_millis(375) && first <= Duration::from_millis(625),
                "{first:?} outside 375-625ms"
            );
        }
    }

    #[test]
    fn test_jitter_varies_between_runs() {
        let policy = RetryPolicy {
            max_attempts: 6,
            ..Default::default()
        };
        let run = || -> Vec<Duration> {
            let mut backoff = policy.backoff();
            std::iter::from_fn(|| backoff.next_backoff()).collect()
        };
        let first = run();
        let differs = (0..20).any(|_| run() != first);
        assert!(differs);
    }

    #[test]
    fn test_server_hint_is_capped() {
        let mut backoff = RetryPolicy::default().backoff();
        let delay = backoff.next_with_hint(Duration::from_secs(60)).unwrap();
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn test_status_classes() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(!is_retryable_status(400));
        assert!(is_rate_limit_status(418));
        assert!(is_rate_limit_status(429));
        assert!(!is_rate_limit_status(403));
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT").is_none());
    }

    proptest! {
        #[test]
        fn backoff_is_non_decreasing_and_capped(
            attempts in 2u32..12,
            initial_ms in 1u64..2_000,
            max_ms in 1u64..20_000,
            multiplier in 1.0f64..4.0,
            jitter in 0.0f64..0.5,
        ) {
            let policy = RetryPolicy {
                max_attempts: attempts,
                initial_backoff: Duration::from_millis(initial_ms),
                max_backoff: Duration::from_millis(max_ms),
                backoff_multiplier: multiplier,
                jitter_factor: jitter,
            };
            let mut backoff = policy.backoff();
            let mut previous = Duration::ZERO;
            let mut count = 0;
            while let Some(delay) = backoff.next_backoff() {
                prop_assert!(delay >= previous);
                prop_assert!(delay <= policy.max_backoff);
                previous = delay;
                count += 1;
            }
            prop_assert_eq!(count, attempts - 1);
        }
    }
}
