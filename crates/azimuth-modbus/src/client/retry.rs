// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connect retry policy.
//!
//! Only connection establishment is retried. Register reads and writes are
//! attempted once; the poller's next cycle and the dashboard's resubmission
//! take care of the rest.

use std::time::Duration;

use rand::Rng;

// =============================================================================
// ConnectPolicy
// =============================================================================

/// How many times `connect` tries, and how long it waits in between.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectPolicy {
    /// Total attempts per `connect` call (at least one is always made).
    pub max_attempts: u32,
    /// Delay between attempts.
    pub strategy: RetryStrategy,
}

impl ConnectPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::Fixed(retry_delay),
        }
    }

    /// Exponential backoff between attempts.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            strategy: RetryStrategy::exponential(initial_delay, max_delay),
        }
    }

    /// A single attempt with no waiting.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Attempts actually made, never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.strategy.delay(attempt.saturating_sub(1))
    }
}

impl Default for ConnectPolicy {
    /// Five attempts, two seconds apart.
    fn default() -> Self {
        Self::fixed(5, Duration::from_secs(2))
    }
}

// =============================================================================
// RetryStrategy
// =============================================================================

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with optional jitter.
    Exponential(ExponentialBackoff),
}

impl RetryStrategy {
    /// Calculates the delay for the given retry number (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(duration) => *duration,
            Self::Exponential(exp) => exp.delay(retry),
        }
    }

    /// Creates an exponential backoff strategy without jitter.
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential(ExponentialBackoff::new(initial_delay, max_delay))
    }
}

// =============================================================================
// ExponentialBackoff
// =============================================================================

/// Exponential backoff: `initial_delay * multiplier^retry`, capped, with optional jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Initial delay for the first retry.
    pub initial_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Multiplier for each retry (default: 2.0).
    pub multiplier: f64,
    /// Jitter factor (0.0 = no jitter, 1.0 = up to 100% jitter).
    pub jitter_factor: f64,
}

impl ExponentialBackoff {
    /// Creates a new exponential backoff.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Calculates the delay for the given retry.
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let final_delay = if self.jitter_factor > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_policy() {
        let policy = ConnectPolicy::fixed(5, Duration::from_secs(2));
        assert_eq!(policy.attempts(), 5);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(2));
        assert_eq!(ConnectPolicy::default(), policy);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        assert_eq!(ConnectPolicy::fixed(0, Duration::ZERO).attempts(), 1);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = ConnectPolicy::exponential(
            4,
            Duration::from_millis(125),
            Duration::from_millis(500),
        );
        assert_eq!(policy.delay_after(1), Duration::from_millis(125));
        assert_eq!(policy.delay_after(2), Duration::from_millis(250));
        assert_eq!(policy.delay_after(3), Duration::from_millis(500));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
            .with_jitter(0.5);
        for _ in 0..50 {
            let d = backoff.delay(0);
            assert!(d >= Duration::from_millis(49) && d <= Duration::from_millis(151));
        }
    }
}
