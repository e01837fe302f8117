//! Bounded retry with backoff for optimistic-concurrency conflicts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
}

/// How many times a conflicting recompute is attempted and how long to wait
/// between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first (`1` = never retry).
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
    /// Spread (0.0-1.0) applied around the computed delay so that racing
    /// triggers do not retry in lockstep.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 200,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            max_attempts,
            base_delay_ms: ms,
            max_delay_ms: ms,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.base_delay_ms as f64;
        let cap = self.max_delay_ms.max(self.base_delay_ms) as f64;

        let delay = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => (base * 2_f64.powi(attempt.saturating_sub(1).min(30) as i32)).min(cap),
            BackoffStrategy::Linear => (base * attempt as f64).min(cap),
        };

        // Deterministic spread keyed on the attempt number.
        let range = delay * self.jitter.clamp(0.0, 1.0);
        let offset = if range > 0.0 {
            let unit = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            range * (unit - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay + offset).max(0.0) as u64)
    }

    /// Whether another attempt may follow failed attempt number `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_three_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(1));
    }

    #[test]
    fn exponential_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::exponential(10, Duration::from_millis(10), Duration::from_millis(50))
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn linear_and_fixed() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            jitter: 0.0,
            ..RetryPolicy::exponential(5, Duration::from_millis(5), Duration::from_millis(100))
        };
        assert_eq!(linear.delay_for_attempt(3), Duration::from_millis(15));

        let fixed = RetryPolicy::fixed(5, Duration::from_millis(7));
        assert_eq!(fixed.delay_for_attempt(4), Duration::from_millis(7));
    }

    #[test]
    fn jitter_stays_within_range() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::fixed(5, Duration::from_millis(100))
        };
        for attempt in 1..20 {
            let d = policy.delay_for_attempt(attempt).as_millis();
            assert!((50..=150).contains(&d), "attempt {attempt}: {d}ms");
        }
    }

    #[test]
    fn deserializes_partial_config() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5, "strategy": "linear"}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.strategy, BackoffStrategy::Linear);
        assert_eq!(policy.base_delay_ms, 10);
    }
}
