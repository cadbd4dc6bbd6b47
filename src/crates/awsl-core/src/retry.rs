//! Retry policies for node bodies.
//!
//! A node's `retry { attempts backoff policy }` block compiles into a
//! [`RetryPolicy`]. The engine re-invokes a failing body up to
//! `max_attempts` times total, sleeping the policy's delay between
//! attempts; after exhaustion the run fails with the last error.

use awsl_parser::{parse_duration, RetryConfig};
use rand::Rng;
use std::time::Duration;

/// How a failing node body is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first invocation.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// Double the delay after each failure when set.
    pub exponential: bool,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            exponential: true,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Build a policy from the parsed `retry` block. Unparseable backoff
    /// durations fall back to one second; any policy name other than
    /// `exponential` means fixed delay.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.attempts.max(1),
            base_delay: parse_duration(&config.backoff).unwrap_or(Duration::from_secs(1)),
            exponential: config.policy.eq_ignore_ascii_case("exponential"),
            jitter: true,
        }
    }

    /// Delay before retrying after the `failed_attempts`-th failure
    /// (1-based).
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let mut delay = if self.exponential {
            let factor = 2u32.saturating_pow(failed_attempts.saturating_sub(1).min(16));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };
        if self.jitter && !delay.is_zero() {
            let extra = rand::thread_rng().gen_range(0.0..0.25);
            delay = delay.mul_f64(1.0 + extra);
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(mut policy: RetryPolicy) -> RetryPolicy {
        policy.jitter = false;
        policy
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            attempts: 4,
            backoff: "2s".into(),
            policy: "exponential".into(),
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_secs(2));
        assert!(policy.exponential);
    }

    #[test]
    fn test_bad_backoff_falls_back() {
        let config = RetryConfig {
            attempts: 2,
            backoff: "soon".into(),
            policy: "fixed".into(),
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert!(!policy.exponential);
    }

    #[test]
    fn test_fixed_delay() {
        let policy = no_jitter(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            exponential: false,
            jitter: false,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_delay() {
        let policy = no_jitter(RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            exponential: true,
            jitter: false,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            exponential: false,
            jitter: true,
        };
        for _ in 0..20 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }
}
