//! Backoff policy: decides retry delays.
//!
//! Shared by the Notifier (per-job delivery retries) and the Poller
//! (next-tick delay after source fetch failures), each with its own values.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Doubling backoff from `base_delay`, capped at `max_delay`.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            multiplier: 2.0,
        }
    }

    /// Delay before the attempt following failure number `attempt` (1-indexed).
    ///
    /// `min(base_delay * multiplier^(attempt - 1), max_delay)`
    ///
    /// With base=30s, max=300s:
    /// - attempt 1: 30s
    /// - attempt 2: 60s
    /// - attempt 3: 120s
    /// - attempt 4: 240s
    /// - attempt 5: 300s
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max_secs = self.max_delay.as_secs_f64();
        if !delay_secs.is_finite() || delay_secs >= max_secs {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::exponential(Duration::from_secs(30), Duration::from_secs(300))
    }

    #[test]
    fn exponential_backoff_increases() {
        let p = policy();
        assert_eq!(p.next_delay(1), Duration::from_secs(30));
        assert_eq!(p.next_delay(2), Duration::from_secs(60));
        assert_eq!(p.next_delay(3), Duration::from_secs(120));
        assert_eq!(p.next_delay(4), Duration::from_secs(240));
    }

    #[test]
    fn delay_is_capped() {
        let p = policy();
        assert_eq!(p.next_delay(5), Duration::from_secs(300));
        assert_eq!(p.next_delay(60), Duration::from_secs(300));
        assert_eq!(p.next_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        assert_eq!(policy().next_delay(0), Duration::from_secs(30));
    }

    #[test]
    fn max_below_base_is_raised_to_base() {
        let p = BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(1));
        assert_eq!(p.next_delay(3), Duration::from_secs(10));
    }
}
