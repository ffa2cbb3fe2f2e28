//! Exponential backoff for transient provider failures.

use std::time::Duration;

/// Backoff schedule: `base_delay * factor^retry_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(base_delay: Duration, factor: u32) -> Self {
        Self { base_delay, factor }
    }

    /// Delay before retry number `retry_index` (0-based), or `None` once the
    /// budget is spent.
    #[must_use]
    pub fn delay_for(&self, retry_index: u32, budget: u32) -> Option<Duration> {
        if retry_index >= budget {
            return None;
        }
        let multiplier = self.factor.max(1).checked_pow(retry_index)?;
        self.base_delay.checked_mul(multiplier)
    }

    /// Every delay the budget allows, in order.
    #[must_use]
    pub fn schedule(&self, budget: u32) -> Vec<Duration> {
        (0..budget).map_while(|i| self.delay_for(i, budget)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_from_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(3),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
    }

    #[test]
    fn delays_strictly_increase() {
        let schedule = RetryPolicy::default().schedule(10);
        assert_eq!(schedule.len(), 10);
        assert!(schedule.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn budget_bounds_retries() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(2, 3).is_some());
        assert!(policy.delay_for(3, 3).is_none());
        assert!(policy.schedule(0).is_empty());
    }

    #[test]
    fn overflow_ends_schedule() {
        let policy = RetryPolicy::new(Duration::from_secs(1), 2);
        assert!(policy.delay_for(40, 100).is_none());
    }
}
