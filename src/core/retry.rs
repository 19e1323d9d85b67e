use std::time::Duration;

const BACKOFF_FACTOR: u32 = 2;

/// Tracks consecutive failed refresh cycles and picks the next delay.
///
/// Without a base delay every cycle waits the full interval. With one, a
/// failed cycle is retried after `base`, doubling per further failure and
/// never exceeding the interval.
#[derive(Debug, Clone)]
pub struct RetryState {
    base_delay: Option<Duration>,
    consecutive_failures: u32,
}

impl RetryState {
    pub fn new(base_delay: Option<Duration>) -> Self {
        Self {
            base_delay,
            consecutive_failures: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn next_delay(&self, interval: Duration) -> Duration {
        let Some(base) = self.base_delay else {
            return interval;
        };

        if self.consecutive_failures == 0 {
            return interval;
        }

        let factor = BACKOFF_FACTOR.saturating_pow(self.consecutive_failures - 1);
        base.saturating_mul(factor).min(interval)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_in_backoff(&self) -> bool {
        self.consecutive_failures > 0
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(600);

    #[test]
    fn test_disabled_always_waits_interval() {
        let mut state = RetryState::default();
        assert_eq!(state.next_delay(INTERVAL), INTERVAL);

        state.record_failure();
        state.record_failure();
        assert!(state.is_in_backoff());
        assert_eq!(state.next_delay(INTERVAL), INTERVAL);
    }

    #[test]
    fn test_exponential_retry() {
        let mut state = RetryState::new(Some(Duration::from_secs(30)));
        assert_eq!(state.next_delay(INTERVAL), INTERVAL);

        state.record_failure();
        assert_eq!(state.next_delay(INTERVAL), Duration::from_secs(30));

        state.record_failure();
        assert_eq!(state.next_delay(INTERVAL), Duration::from_secs(60));

        state.record_failure();
        assert_eq!(state.next_delay(INTERVAL), Duration::from_secs(120));
    }

    #[test]
    fn test_retry_capped_at_interval() {
        let mut state = RetryState::new(Some(Duration::from_secs(30)));

        for _ in 0..100 {
            state.record_failure();
        }

        assert_eq!(state.consecutive_failures(), 100);
        assert_eq!(state.next_delay(INTERVAL), INTERVAL);
    }

    #[test]
    fn test_success_resets_retry() {
        let mut state = RetryState::new(Some(Duration::from_secs(30)));

        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures(), 2);

        state.record_success();
        assert_eq!(state.consecutive_failures(), 0);
        assert!(!state.is_in_backoff());
        assert_eq!(state.next_delay(INTERVAL), INTERVAL);
    }
}
