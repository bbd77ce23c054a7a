//! Scheduler configuration.

use std::time::Duration;

/// Recomputations an asynchronous flush performs before yielding.
pub const DEFAULT_YIELD_BUDGET: usize = 1000;

/// Delay before an asynchronous flush that yielded is resumed.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Tunables for the flush scheduler.
///
/// Installed per thread with [`crate::reactive::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// After this many recomputations, an asynchronous flush stops and
    /// reschedules itself. Synchronous flushes ignore it.
    pub yield_budget: usize,

    /// How long to wait before resuming a flush that hit the yield budget.
    pub retry_delay: Duration,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self {
            yield_budget: DEFAULT_YIELD_BUDGET,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_yield_budget(mut self, yield_budget: usize) -> Self {
        self.yield_budget = yield_budget;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.yield_budget, 1000);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
    }

    #[test]
    fn builder_overrides() {
        let config = SchedulerConfig::new()
            .with_yield_budget(5)
            .with_retry_delay(Duration::ZERO);
        assert_eq!(config.yield_budget, 5);
        assert_eq!(config.retry_delay, Duration::ZERO);
    }
}
