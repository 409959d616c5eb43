use std::time::Duration;

/// Consecutive-failure tracker with capped exponential delay.
///
/// The first failure waits `initial`, each further failure doubles it, up to
/// `max`. A success resets the streak.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    consecutive: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            consecutive: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive = self.consecutive.saturating_add(1);
        self.current()
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    /// Delay for the current streak (`initial` when there is none)
    pub fn current(&self) -> Duration {
        let exponent = self.consecutive.saturating_sub(1).min(31);
        self.initial
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}
