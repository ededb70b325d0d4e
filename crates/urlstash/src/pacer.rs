//! Spacing between network requests.

use std::time::{Duration, Instant};

use rand::RngExt;

/// Jittered minimum spacing between requests.
///
/// Each wait is a uniformly random 0.5x to 1.5x of the configured delay,
/// measured from the completion of the previous request. The first request
/// never waits, and a zero delay disables pacing.
#[derive(Debug)]
pub(crate) struct Pacer {
    delay: Duration,
    previous: Option<Instant>,
}

impl Pacer {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            previous: None,
        }
    }

    /// How long the next request has to wait, as of `now`.
    fn wait_at(&self, now: Instant) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let Some(previous) = self.previous else {
            return Duration::ZERO;
        };
        let jittered = self.delay.mul_f64(rand::rng().random_range(0.5..=1.5));
        (previous + jittered).saturating_duration_since(now)
    }

    /// Sleep until the pacing window has passed.
    pub(crate) fn pause(&self) {
        let wait = self.wait_at(Instant::now());
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis(), "pacing before request");
            std::thread::sleep(wait);
        }
    }

    /// Record that a request just completed.
    pub(crate) fn mark(&mut self) {
        self.previous = Some(Instant::now());
    }
}
