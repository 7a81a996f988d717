//! Randomized spacing between consecutive calls.

use std::time::Duration;

use rand::Rng;

/// Delay before the next call is drawn uniformly from `[base, base + jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub base: Duration,
    pub jitter: Duration,
}

impl Pacing {
    pub const fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// No delay at all; handy for tests and dry runs.
    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rng.random_range(0..jitter_ms))
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_millis(2500), Duration::from_millis(3000))
    }
}
