//! Backoff policies consulted between delivery attempts.
//!
//! [`FemtoTransport`](crate::FemtoTransport) only relies on the
//! [`BackoffPolicy`] contract: ask for the next wait, and reset once a
//! `send_batch` call has finished. [`ExponentialBackoff`] is the default
//! implementation and grows the wait geometrically with symmetric jitter.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Default wait before the first retry.
pub const DEFAULT_MIN_TIMEOUT_MS: u64 = 100;
/// Default upper bound for a single wait.
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 10_000;
/// Default growth factor applied per attempt.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Default fraction of the interval used as jitter range.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// Stateful generator of wait durations between retries.
pub trait BackoffPolicy: Send {
    /// Return the next wait in milliseconds and advance the attempt counter.
    fn next_interval(&mut self) -> u64;

    /// Return to the initial state.
    fn reset(&mut self);
}

impl<P: BackoffPolicy + ?Sized> BackoffPolicy for Box<P> {
    fn next_interval(&mut self) -> u64 {
        (**self).next_interval()
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Exponential backoff with randomised jitter.
///
/// The interval for attempt `n` is `min_timeout_ms * multiplier^n`, moved up
/// or down by at most `randomization_factor` of itself, then capped at
/// `max_timeout_ms`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    min_timeout_ms: u64,
    max_timeout_ms: u64,
    multiplier: f64,
    randomization_factor: f64,
    attempts: u32,
    rng: StdRng,
}

impl ExponentialBackoff {
    /// Create a policy with explicit parameters.
    ///
    /// Parameters are taken as given; validation happens in
    /// [`BackoffOverrides`](crate::BackoffOverrides).
    pub fn new(
        min_timeout_ms: u64,
        max_timeout_ms: u64,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            min_timeout_ms,
            max_timeout_ms,
            multiplier,
            randomization_factor,
            attempts: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the entropy-seeded generator with a deterministic one.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Number of intervals handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn min_timeout_ms(&self) -> u64 {
        self.min_timeout_ms
    }

    pub fn max_timeout_ms(&self) -> u64 {
        self.max_timeout_ms
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn randomization_factor(&self) -> f64 {
        self.randomization_factor
    }

    fn add_jitter(&mut self, base: f64) -> f64 {
        if self.randomization_factor <= 0.0 {
            return base;
        }
        let draw: f64 = self.rng.r#gen();
        let deviation = draw * base * self.randomization_factor;
        if draw < 0.5 {
            base - deviation
        } else {
            base + deviation
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_TIMEOUT_MS,
            DEFAULT_MAX_TIMEOUT_MS,
            DEFAULT_MULTIPLIER,
            DEFAULT_RANDOMIZATION_FACTOR,
        )
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn next_interval(&mut self) -> u64 {
        let exponent = i32::try_from(self.attempts).unwrap_or(i32::MAX);
        let base = self.min_timeout_ms as f64 * self.multiplier.powi(exponent);
        let interval = self.add_jitter(base);
        self.attempts = self.attempts.saturating_add(1);

        let cap = self.max_timeout_ms as f64;
        if !interval.is_finite() || interval >= cap {
            return self.max_timeout_ms;
        }
        interval.max(0.0).round() as u64
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}
