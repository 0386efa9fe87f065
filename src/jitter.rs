//! Jitter strategies for randomizing retry delays.
//!
//! Choosing a strategy:
//! - `None`: deterministic delays for tests or tightly controlled workflows.
//! - `Full`: uniform in `[0, delay]`, a good default to spread load.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor while randomizing.
//! - `Proportional(f)`: uniform in `[delay - f*delay, delay + f*delay]`.
//! - `Bounded(j)`: `delay` plus uniform extra in `[0, j]`.
//! - `Decorrelated`: stateful AWS-style jitter that grows from the previous
//!   sleep to avoid synchronized waves.
//!
//! RNG comes from `rand`'s thread-local generator; deterministic RNGs can be
//! injected through `apply_with_rng`. Millisecond conversions saturate to
//! `u64::MAX` for very large durations.

use rand::{rng, Rng};
use std::time::Duration;

/// Internal state for decorrelated jitter.
#[derive(Debug)]
pub struct DecorrelatedState {
    base: Duration,
    max: Duration,
    previous: std::sync::Mutex<Duration>,
}

impl Clone for DecorrelatedState {
    fn clone(&self) -> Self {
        let prev = *self.previous.lock().unwrap();
        Self { base: self.base, max: self.max, previous: std::sync::Mutex::new(prev) }
    }
}

/// Randomization applied to a computed backoff delay.
#[derive(Debug, Clone)]
pub enum Jitter {
    /// Use the exact backoff delay.
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// Uniform in `[delay/2, delay]`.
    Equal,
    /// Uniform in `[delay - factor*delay, delay + factor*delay]`; the factor
    /// must lie in `(0, 1]`.
    Proportional(f64),
    /// `delay` plus a uniform extra in `[0, bound]`.
    Bounded(Duration),
    /// AWS-style decorrelated jitter with internal state.
    Decorrelated(DecorrelatedState),
}

impl Jitter {
    /// Full jitter: uniform in `[0, delay]`.
    pub fn full() -> Self {
        Jitter::Full
    }

    /// Equal jitter: uniform in `[delay/2, delay]`.
    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Proportional jitter spreading the delay by `factor` in both directions.
    pub fn proportional(factor: f64) -> Result<Self, &'static str> {
        if factor <= 0.0 || factor > 1.0 || factor.is_nan() {
            return Err("proportional jitter: factor must be in (0, 1]");
        }
        Ok(Jitter::Proportional(factor))
    }

    /// Additive jitter bounded by `bound`.
    pub fn bounded(bound: Duration) -> Self {
        Jitter::Bounded(bound)
    }

    /// Decorrelated jitter growing from the previous sleep, clamped to
    /// `[base, max]`.
    pub fn decorrelated(base: Duration, max: Duration) -> Result<Self, &'static str> {
        if base > max {
            return Err("decorrelated jitter: base must not exceed max");
        }
        Ok(Jitter::Decorrelated(DecorrelatedState {
            base,
            max,
            previous: std::sync::Mutex::new(base),
        }))
    }

    /// Apply jitter to a delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_internal(delay, &mut rng)
    }

    /// Apply jitter with an injected RNG (deterministic tests).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        self.apply_internal(delay, rng)
    }

    fn as_millis_saturated(duration: Duration) -> u64 {
        duration.as_millis().try_into().unwrap_or(u64::MAX)
    }

    fn apply_internal<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => {
                let millis = Self::as_millis_saturated(delay);
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(0..=millis))
            }
            Jitter::Equal => {
                let millis = Self::as_millis_saturated(delay);
                if millis == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rng.random_range(millis / 2..=millis))
            }
            Jitter::Proportional(factor) => {
                let millis = Self::as_millis_saturated(delay);
                if millis == 0 {
                    return Duration::ZERO;
                }
                let spread = ((millis as f64) * factor).round() as u64;
                let low = millis.saturating_sub(spread);
                let high = millis.saturating_add(spread);
                Duration::from_millis(rng.random_range(low..=high))
            }
            Jitter::Bounded(bound) => {
                let extra = Self::as_millis_saturated(*bound);
                if extra == 0 {
                    return delay;
                }
                delay.saturating_add(Duration::from_millis(rng.random_range(0..=extra)))
            }
            Jitter::Decorrelated(state) => {
                // sleep = min(max, random(base, prev * 3))
                let base = Self::as_millis_saturated(state.base);
                let max = Self::as_millis_saturated(state.max);

                let mut prev = state.previous.lock().unwrap();
                let prev_millis = Self::as_millis_saturated(*prev);

                let upper = prev_millis.saturating_mul(3).min(max);
                let lower = base.min(upper);

                let next = rng.random_range(lower..=upper);
                *prev = Duration::from_millis(next);
                *prev
            }
        }
    }
}
