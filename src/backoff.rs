//! Backoff strategies for computing retry delays.
//!
//! Attempt semantics: `delay(n)` is the suspension scheduled after attempt
//! `n` failed, so `delay(0)` (the initial call) is always zero and retries
//! start at `n = 1`. Computations that would overflow saturate at
//! [`MAX_BACKOFF`].

use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError {
    UnsupportedOption,
    MaxMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
    FactorMustExceedOne(f64),
}

impl std::fmt::Display for BackoffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffError::UnsupportedOption => {
                write!(f, "option not supported by this backoff strategy")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
            BackoffError::FactorMustExceedOne(factor) => {
                write!(f, "exponential factor must be >= 1.0 (got {})", factor)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

/// Delay strategy applied between retry attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// No delay between attempts.
    None,
    /// Fixed delay between attempts.
    Constant { delay: Duration },
    /// Linearly increasing delay with optional cap.
    Linear { base: Duration, max: Option<Duration> },
    /// Geometrically increasing delay with configurable factor and optional cap.
    Exponential { base: Duration, factor: f64, max: Option<Duration> },
}

impl Backoff {
    /// No delay at all. This is the retry policy's default.
    pub fn none() -> Self {
        Backoff::None
    }

    /// Fixed delay.
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant { delay }
    }

    /// Delay growing linearly with the attempt number.
    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base, max: None }
    }

    /// Delay doubling on each attempt (factor 2.0).
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, factor: 2.0, max: None }
    }

    /// Override the growth factor of an exponential backoff. Factors below
    /// 1.0 would shrink delays and are rejected, as are non-exponential
    /// strategies.
    pub fn with_factor(self, factor: f64) -> Result<Self, BackoffError> {
        if factor < 1.0 || factor.is_nan() {
            return Err(BackoffError::FactorMustExceedOne(factor));
        }
        match self {
            Backoff::Exponential { base, max, .. } => Ok(Backoff::Exponential { base, factor, max }),
            _ => Err(BackoffError::UnsupportedOption),
        }
    }

    /// Cap the delay of a linear or exponential backoff.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self {
            Backoff::Linear { base, max: existing } | Backoff::Exponential { base, max: existing, .. } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            Backoff::None | Backoff::Constant { .. } => Err(BackoffError::UnsupportedOption),
        }
    }

    /// Delay to schedule after attempt `attempt` failed (1-based; 0 means the
    /// initial call and yields zero).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { base, max } => {
                // Duration::checked_mul takes u32; clamp to avoid truncation.
                let n = attempt.min(u32::MAX as usize) as u32;
                let linear = base.checked_mul(n).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF);
                max.map(|m| linear.min(m)).unwrap_or(linear)
            }
            Backoff::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
                let secs = base.as_secs_f64() * factor.powi(exponent);
                let exp = if secs.is_finite() && secs < MAX_BACKOFF.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    MAX_BACKOFF
                };
                max.map(|m| exp.min(m)).unwrap_or(exp)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_never_delays() {
        let backoff = Backoff::none();
        assert_eq!(backoff.delay(1), Duration::ZERO);
        assert_eq!(backoff.delay(100), Duration::ZERO);
    }

    #[test]
    fn constant_returns_same_delay() {
        let backoff = Backoff::constant(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(50), Duration::from_secs(1));
    }

    #[test]
    fn attempt_zero_is_the_initial_call() {
        for backoff in [
            Backoff::none(),
            Backoff::constant(Duration::from_millis(50)),
            Backoff::linear(Duration::from_millis(50)),
            Backoff::exponential(Duration::from_millis(50)),
        ] {
            assert_eq!(backoff.delay(0), Duration::ZERO);
        }
    }

    #[test]
    fn linear_grows_with_attempt() {
        let backoff = Backoff::linear(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(5), Duration::from_millis(500));
    }

    #[test]
    fn exponential_doubles_by_default() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn exponential_honors_custom_factor() {
        let backoff =
            Backoff::exponential(Duration::from_millis(100)).with_factor(3.0).unwrap();
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(300));
        assert_eq!(backoff.delay(3), Duration::from_millis(900));
    }

    #[test]
    fn exponential_respects_cap() {
        let backoff = Backoff::exponential(Duration::from_millis(100))
            .with_max(Duration::from_secs(1))
            .unwrap();
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(20), Duration::from_secs(1));
    }

    #[test]
    fn overflow_saturates() {
        let exp = Backoff::exponential(Duration::from_secs(1));
        assert_eq!(exp.delay(1_000_000), MAX_BACKOFF);

        let linear = Backoff::linear(Duration::from_secs(u64::MAX / 2));
        assert_eq!(linear.delay(1_000_000_000), MAX_BACKOFF);
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert!(matches!(
            Backoff::constant(Duration::from_secs(1)).with_max(Duration::from_secs(2)),
            Err(BackoffError::UnsupportedOption)
        ));
        assert!(matches!(
            Backoff::linear(Duration::from_secs(10)).with_max(Duration::from_secs(5)),
            Err(BackoffError::MaxLessThanBase { .. })
        ));
        assert!(matches!(
            Backoff::exponential(Duration::from_secs(1)).with_factor(0.5),
            Err(BackoffError::FactorMustExceedOne(_))
        ));
        assert!(matches!(
            Backoff::linear(Duration::from_secs(1)).with_max(Duration::ZERO),
            Err(BackoffError::MaxMustBePositive)
        ));
    }
}
