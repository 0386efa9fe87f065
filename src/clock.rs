//! Time source abstraction for the circuit breaker's windows and open-delay
//! bookkeeping.

use std::time::Instant;

/// Thread-safe time source.
///
/// Readings are milliseconds since the implementer's origin. Implementations
/// must be safe to call concurrently and should document their monotonicity
/// guarantees; tests substitute manually advanced clocks.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds relative to the implementer's origin.
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `Instant::now()`.
///
/// Clones share the epoch captured at creation, so readings from clones are
/// directly comparable. Independently created instances are not.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a clock whose epoch is now.
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    /// Milliseconds elapsed since this instance's epoch, saturating on the
    /// theoretical overflow.
    fn now_millis(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readings_never_decrease() {
        let clock = MonotonicClock::new();
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn clones_share_epoch() {
        let clock = MonotonicClock::new();
        let clone = clock.clone();
        thread::sleep(Duration::from_millis(5));
        let diff = clock.now_millis().abs_diff(clone.now_millis());
        assert!(diff < 50, "clones diverged by {}ms", diff);
    }

    #[test]
    fn usable_as_shared_trait_object() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let c = clock.clone();
            handles.push(thread::spawn(move || {
                let _ = c.now_millis();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
