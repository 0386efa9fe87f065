//! Sliding outcome counters backing the circuit breaker's thresholds.
//!
//! Two shapes behind one interface: a count-based ring over the last N
//! outcomes with O(1) eviction, and a time-based window dividing a period
//! into buckets that are zeroed as the clock rolls forward.

use crate::clock::Clock;
use std::sync::Arc;
use std::time::Duration;

/// Number of buckets a time-based window is divided into.
pub(crate) const TIME_WINDOW_BUCKETS: usize = 10;

#[derive(Debug)]
pub(crate) enum SlidingCounter {
    Count(CountWindow),
    Time(TimeWindow),
}

impl SlidingCounter {
    /// Ring over the most recent `capacity` outcomes (`capacity >= 1`).
    pub(crate) fn count(capacity: usize) -> Self {
        SlidingCounter::Count(CountWindow::new(capacity.max(1)))
    }

    /// Bucketed window spanning `period` on the given clock.
    pub(crate) fn time(period: Duration, clock: Arc<dyn Clock>) -> Self {
        SlidingCounter::Time(TimeWindow::new(period, TIME_WINDOW_BUCKETS, clock))
    }

    pub(crate) fn record(&mut self, success: bool) {
        match self {
            SlidingCounter::Count(w) => w.record(success),
            SlidingCounter::Time(w) => w.record(success),
        }
    }

    pub(crate) fn successes(&mut self) -> usize {
        match self {
            SlidingCounter::Count(w) => w.successes,
            SlidingCounter::Time(w) => w.totals().0,
        }
    }

    pub(crate) fn failures(&mut self) -> usize {
        match self {
            SlidingCounter::Count(w) => w.failures,
            SlidingCounter::Time(w) => w.totals().1,
        }
    }

    pub(crate) fn executions(&mut self) -> usize {
        self.successes() + self.failures()
    }

    /// Fraction of recorded outcomes that failed, in `[0, 1]`. Zero when
    /// nothing has been recorded.
    pub(crate) fn failure_rate(&mut self) -> f64 {
        let executions = self.executions();
        if executions == 0 {
            return 0.0;
        }
        self.failures() as f64 / executions as f64
    }
}

#[derive(Debug)]
pub(crate) struct CountWindow {
    ring: Vec<bool>,
    head: usize,
    filled: usize,
    successes: usize,
    failures: usize,
}

impl CountWindow {
    fn new(capacity: usize) -> Self {
        Self { ring: vec![false; capacity], head: 0, filled: 0, successes: 0, failures: 0 }
    }

    fn record(&mut self, success: bool) {
        let capacity = self.ring.len();
        if self.filled == capacity {
            // Evict the slot we are about to overwrite.
            if self.ring[self.head] {
                self.successes -= 1;
            } else {
                self.failures -= 1;
            }
        } else {
            self.filled += 1;
        }
        self.ring[self.head] = success;
        self.head = (self.head + 1) % capacity;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    successes: usize,
    failures: usize,
}

#[derive(Debug)]
pub(crate) struct TimeWindow {
    buckets: Vec<Bucket>,
    bucket_millis: u64,
    current: usize,
    current_start: u64,
    clock: Arc<dyn Clock>,
}

impl TimeWindow {
    fn new(period: Duration, buckets: usize, clock: Arc<dyn Clock>) -> Self {
        let total_millis = u64::try_from(period.as_millis()).unwrap_or(u64::MAX).max(1);
        let bucket_millis = (total_millis / buckets as u64).max(1);
        let now = clock.now_millis();
        Self {
            buckets: vec![Bucket::default(); buckets],
            bucket_millis,
            current: 0,
            current_start: now,
            clock,
        }
    }

    /// Advance the current bucket to cover `now`, zeroing every bucket whose
    /// span has fallen out of the window.
    fn roll(&mut self) {
        let now = self.clock.now_millis();
        let elapsed = now.saturating_sub(self.current_start);
        let steps = (elapsed / self.bucket_millis) as usize;
        if steps == 0 {
            return;
        }
        if steps >= self.buckets.len() {
            for bucket in &mut self.buckets {
                *bucket = Bucket::default();
            }
            self.current_start = now;
            return;
        }
        for _ in 0..steps {
            self.current = (self.current + 1) % self.buckets.len();
            self.buckets[self.current] = Bucket::default();
            self.current_start += self.bucket_millis;
        }
    }

    fn record(&mut self, success: bool) {
        self.roll();
        let bucket = &mut self.buckets[self.current];
        if success {
            bucket.successes += 1;
        } else {
            bucket.failures += 1;
        }
    }

    fn totals(&mut self) -> (usize, usize) {
        self.roll();
        self.buckets
            .iter()
            .fold((0, 0), |(s, f), b| (s + b.successes, f + b.failures))
    }
}
