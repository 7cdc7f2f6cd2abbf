//! Time source for event timestamps and the scheduler budget.
//!
//! Everything the worker measures is wall-clock epoch seconds, the same unit
//! as the `time` field on lifecycle events. Reading time through [`Clock`]
//! lets tests drive the scheduler's staleness gate and budget without
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};

use backup_types::EpochSeconds;

/// A source of the current time.
pub trait Clock {
    /// Current time in epoch seconds.
    fn now(&self) -> EpochSeconds;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_precision_loss)]
    fn now(&self) -> EpochSeconds {
        let micros = chrono::Utc::now().timestamp_micros();
        micros as f64 / 1_000_000.0
    }
}

/// A clock that only moves when told to.
///
/// Each call to [`Clock::now`] returns the current reading and then advances
/// it by `step`, so a loop that polls the clock makes progress toward its
/// deadline even if nothing else moves time. A step of zero gives a frozen
/// clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_bits: AtomicU64,
    step_bits: AtomicU64,
}

impl ManualClock {
    /// A frozen clock reading `start`.
    pub fn frozen(start: EpochSeconds) -> Self {
        Self::with_step(start, 0.0)
    }

    /// A clock reading `start` that advances by `step` seconds per read.
    pub fn with_step(start: EpochSeconds, step: EpochSeconds) -> Self {
        Self {
            now_bits: AtomicU64::new(start.to_bits()),
            step_bits: AtomicU64::new(step.to_bits()),
        }
    }

    /// The current reading, without advancing.
    pub fn peek(&self) -> EpochSeconds {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }

    /// Jump to `at`.
    pub fn set(&self, at: EpochSeconds) {
        self.now_bits.store(at.to_bits(), Ordering::SeqCst);
    }

    /// Move forward by `by` seconds.
    pub fn advance(&self, by: EpochSeconds) {
        self.set(self.peek() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EpochSeconds {
        let step = f64::from_bits(self.step_bits.load(Ordering::SeqCst));
        let current = self.peek();
        self.set(current + step);
        current
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn frozen_clock_does_not_move() {
        let clock = ManualClock::frozen(42.0);
        assert_eq!(clock.now(), 42.0);
        assert_eq!(clock.now(), 42.0);
    }

    #[test]
    fn stepping_clock_advances_after_each_read() {
        let clock = ManualClock::with_step(100.0, 10.0);
        assert_eq!(clock.now(), 100.0);
        assert_eq!(clock.now(), 110.0);
        assert_eq!(clock.peek(), 120.0);
        clock.advance(5.0);
        assert_eq!(clock.now(), 125.0);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800.0);
    }
}
