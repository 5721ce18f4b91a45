//! Tick driving primitives.
//!
//! Engines never own a timer. A host calls [`Tickable::on_tick`] at its own
//! cadence (a display frame, a test loop, a virtual clock) and the engine
//! decides how much work is due. Everything that repeats can be stopped with
//! one [`CancelHandle::cancel`] call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a tickable wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Keep calling
    Active,

    /// Nothing left to do until the host changes something
    Idle,
}

/// Something driven by a host clock.
pub trait Tickable {
    /// Advances to host time `now`.
    fn on_tick(&mut self, now: Duration) -> TickStatus;
}

/// Shared cancellation flag.
///
/// Clones share the flag. Cancelling is idempotent and takes constant time.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates an uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every loop holding a clone of this handle.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fixed-period timer evaluated against host time.
///
/// Behaves like a repeating interval: the first tick is due one period
/// after the first observation, and late observations catch up by reporting
/// several due ticks at once.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next_due: Option<Duration>,
}

impl Interval {
    /// Creates an interval with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    /// The interval's period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns how many periods elapsed up to `now`.
    pub fn due(&mut self, now: Duration) -> u32 {
        if self.period.is_zero() {
            return 0;
        }
        let Some(mut next_due) = self.next_due else {
            self.next_due = Some(now + self.period);
            return 0;
        };
        let mut count = 0;
        while next_due <= now {
            count += 1;
            next_due += self.period;
        }
        self.next_due = Some(next_due);
        count
    }

    /// Forgets the schedule; the next observation starts a new period.
    pub fn restart(&mut self) {
        self.next_due = None;
    }
}
