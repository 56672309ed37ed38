//! System time tracking

use core::cell::Cell;

/// Millisecond tick counter, wraps after ~49 days
pub struct SystemClock {
    millis: Cell<u32>,
}

impl SystemClock {
    pub const fn new() -> Self {
        Self {
            millis: Cell::new(0),
        }
    }

    /// Count one millisecond
    #[inline]
    pub fn tick(&self) {
        self.advance(1);
    }

    #[inline]
    pub fn advance(&self, ms: u32) {
        self.millis.set(self.millis.get().wrapping_add(ms));
    }

    #[inline]
    pub fn now_ms(&self) -> u32 {
        self.millis.get()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds from `since` to `now` across a wrap
#[inline]
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Whether `deadline` has been reached, valid while the two are less than
/// half the counter range apart
#[inline]
pub fn is_due(now: u32, deadline: u32) -> bool {
    (now.wrapping_sub(deadline) as i32) >= 0
}
