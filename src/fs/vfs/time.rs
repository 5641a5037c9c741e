//! Inode Timestamps
//!
//! The VFS takes its notion of "now" from a pluggable [`Clock`]. Until the
//! embedder installs a real one, a logical clock is used that advances by one
//! second on every reading, so timestamps are strictly ordered.

use core::sync::atomic::{AtomicI64, Ordering};
use spin::RwLock;

/// Seconds + nanoseconds timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: u32,
}

impl Timespec {
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> Timespec;
}

/// Logical clock used when no wall clock is installed
pub struct TickClock {
    ticks: AtomicI64,
}

impl TickClock {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicI64::new(0),
        }
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TickClock {
    fn now(&self) -> Timespec {
        Timespec::new(self.ticks.fetch_add(1, Ordering::Relaxed) + 1, 0)
    }
}

static TICK_CLOCK: TickClock = TickClock::new();

static CLOCK: RwLock<&'static dyn Clock> = RwLock::new(&TICK_CLOCK);

/// Install the clock used for all subsequent timestamps
pub fn set_clock(clock: &'static dyn Clock) {
    *CLOCK.write() = clock;
}

/// Current time according to the installed clock
pub fn current_time() -> Timespec {
    CLOCK.read().now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_clock_is_strictly_increasing() {
        let clock = TickClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b > a);
    }

    #[test]
    fn test_current_time_advances() {
        let a = current_time();
        let b = current_time();
        assert!(b > a);
    }
}
