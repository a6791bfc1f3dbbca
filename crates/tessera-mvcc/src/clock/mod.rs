//! Global logical clock.
//!
//! The clock starts at zero, the timestamp of every genesis version, and is
//! advanced exactly once per commit that materializes at least one version.
//! Snapshots read the current value without advancing it.

use tessera_common::types::Timestamp;

/// A monotonically increasing commit counter.
#[derive(Debug, Default)]
pub struct LogicalClock {
    current: Timestamp,
}

impl LogicalClock {
    /// Creates a clock at [`Timestamp::ZERO`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current timestamp without advancing.
    pub fn now(&self) -> Timestamp {
        self.current
    }

    /// Advances the clock and returns the new timestamp.
    pub fn tick(&mut self) -> Timestamp {
        self.current = self.current.next();
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_at_zero() {
        let clock = LogicalClock::new();
        assert_eq!(clock.now(), Timestamp::ZERO);
    }

    #[test]
    fn test_tick_is_monotonic() {
        let mut clock = LogicalClock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(a < b);
        assert_eq!(clock.now(), b);
        assert_eq!(b, Timestamp::new(2));
    }
}
