use std::time::Duration;

/// A room's authoritative game time, in milliseconds.
///
/// Only moves at tick boundaries and never goes backwards except through
/// an explicit [`reset`](Self::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameClock {
    now_ms: u64,
}

impl GameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Moves the clock forward by `dt` and returns the new time.
    pub fn advance(&mut self, dt: Duration) -> u64 {
        let step = u64::try_from(dt.as_millis()).unwrap_or(u64::MAX);
        self.now_ms = self.now_ms.saturating_add(step);
        self.now_ms
    }

    /// Back to zero, for a new epoch.
    pub fn reset(&mut self) {
        self.now_ms = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_accumulates() {
        let mut clock = GameClock::new();
        assert_eq!(clock.advance(Duration::from_millis(50)), 50);
        assert_eq!(clock.advance(Duration::from_millis(50)), 100);
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut clock = GameClock::new();
        clock.advance(Duration::from_secs(3));
        clock.reset();
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn test_advance_saturates() {
        let mut clock = GameClock { now_ms: u64::MAX - 1 };
        assert_eq!(clock.advance(Duration::from_millis(10)), u64::MAX);
    }
}
