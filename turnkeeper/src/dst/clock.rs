//! Millisecond clock shared by the manager, its scorer and the simulation.
//!
//! `TigerStyle`: No code path reads the wall clock directly. A clock built
//! with [`SimClock::from_system_time`] follows the wall clock on every read;
//! any other clock only moves when a test advances it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::constants::DST_TIME_ADVANCE_MS_MAX;

/// Monotonic clock in milliseconds since the Unix epoch.
///
/// Clones read and move the same instant, so a test can hold one handle
/// and age the turns a manager holds through another.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    ms: Arc<AtomicU64>,
    follows_system: bool,
}

impl SimClock {
    /// Clock at the epoch.
    ///
    /// ```
    /// use turnkeeper::dst::SimClock;
    ///
    /// let clock = SimClock::new();
    /// let view = clock.clone();
    /// clock.advance_ms(250);
    /// assert_eq!(view.now_ms(), 250);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock at `ms`.
    #[must_use]
    pub fn at_ms(ms: u64) -> Self {
        Self {
            ms: Arc::new(AtomicU64::new(ms)),
            follows_system: false,
        }
    }

    /// Clock that catches up with the wall clock on every read.
    ///
    /// `advance_ms` still works and pushes the reading ahead of the wall
    /// clock until the wall clock passes it.
    #[must_use]
    pub fn from_system_time() -> Self {
        Self {
            follows_system: true,
            ..Self::at_ms(wall_ms())
        }
    }

    /// Check if reads sync to the wall clock.
    #[must_use]
    pub fn follows_system(&self) -> bool {
        self.follows_system
    }

    /// Current reading.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        if self.follows_system {
            return self.sync_to_system();
        }
        self.ms.load(Ordering::SeqCst)
    }

    /// Current reading as a UTC timestamp.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        ms_to_datetime(self.now_ms())
    }

    /// Move forward by `ms` and return the new reading.
    ///
    /// # Panics
    /// Panics if `ms` exceeds `DST_TIME_ADVANCE_MS_MAX`.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({DST_TIME_ADVANCE_MS_MAX})"
        );

        let before = self.ms.fetch_add(ms, Ordering::SeqCst);
        before.saturating_add(ms)
    }

    /// Catch up with the wall clock and return the new reading.
    ///
    /// A wall clock behind the current reading leaves it unchanged.
    pub fn sync_to_system(&self) -> u64 {
        let wall = wall_ms();
        let before = self.ms.fetch_max(wall, Ordering::SeqCst);
        before.max(wall)
    }
}

/// UTC timestamp for `ms`; the epoch if out of range.
#[must_use]
pub fn ms_to_datetime(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn wall_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIME_MS_PER_HOUR;

    #[test]
    fn test_advance_returns_new_reading() {
        let clock = SimClock::at_ms(5_000);

        assert_eq!(clock.advance_ms(1_000), 6_000);
        assert_eq!(clock.advance_ms(0), 6_000);
        assert_eq!(clock.now_ms(), 6_000);
    }

    #[test]
    fn test_handles_share_time() {
        let clock = SimClock::new();
        let handles: Vec<_> = (0..4).map(|_| clock.clone()).collect();

        for handle in &handles {
            handle.advance_ms(TIME_MS_PER_HOUR);
        }

        assert_eq!(clock.now_ms(), 4 * TIME_MS_PER_HOUR);
    }

    #[test]
    #[should_panic(expected = "exceeds max")]
    fn test_advance_is_bounded() {
        SimClock::new().advance_ms(DST_TIME_ADVANCE_MS_MAX + 1);
    }

    #[test]
    fn test_sync_only_moves_forward() {
        let ahead = SimClock::at_ms(u64::MAX / 2);
        assert_eq!(ahead.sync_to_system(), u64::MAX / 2);

        let behind = SimClock::new();
        let synced = behind.sync_to_system();
        assert!(synced > 0);
        assert_eq!(behind.now_ms(), synced);
    }

    #[test]
    fn test_system_clock_moves_on_its_own() {
        let clock = SimClock::from_system_time();
        assert!(clock.follows_system());
        assert!(!SimClock::at_ms(0).follows_system());

        let first = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now_ms() >= first + 5);

        let ahead = clock.advance_ms(TIME_MS_PER_HOUR);
        assert!(clock.now_ms() >= ahead);
    }

    #[test]
    fn test_manual_clock_stays_put() {
        let clock = SimClock::at_ms(42);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn test_datetime_conversion() {
        assert_eq!(SimClock::new().now(), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(
            SimClock::at_ms(1_500).now().timestamp_millis(),
            1_500
        );
        assert_eq!(ms_to_datetime(u64::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }
}
