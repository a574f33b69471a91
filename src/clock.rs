/// Wall-clock abstraction
///
/// Every expiry comparison goes through a `Clock` so tests can move time
/// forward without sleeping.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar year of `now()`, used as the period key for identifiers.
    fn current_year(&self) -> i32 {
        self.now().year()
    }
}

/// System time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_mock_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let clock = MockClock::new(start);

        assert_eq!(clock.now(), start);
        assert_eq!(clock.current_year(), 2025);

        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));
        assert_eq!(clock.current_year(), 2026);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::default();
        let other = clock.clone();
        clock.advance(Duration::days(3));

        assert_eq!(clock.now(), other.now());
    }
}
