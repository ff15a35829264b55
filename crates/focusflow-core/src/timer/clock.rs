use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source for the controller.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall time anchored once, then advanced by the tokio monotonic clock.
///
/// Immune to system clock jumps while running, and follows tokio's paused
/// clock in tests.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    base_wall: DateTime<Utc>,
    base: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    pub fn anchored_at(base_wall: DateTime<Utc>) -> Self {
        Self {
            base_wall,
            base: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.base.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.base_wall + elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_tokio_time() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = MonotonicClock::anchored_at(base);
        assert_eq!(clock.now(), base);

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), base + chrono::Duration::seconds(90));
    }
}
