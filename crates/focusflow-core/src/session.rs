//! Session history records and the accounting rule that produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Windows at or below this length are accidental taps and never recorded.
pub const MIN_SESSION_DURATION_MS: i64 = 5_000;

/// One finished or aborted phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Row id once stored; `None` for records not yet inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_min: u32,
    pub phase: Phase,
    /// True only when the countdown reached zero on its own.
    pub completed: bool,
}

impl SessionRecord {
    /// Build a record for the accounting window `[started_at, ended_at]`.
    ///
    /// Returns `None` when the window does not exceed
    /// [`MIN_SESSION_DURATION_MS`].
    pub fn from_window(
        phase: Phase,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        completed: bool,
    ) -> Option<Self> {
        let elapsed_ms = (ended_at - started_at).num_milliseconds();
        if elapsed_ms <= MIN_SESSION_DURATION_MS {
            return None;
        }
        Some(Self {
            id: None,
            started_at,
            ended_at,
            duration_min: u32::try_from(elapsed_ms / 60_000).unwrap_or(u32::MAX),
            phase,
            completed,
        })
    }

    pub fn is_completed_focus(&self) -> bool {
        self.completed && self.phase == Phase::Focus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_at_threshold_is_dropped() {
        let start = Utc::now();
        assert!(SessionRecord::from_window(Phase::Focus, start, start, false).is_none());
        assert!(SessionRecord::from_window(
            Phase::Focus,
            start,
            start + Duration::milliseconds(MIN_SESSION_DURATION_MS),
            false
        )
        .is_none());
    }

    #[test]
    fn window_above_threshold_is_recorded() {
        let start = Utc::now();
        let rec = SessionRecord::from_window(
            Phase::ShortBreak,
            start,
            start + Duration::milliseconds(MIN_SESSION_DURATION_MS + 1),
            false,
        )
        .unwrap();
        assert_eq!(rec.duration_min, 0);
        assert_eq!(rec.phase, Phase::ShortBreak);
        assert!(!rec.completed);
    }

    #[test]
    fn duration_is_floored_to_minutes() {
        let start = Utc::now();
        let rec = SessionRecord::from_window(
            Phase::Focus,
            start,
            start + Duration::seconds(25 * 60 + 59),
            true,
        )
        .unwrap();
        assert_eq!(rec.duration_min, 25);
        assert!(rec.is_completed_focus());
    }

    #[test]
    fn negative_window_is_dropped() {
        let start = Utc::now();
        assert!(
            SessionRecord::from_window(Phase::Focus, start, start - Duration::minutes(1), true)
                .is_none()
        );
    }
}
