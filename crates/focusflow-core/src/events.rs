use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::SessionRecord;
use crate::timer::Phase;

/// Every state change in the system produces an Event.
///
/// The engine returns them from each command; the controller routes the ones
/// with side effects to the sinks and broadcasts all of them to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        remaining_ms: u64,
        /// True when continuing a paused countdown.
        resumed: bool,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerSkipped {
        from: Phase,
        to: Phase,
        at: DateTime<Utc>,
    },
    /// An external snapshot was accepted by `restore_external_state`.
    TimerRestored {
        phase: Phase,
        remaining_ms: u64,
        running: bool,
        at: DateTime<Utc>,
    },
    /// The ongoing display should show this state.
    OngoingUpdated {
        phase: Phase,
        remaining_ms: u64,
        running: bool,
    },
    /// The ongoing display should be torn down.
    OngoingCleared,
    /// A countdown reached zero; fired exactly once per natural completion.
    PhaseCompleted {
        phase: Phase,
        next: Phase,
        completed_focus_count: u32,
        at: DateTime<Utc>,
    },
    /// An accounting window closed and should be appended to the session log.
    SessionEnded { record: SessionRecord },
    /// Appending a session to the log failed; the timer kept going.
    SessionRecordFailed {
        record: SessionRecord,
        message: String,
    },
}

impl Event {
    /// Short machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::TimerStarted { .. } => "timer_started",
            Event::TimerPaused { .. } => "timer_paused",
            Event::TimerReset { .. } => "timer_reset",
            Event::TimerSkipped { .. } => "timer_skipped",
            Event::TimerRestored { .. } => "timer_restored",
            Event::OngoingUpdated { .. } => "ongoing_updated",
            Event::OngoingCleared => "ongoing_cleared",
            Event::PhaseCompleted { .. } => "phase_completed",
            Event::SessionEnded { .. } => "session_ended",
            Event::SessionRecordFailed { .. } => "session_record_failed",
        }
    }
}
