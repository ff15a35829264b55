//! Timer engine implementation.
//!
//! The timer engine is a deterministic state machine. It does not use
//! internal threads or read the clock: every command takes the current
//! wall-clock time, and `tick()` takes the elapsed interval. The async
//! [`TimerController`](super::TimerController) drives it once per second.
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running <-> Paused
//! Running -> Finished -> Stopped (next phase loaded)
//! Running | Paused -> Stopped (reset / skip)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = PomodoroEngine::new(Settings::default());
//! engine.start(Utc::now());
//! // Once per second:
//! let events = engine.tick(1_000, Utc::now());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{Phase, Rotation};
use crate::events::Event;
use crate::session::SessionRecord;
use crate::settings::{duration_for, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerState {
    /// No countdown; the current phase is armed and ready.
    Stopped,
    Running,
    Paused,
    /// Transient: the countdown just hit zero and rotation is pending.
    Finished,
}

/// Read-only view of the engine, published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub phase: Phase,
    pub remaining_ms: u64,
    pub total_ms: u64,
    pub completed_focus_count: u32,
}

impl TimerSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }
}

/// Core pomodoro state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PomodoroEngine {
    settings: Settings,
    phase: Phase,
    state: TimerState,
    /// Remaining time of the current phase, always `<= total_ms`.
    remaining_ms: u64,
    /// Full duration the current phase was armed with.
    total_ms: u64,
    /// Start of the open accounting window, if any.
    session_started_at: Option<DateTime<Utc>>,
    /// Natural focus completions since the last long-break skip or reset.
    completed_focus_count: u32,
    /// Set once an external restore was applied or a live countdown ran to
    /// zero; later restores are ignored.
    restore_spent: bool,
}

impl PomodoroEngine {
    /// Create an engine in the `Stopped` state with a full focus phase armed.
    pub fn new(settings: Settings) -> Self {
        let settings = settings.sanitized();
        let total_ms = duration_for(Phase::Focus, &settings);
        Self {
            settings,
            phase: Phase::Focus,
            state: TimerState::Stopped,
            remaining_ms: total_ms,
            total_ms,
            session_started_at: None,
            completed_focus_count: 0,
            restore_spent: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub fn completed_focus_count(&self) -> u32 {
        self.completed_focus_count
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.session_started_at
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            state: self.state,
            phase: self.phase,
            remaining_ms: self.remaining_ms,
            total_ms: self.total_ms,
            completed_focus_count: self.completed_focus_count,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let resumed = match self.state {
            TimerState::Running => return Vec::new(),
            TimerState::Paused => true,
            TimerState::Stopped | TimerState::Finished => {
                // A restored-but-stopped phase keeps its reconstructed window.
                if self.session_started_at.is_none() {
                    self.session_started_at = Some(now);
                }
                if self.state == TimerState::Finished || self.remaining_ms == 0 {
                    self.arm(self.phase);
                }
                false
            }
        };

        self.state = TimerState::Running;
        tracing::debug!(phase = %self.phase, remaining_ms = self.remaining_ms, resumed, "timer started");

        vec![
            Event::TimerStarted {
                phase: self.phase,
                remaining_ms: self.remaining_ms,
                resumed,
                at: now,
            },
            self.ongoing(),
        ]
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        if self.state != TimerState::Running {
            return Vec::new();
        }
        self.state = TimerState::Paused;
        tracing::debug!(phase = %self.phase, remaining_ms = self.remaining_ms, "timer paused");

        vec![
            Event::TimerPaused {
                phase: self.phase,
                remaining_ms: self.remaining_ms,
                at: now,
            },
            self.ongoing(),
        ]
    }

    /// Abort the current phase and re-arm it from current settings.
    ///
    /// Also clears the focus completion count.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        if let Some(record) = self.close_window(now, false) {
            events.push(Event::SessionEnded { record });
        }
        self.session_started_at = None;

        self.arm(self.phase);
        self.completed_focus_count = 0;
        self.state = TimerState::Stopped;
        tracing::debug!(phase = %self.phase, "timer reset");

        events.push(Event::TimerReset {
            phase: self.phase,
            remaining_ms: self.remaining_ms,
            at: now,
        });
        events.push(Event::OngoingCleared);
        events
    }

    /// Abandon the current phase and move on using the skip rotation.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let mut events = Vec::new();
        let from = self.phase;
        let live = matches!(self.state, TimerState::Running | TimerState::Paused);

        if let Some(record) = self.close_window(now, false) {
            events.push(Event::SessionEnded { record });
        }
        self.session_started_at = None;

        // Only an abandoned live focus gives back a count, even when it was
        // too short to record.
        if live && from == Phase::Focus {
            self.completed_focus_count = self.completed_focus_count.saturating_sub(1);
        }
        let to = from.next(
            Rotation::Skip,
            self.completed_focus_count,
            self.settings.long_break_interval(),
        );
        if from == Phase::LongBreak {
            self.completed_focus_count = 0;
        }

        self.arm(to);
        self.state = TimerState::Stopped;
        tracing::debug!(%from, %to, "phase skipped");

        events.push(Event::TimerSkipped { from, to, at: now });
        events.push(self.ongoing());
        events
    }

    /// Advance the countdown by `elapsed_ms`. Finishes the phase at zero.
    pub fn tick(&mut self, elapsed_ms: u64, now: DateTime<Utc>) -> Vec<Event> {
        if self.state != TimerState::Running {
            return Vec::new();
        }
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
        if self.remaining_ms == 0 {
            return self.finish(now);
        }
        vec![self.ongoing()]
    }

    /// Adopt a snapshot handed back by an external surface after this
    /// engine's own state was lost.
    ///
    /// Applied at most once, only while `Stopped`, only for a positive
    /// `remaining_ms`, and never after a live countdown in this engine has
    /// run to zero. Anything else is a no-op.
    pub fn restore_external_state(
        &mut self,
        remaining_ms: i64,
        phase: Phase,
        is_running: bool,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        if self.restore_spent || self.state != TimerState::Stopped || remaining_ms <= 0 {
            tracing::debug!(
                restore_spent = self.restore_spent,
                state = ?self.state,
                remaining_ms,
                "external restore ignored"
            );
            return Vec::new();
        }
        self.restore_spent = true;

        self.arm(phase);
        self.remaining_ms = self.total_ms.min(remaining_ms.unsigned_abs());
        let elapsed_ms = self.total_ms - self.remaining_ms;
        self.session_started_at =
            Some(now - chrono::Duration::milliseconds(i64::try_from(elapsed_ms).unwrap_or(i64::MAX)));
        self.state = if is_running {
            TimerState::Paused
        } else {
            TimerState::Stopped
        };
        tracing::debug!(%phase, remaining_ms = self.remaining_ms, is_running, "external state restored");

        let mut events = vec![
            Event::TimerRestored {
                phase,
                remaining_ms: self.remaining_ms,
                running: is_running,
                at: now,
            },
            self.ongoing(),
        ];
        if is_running {
            events.extend(self.start(now));
        }
        events
    }

    /// Replace the settings used for future phase starts.
    ///
    /// An idle engine (stopped, no open window) re-arms its current phase
    /// immediately; anything in progress keeps its remaining time. Returns
    /// whether the armed duration changed.
    pub fn update_settings(&mut self, settings: Settings) -> bool {
        self.settings = settings.sanitized();
        if self.state == TimerState::Stopped && self.session_started_at.is_none() {
            let before = self.total_ms;
            self.arm(self.phase);
            return before != self.total_ms;
        }
        false
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish(&mut self, now: DateTime<Utc>) -> Vec<Event> {
        let finished = self.phase;
        self.remaining_ms = 0;
        self.state = TimerState::Finished;
        self.restore_spent = true;

        let mut events = Vec::new();
        if let Some(record) = self.close_window(now, true) {
            events.push(Event::SessionEnded { record });
        }
        self.session_started_at = None;
        events.push(Event::OngoingCleared);

        if finished == Phase::Focus {
            self.completed_focus_count += 1;
        }
        let next = finished.next(
            Rotation::Natural,
            self.completed_focus_count,
            self.settings.long_break_interval(),
        );
        self.arm(next);
        self.state = TimerState::Stopped;
        tracing::info!(phase = %finished, %next, count = self.completed_focus_count, "phase completed");

        events.push(Event::PhaseCompleted {
            phase: finished,
            next,
            completed_focus_count: self.completed_focus_count,
            at: now,
        });
        events
    }

    /// Load `phase` with its full duration from current settings.
    fn arm(&mut self, phase: Phase) {
        self.phase = phase;
        self.total_ms = duration_for(phase, &self.settings);
        self.remaining_ms = self.total_ms;
    }

    /// Close the accounting window if one is open for a live countdown.
    fn close_window(&mut self, now: DateTime<Utc>, completed: bool) -> Option<SessionRecord> {
        let live = matches!(
            self.state,
            TimerState::Running | TimerState::Paused | TimerState::Finished
        );
        if !live {
            return None;
        }
        let started = self.session_started_at.take()?;
        SessionRecord::from_window(self.phase, started, now, completed)
    }

    fn ongoing(&self) -> Event {
        Event::OngoingUpdated {
            phase: self.phase,
            remaining_ms: self.remaining_ms,
            running: self.state == TimerState::Running,
        }
    }
}

impl Default for PomodoroEngine {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
