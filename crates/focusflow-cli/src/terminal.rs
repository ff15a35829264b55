//! Terminal-backed notification and sound sinks.
//!
//! The notifier redraws a single status line and mirrors the last ongoing
//! state into the `kv` table, so `focusflow run --restore` can pick up a
//! countdown that a previous process left behind.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use focusflow_core::notify::{
    completion_title, ongoing_text, ongoing_title, COMPLETION_MESSAGE,
};
use focusflow_core::{Database, NotificationSink, Phase, SoundSink};
use serde::{Deserialize, Serialize};

const ONGOING_KEY: &str = "ongoing_timer";

/// What the ongoing display last showed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OngoingState {
    pub remaining_ms: u64,
    pub phase: Phase,
    pub running: bool,
    pub saved_at: DateTime<Utc>,
}

pub fn load_ongoing(db: &Database) -> Result<Option<OngoingState>, Box<dyn std::error::Error>> {
    match db.kv_get(ONGOING_KEY)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn save_ongoing(db: &Database, state: &OngoingState) -> Result<(), Box<dyn std::error::Error>> {
    db.kv_set(ONGOING_KEY, &serde_json::to_string(state)?)?;
    Ok(())
}

pub struct TerminalNotifier {
    db: Arc<Database>,
    /// Draw the status line; persistence happens either way.
    display: bool,
}

impl TerminalNotifier {
    pub fn new(db: Arc<Database>, display: bool) -> Self {
        Self { db, display }
    }

    fn draw(&self, line: &str) {
        if !self.display {
            return;
        }
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[2K{line}");
        let _ = out.flush();
    }
}

impl NotificationSink for TerminalNotifier {
    fn show_ongoing(&self, remaining_ms: u64, phase: Phase, is_running: bool) {
        self.draw(&format!(
            "{}  {}",
            ongoing_title(phase),
            ongoing_text(remaining_ms, is_running)
        ));

        let state = OngoingState {
            remaining_ms,
            phase,
            running: is_running,
            saved_at: Utc::now(),
        };
        if let Err(e) = save_ongoing(&self.db, &state) {
            tracing::warn!(error = %e, "could not persist ongoing timer");
        }
    }

    fn show_completion(&self, phase: Phase) {
        if self.display {
            println!("\r\x1b[2K{}  {COMPLETION_MESSAGE}", completion_title(phase));
        }
    }

    fn clear_ongoing(&self) {
        self.draw("");
        if let Err(e) = self.db.kv_delete(ONGOING_KEY) {
            tracing::warn!(error = %e, "could not clear persisted timer");
        }
    }
}

/// Rings the terminal bell when a phase completes.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl SoundSink for TerminalBell {
    fn play_phase_completion(&self, _phase: Phase) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(b"\x07");
        let _ = out.flush();
    }

    fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> (TerminalNotifier, Arc<Database>) {
        let db = Arc::new(Database::open_memory().unwrap());
        (TerminalNotifier::new(db.clone(), false), db)
    }

    #[test]
    fn ongoing_state_is_persisted_and_cleared() {
        let (sink, db) = notifier();
        assert_eq!(load_ongoing(&db).unwrap(), None);

        sink.show_ongoing(90_000, Phase::Focus, true);
        let saved = load_ongoing(&db).unwrap().unwrap();
        assert_eq!(saved.remaining_ms, 90_000);
        assert_eq!(saved.phase, Phase::Focus);
        assert!(saved.running);

        sink.show_ongoing(89_000, Phase::Focus, false);
        assert!(!load_ongoing(&db).unwrap().unwrap().running);

        sink.clear_ongoing();
        assert_eq!(load_ongoing(&db).unwrap(), None);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let (_, db) = notifier();
        db.kv_set(ONGOING_KEY, "not json").unwrap();
        assert!(load_ongoing(&db).is_err());
    }
}
