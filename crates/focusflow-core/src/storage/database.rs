//! SQLite-based session storage and statistics.
//!
//! Provides persistent storage for:
//! - Finished and aborted Pomodoro sessions
//! - Session statistics (daily and all-time)
//! - Key-value store for application state

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::data_dir;
use super::migrations;
use super::session_log::SessionStore;
use crate::error::{CoreError, DatabaseError, Result};
use crate::session::SessionRecord;
use crate::timer::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total_sessions: u64,
    pub completed_pomodoros: u64,
    pub total_focus_min: u64,
    pub total_break_min: u64,
    pub aborted_sessions: u64,
    pub today_pomodoros: u64,
    pub today_focus_min: u64,
}

const SESSION_COLUMNS: &str = "id, phase, started_at, ended_at, duration_min, completed";

type RawSession = (i64, String, String, String, u32, bool);

/// SQLite database for session storage.
///
/// Stores finished and aborted sessions and provides statistics.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/focusflow/focusflow.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("focusflow.db"))
    }

    /// Open (or create) the database file at `path`.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Custom("database connection lock poisoned".into()))
    }

    /// Append a session to the log, returning its row id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_session(&self, record: &SessionRecord) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (phase, started_at, ended_at, duration_min, completed)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.phase.as_str(),
                to_db_time(&record.started_at),
                to_db_time(&record.ended_at),
                record.duration_min,
                record.completed,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All sessions, newest start time first.
    pub fn sessions(&self) -> Result<Vec<SessionRecord>> {
        self.query_sessions(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC, id DESC"
        ))
    }

    /// Completed focus sessions, newest start time first.
    pub fn completed_focus_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.query_sessions(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE phase = 'FOCUS' AND completed = 1
             ORDER BY started_at DESC, id DESC"
        ))
    }

    pub fn count_completed_focus(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE phase = 'FOCUS' AND completed = 1",
            [],
            |row| row.get::<_, u64>(0),
        )?;
        Ok(count)
    }

    /// Sum of completed focus minutes; `None` when there are no such sessions.
    pub fn sum_completed_focus_minutes(&self) -> Result<Option<u64>> {
        let conn = self.conn()?;
        let sum = conn.query_row(
            "SELECT SUM(duration_min) FROM sessions WHERE phase = 'FOCUS' AND completed = 1",
            [],
            |row| row.get::<_, Option<u64>>(0),
        )?;
        Ok(sum)
    }

    fn query_sessions(&self, sql: &str) -> Result<Vec<SessionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(decode_session(row?)?);
        }
        Ok(out)
    }

    /// Statistics across every stored session, with "today" meaning at or
    /// after `today_start`.
    pub fn stats(&self, today_start: DateTime<Utc>) -> Result<Stats> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT phase, completed, COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             GROUP BY phase, completed",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, u64>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        let mut stats = Stats::default();
        for row in rows {
            let (phase, completed, count, minutes) = row?;
            stats.total_sessions += count;
            if !completed {
                stats.aborted_sessions += count;
            }
            match phase.parse::<Phase>() {
                Ok(Phase::Focus) if completed => {
                    stats.completed_pomodoros += count;
                    stats.total_focus_min += minutes;
                }
                Ok(Phase::Focus) => stats.total_focus_min += minutes,
                Ok(Phase::ShortBreak | Phase::LongBreak) => stats.total_break_min += minutes,
                Err(e) => tracing::warn!(error = %e, "skipping unknown phase in stats"),
            }
        }

        let (today_pomodoros, today_focus_min) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration_min), 0)
             FROM sessions
             WHERE phase = 'FOCUS' AND completed = 1 AND started_at >= ?1",
            params![to_db_time(&today_start)],
            |row| Ok((row.get::<_, u64>(0)?, row.get::<_, u64>(1)?)),
        )?;
        stats.today_pomodoros = today_pomodoros;
        stats.today_focus_min = today_focus_min;

        Ok(stats)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let result = conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, String>(0)
        });
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key from the kv store.
    pub fn kv_delete(&self, key: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl SessionStore for Database {
    fn insert(&self, record: &SessionRecord) -> Result<i64> {
        self.insert_session(record)
    }

    fn all(&self) -> Result<Vec<SessionRecord>> {
        self.sessions()
    }

    fn completed_focus(&self) -> Result<Vec<SessionRecord>> {
        self.completed_focus_sessions()
    }

    fn count_completed_focus(&self) -> Result<u64> {
        Database::count_completed_focus(self)
    }

    fn sum_completed_focus_minutes(&self) -> Result<Option<u64>> {
        Database::sum_completed_focus_minutes(self)
    }
}

/// Fixed-width UTC timestamps so lexical order matches chronological order.
fn to_db_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn from_db_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("bad timestamp '{raw}': {e}")))
}

fn corrupt(message: String) -> CoreError {
    DatabaseError::CorruptRow {
        table: "sessions".into(),
        message,
    }
    .into()
}

fn decode_session(raw: RawSession) -> Result<SessionRecord> {
    let (id, phase, started_at, ended_at, duration_min, completed) = raw;
    Ok(SessionRecord {
        id: Some(id),
        phase: phase.parse().map_err(corrupt)?,
        started_at: from_db_time(&started_at)?,
        ended_at: from_db_time(&ended_at)?,
        duration_min,
        completed,
    })
}
