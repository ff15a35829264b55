//! # FocusFlow Core Library
//!
//! Core logic for the FocusFlow Pomodoro timer. Every operation is available
//! through the `focusflow` CLI, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a deterministic state machine; the caller supplies
//!   the current time and drives `tick()`
//! - **Timer Controller**: async owner of the engine with a one-second
//!   ticker, settings watcher, and ordered side-effect dispatcher
//! - **Storage**: SQLite session log and TOML configuration
//! - **Sinks**: notification and sound traits the controller reports to
//!
//! ## Key Components
//!
//! - [`PomodoroEngine`]: Core timer state machine
//! - [`TimerController`]: Runtime wrapper exposing start/pause/reset/skip
//! - [`SettingsProvider`]: Observable duration settings
//! - [`SessionLog`]: Observable queries over recorded sessions
//! - [`Database`]: Session and statistics persistence

pub mod error;
pub mod events;
pub mod notify;
pub mod session;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError};
pub use events::Event;
pub use notify::{NotificationSink, SilentSound, SoundSink, TracingNotifier};
pub use session::SessionRecord;
pub use settings::{duration_for, SettingKey, Settings, SettingsProvider};
pub use storage::{Config, Database, SessionLog, SessionStore, Stats};
pub use timer::{
    Clock, MonotonicClock, Phase, PomodoroEngine, TimerController, TimerSnapshot, TimerState,
};
