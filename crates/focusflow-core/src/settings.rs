//! User-configurable durations and the observable provider that serves them.
//!
//! The four values live in the `[schedule]` section of the TOML config. The
//! provider publishes each one on its own `watch` channel plus an aggregate
//! channel the timer controller listens to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tokio::sync::watch;

use crate::error::{ConfigError, Result};
use crate::storage::Config;
use crate::timer::Phase;

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_SHORT_BREAKS_BEFORE_LONG_BREAK: u32 = 4;

const MS_PER_MINUTE: u64 = 60 * 1000;

/// Duration settings, in minutes, plus the long-break interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u32,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u32,
    #[serde(default = "default_short_breaks_before_long_break")]
    pub short_breaks_before_long_break: u32,
}

fn default_focus_minutes() -> u32 {
    DEFAULT_FOCUS_MINUTES
}
fn default_short_break_minutes() -> u32 {
    DEFAULT_SHORT_BREAK_MINUTES
}
fn default_long_break_minutes() -> u32 {
    DEFAULT_LONG_BREAK_MINUTES
}
fn default_short_breaks_before_long_break() -> u32 {
    DEFAULT_SHORT_BREAKS_BEFORE_LONG_BREAK
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            short_breaks_before_long_break: DEFAULT_SHORT_BREAKS_BEFORE_LONG_BREAK,
        }
    }
}

impl Settings {
    /// Replace zero values with their defaults.
    pub fn sanitized(self) -> Self {
        let mut out = self;
        for key in SettingKey::ALL {
            if out.get(key) == 0 {
                out.put(key, key.default_value());
            }
        }
        out
    }

    pub fn get(&self, key: SettingKey) -> u32 {
        match key {
            SettingKey::FocusMinutes => self.focus_minutes,
            SettingKey::ShortBreakMinutes => self.short_break_minutes,
            SettingKey::LongBreakMinutes => self.long_break_minutes,
            SettingKey::ShortBreaksBeforeLongBreak => self.short_breaks_before_long_break,
        }
    }

    fn put(&mut self, key: SettingKey, value: u32) {
        match key {
            SettingKey::FocusMinutes => self.focus_minutes = value,
            SettingKey::ShortBreakMinutes => self.short_break_minutes = value,
            SettingKey::LongBreakMinutes => self.long_break_minutes = value,
            SettingKey::ShortBreaksBeforeLongBreak => self.short_breaks_before_long_break = value,
        }
    }

    /// Minutes configured for `phase`.
    pub fn minutes_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus_minutes,
            Phase::ShortBreak => self.short_break_minutes,
            Phase::LongBreak => self.long_break_minutes,
        }
    }

    pub fn long_break_interval(&self) -> u32 {
        self.short_breaks_before_long_break.max(1)
    }
}

/// Full duration of `phase` in milliseconds.
pub fn duration_for(phase: Phase, settings: &Settings) -> u64 {
    u64::from(settings.minutes_for(phase)).saturating_mul(MS_PER_MINUTE)
}

/// Key of a single setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    FocusMinutes,
    ShortBreakMinutes,
    LongBreakMinutes,
    ShortBreaksBeforeLongBreak,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::FocusMinutes,
        SettingKey::ShortBreakMinutes,
        SettingKey::LongBreakMinutes,
        SettingKey::ShortBreaksBeforeLongBreak,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::FocusMinutes => "focusMinutes",
            SettingKey::ShortBreakMinutes => "shortBreakMinutes",
            SettingKey::LongBreakMinutes => "longBreakMinutes",
            SettingKey::ShortBreaksBeforeLongBreak => "shortBreaksBeforeLongBreak",
        }
    }

    pub fn default_value(self) -> u32 {
        match self {
            SettingKey::FocusMinutes => DEFAULT_FOCUS_MINUTES,
            SettingKey::ShortBreakMinutes => DEFAULT_SHORT_BREAK_MINUTES,
            SettingKey::LongBreakMinutes => DEFAULT_LONG_BREAK_MINUTES,
            SettingKey::ShortBreaksBeforeLongBreak => DEFAULT_SHORT_BREAKS_BEFORE_LONG_BREAK,
        }
    }

    fn index(self) -> usize {
        match self {
            SettingKey::FocusMinutes => 0,
            SettingKey::ShortBreakMinutes => 1,
            SettingKey::LongBreakMinutes => 2,
            SettingKey::ShortBreaksBeforeLongBreak => 3,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Observable, optionally file-backed settings.
pub struct SettingsProvider {
    config_path: Option<PathBuf>,
    config: Mutex<Config>,
    all: watch::Sender<Settings>,
    keys: [watch::Sender<u32>; 4],
}

impl SettingsProvider {
    /// Provider backed by the config file at `path`; missing or unreadable
    /// files yield defaults.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let config = Config::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            Config::default()
        });
        Self::build(Some(path), config)
    }

    /// Provider backed by the default config location.
    pub fn open_default() -> Result<Self> {
        Ok(Self::load(Config::default_path()?))
    }

    /// Memory-only provider; `set` does not persist anything.
    pub fn ephemeral(settings: Settings) -> Self {
        let config = Config {
            schedule: settings,
            ..Config::default()
        };
        Self::build(None, config)
    }

    fn build(config_path: Option<PathBuf>, config: Config) -> Self {
        let settings = config.schedule.sanitized();
        let keys = SettingKey::ALL.map(|key| watch::channel(settings.get(key)).0);
        Self {
            config_path,
            config: Mutex::new(config),
            all: watch::channel(settings).0,
            keys,
        }
    }

    /// Current sanitized settings.
    pub fn current(&self) -> Settings {
        *self.all.borrow()
    }

    /// Observe a single setting.
    pub fn get(&self, key: SettingKey) -> watch::Receiver<u32> {
        self.keys[key.index()].subscribe()
    }

    /// Observe all four settings at once.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.all.subscribe()
    }

    /// Update one setting, persist it, then publish.
    ///
    /// # Errors
    /// Returns an error for a zero value or if the config file cannot be
    /// written; nothing is published in that case.
    pub fn set(&self, key: SettingKey, value: u32) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".into(),
            }
            .into());
        }

        let settings = {
            let mut config = self
                .config
                .lock()
                .map_err(|_| crate::error::CoreError::Custom("settings lock poisoned".into()))?;
            let mut next = config.clone();
            next.schedule.put(key, value);
            if let Some(path) = &self.config_path {
                next.save_to(path)?;
            }
            *config = next;
            config.schedule.sanitized()
        };

        tracing::debug!(key = %key, value, "setting updated");
        self.keys[key.index()].send_replace(settings.get(key));
        self.all.send_replace(settings);
        Ok(())
    }
}
