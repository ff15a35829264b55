//! Statistics over the session log.
//!
//! Whole-log totals come straight from SQL (`Database::stats`); the
//! per-day breakdowns here work on records already loaded, because "day"
//! depends on the viewer's time zone.

mod daily;

pub use daily::{daily_totals, last_days, pomodoros_per_day, start_of_day, DayTotals};
pub use crate::storage::Stats;
