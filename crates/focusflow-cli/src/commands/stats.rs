use chrono::{Local, Utc};
use clap::Subcommand;
use focusflow_core::stats::{daily_totals, last_days, start_of_day};
use focusflow_core::storage::Database;
use serde::Serialize;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats
    Today,
    /// All-time stats
    All,
    /// Completed pomodoros per day
    Daily {
        /// Number of days to show, ending today
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
}

#[derive(Serialize)]
struct TodayStats {
    date: String,
    pomodoros: u64,
    focus_min: u64,
}

#[derive(Serialize)]
struct DailyRow {
    date: String,
    pomodoros: u64,
    focus_min: u64,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let now = Utc::now();

    match action {
        StatsAction::Today => {
            let stats = db.stats(start_of_day(now, &Local))?;
            let today = TodayStats {
                date: now.with_timezone(&Local).date_naive().to_string(),
                pomodoros: stats.today_pomodoros,
                focus_min: stats.today_focus_min,
            };
            println!("{}", serde_json::to_string_pretty(&today)?);
        }
        StatsAction::All => {
            let stats = db.stats(start_of_day(now, &Local))?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Daily { days } => {
            let totals = daily_totals(&db.completed_focus_sessions()?, &Local);
            let rows: Vec<DailyRow> = last_days(&totals, now.with_timezone(&Local).date_naive(), days)
                .into_iter()
                .map(|(date, day)| DailyRow {
                    date: date.to_string(),
                    pomodoros: day.pomodoros,
                    focus_min: day.focus_min,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }
    Ok(())
}
