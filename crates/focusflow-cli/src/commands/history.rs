use chrono::Local;
use clap::Args;
use focusflow_core::storage::Database;

#[derive(Args)]
pub struct HistoryArgs {
    /// Only completed focus sessions
    #[arg(long)]
    focus_only: bool,
    /// Show at most N sessions
    #[arg(long, short = 'n')]
    limit: Option<usize>,
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let mut sessions = if args.focus_only {
        db.completed_focus_sessions()?
    } else {
        db.sessions()?
    };
    if let Some(limit) = args.limit {
        sessions.truncate(limit);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("no sessions recorded");
        return Ok(());
    }
    for s in &sessions {
        println!(
            "{}  {:<11}  {:>4} min  {}",
            s.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            s.phase.as_str(),
            s.duration_min,
            if s.completed { "completed" } else { "aborted" }
        );
    }
    Ok(())
}
