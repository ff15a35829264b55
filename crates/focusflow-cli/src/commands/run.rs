use std::sync::Arc;

use clap::Args;
use focusflow_core::notify::format_mm_ss;
use focusflow_core::{
    Config, Database, Event, NotificationSink, SessionLog, SettingsProvider, SilentSound,
    SoundSink, TimerController, TimerSnapshot, TimerState,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::terminal::{load_ongoing, save_ongoing, OngoingState, TerminalBell, TerminalNotifier};

#[derive(Args)]
pub struct RunArgs {
    /// Resume the countdown left behind by a previous run
    #[arg(long)]
    restore: bool,
    /// Never ring the terminal bell
    #[arg(long)]
    quiet: bool,
}

const HELP: &str = "commands: start (s), pause (p), reset (r), skip (n), status, help, quit (q)";

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(session(args))
}

async fn session(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let provider = SettingsProvider::open_default()?;
    let db = Arc::new(Database::open()?);
    let log = SessionLog::new(db.clone())?;

    let notifier: Arc<dyn NotificationSink> =
        Arc::new(TerminalNotifier::new(db.clone(), config.notifications.enabled));
    let sound: Arc<dyn SoundSink> = if config.notifications.sound && !args.quiet {
        Arc::new(TerminalBell)
    } else {
        Arc::new(SilentSound)
    };

    // Read before the controller starts overwriting it.
    let previous = if args.restore { load_ongoing(&db)? } else { None };

    let controller = TimerController::builder(provider.subscribe())
        .notifier(notifier)
        .sound(sound)
        .session_log(log)
        .spawn();
    let mut events = controller.events();

    match previous {
        Some(state) => {
            let remaining = i64::try_from(state.remaining_ms).unwrap_or(i64::MAX);
            if controller
                .restore_external_state(remaining, state.phase, state.running)
                .await
            {
                println!(
                    "restored {} with {} left (saved {})",
                    state.phase.label(),
                    format_mm_ss(state.remaining_ms),
                    state.saved_at.with_timezone(&chrono::Local).format("%H:%M:%S")
                );
            } else {
                println!("nothing to restore");
            }
        }
        None if args.restore => println!("nothing to restore"),
        None => {}
    }

    println!("{HELP}");
    print_status(&controller.snapshot());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "start" | "s" => controller.start().await,
                    "pause" | "p" => controller.pause().await,
                    "reset" | "r" => controller.reset().await,
                    "skip" | "n" => controller.skip().await,
                    "status" => print_status(&controller.snapshot()),
                    "help" | "?" => println!("{HELP}"),
                    "quit" | "q" | "exit" => break,
                    "" => {}
                    other => eprintln!("unknown command: {other} ({HELP})"),
                }
            }
            event = events.recv() => match event {
                Ok(Event::PhaseCompleted { next, completed_focus_count, .. }) => {
                    println!(
                        "next: {} ({} pomodoros so far); type 'start' to begin",
                        next.label(),
                        completed_focus_count
                    );
                }
                Ok(Event::SessionRecordFailed { message, .. }) => {
                    eprintln!("warning: session was not saved: {message}");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    let last = controller.snapshot();
    controller.shutdown().await;

    // Leave an in-progress countdown for `run --restore`.
    if matches!(last.state, TimerState::Running | TimerState::Paused) {
        let state = OngoingState {
            remaining_ms: last.remaining_ms,
            phase: last.phase,
            running: last.state == TimerState::Running,
            saved_at: chrono::Utc::now(),
        };
        save_ongoing(&db, &state)?;
        println!(
            "\n{} left in {}; resume with `focusflow run --restore`",
            format_mm_ss(last.remaining_ms),
            last.phase.label()
        );
    }
    Ok(())
}

fn print_status(snapshot: &TimerSnapshot) {
    let state = match snapshot.state {
        TimerState::Stopped => "stopped",
        TimerState::Running => "running",
        TimerState::Paused => "paused",
        TimerState::Finished => "finished",
    };
    println!(
        "{} {} / {} [{state}], {} pomodoros",
        snapshot.phase.label(),
        format_mm_ss(snapshot.remaining_ms),
        format_mm_ss(snapshot.total_ms),
        snapshot.completed_focus_count
    );
}
