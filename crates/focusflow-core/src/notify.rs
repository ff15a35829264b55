//! Notification and sound sinks.
//!
//! The controller never talks to a display or speaker directly. Its
//! dispatcher calls these traits in event order, each call on tokio's
//! blocking pool, so implementations may block on I/O.

use crate::timer::Phase;

/// Body text shown under every completion title.
pub const COMPLETION_MESSAGE: &str = "You can start the next session.";

/// Ongoing status display plus one-shot completion alerts.
pub trait NotificationSink: Send + Sync {
    /// Show or update the ongoing display.
    fn show_ongoing(&self, remaining_ms: u64, phase: Phase, is_running: bool);
    /// One-shot alert for a phase that ran to zero.
    fn show_completion(&self, phase: Phase);
    fn clear_ongoing(&self);
}

pub trait SoundSink: Send + Sync {
    fn play_phase_completion(&self, phase: Phase);
    /// Stop anything still playing and release the device.
    fn stop(&self);
}

/// `MM:SS` from milliseconds, truncating partial seconds.
pub fn format_mm_ss(remaining_ms: u64) -> String {
    let total_secs = remaining_ms / 1000;
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

/// Title of the ongoing display, e.g. `"Pomodoro: Short Break"`.
pub fn ongoing_title(phase: Phase) -> String {
    format!("Pomodoro: {}", phase.label())
}

/// Body of the ongoing display.
pub fn ongoing_text(remaining_ms: u64, is_running: bool) -> String {
    let time = format_mm_ss(remaining_ms);
    if is_running {
        format!("Time remaining: {time}")
    } else {
        format!("Paused ({time})")
    }
}

pub fn completion_title(phase: Phase) -> &'static str {
    match phase {
        Phase::Focus => "Focus session completed!",
        Phase::ShortBreak => "Short break ended!",
        Phase::LongBreak => "Long break ended!",
    }
}

/// Notifier that only writes to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn show_ongoing(&self, remaining_ms: u64, phase: Phase, is_running: bool) {
        tracing::trace!(
            title = %ongoing_title(phase),
            text = %ongoing_text(remaining_ms, is_running),
            "ongoing"
        );
    }

    fn show_completion(&self, phase: Phase) {
        tracing::info!(title = completion_title(phase), "{COMPLETION_MESSAGE}");
    }

    fn clear_ongoing(&self) {
        tracing::trace!("ongoing cleared");
    }
}

/// Sound sink that plays nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSound;

impl SoundSink for SilentSound {
    fn play_phase_completion(&self, phase: Phase) {
        tracing::debug!(%phase, "completion sound suppressed");
    }

    fn stop(&self) {}
}
