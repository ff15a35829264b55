//! Integration tests for `TimerController` on a paused tokio clock.
//!
//! Every test drives real tasks (ticker, settings watcher, dispatcher) and
//! lets tokio auto-advance time, so a 25 minute focus phase runs in
//! microseconds. Sleeps end half a second past a tick so the tick has
//! fired before the assertion runs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use focusflow_core::error::{DatabaseError, Result};
use focusflow_core::{
    Database, Event, NotificationSink, Phase, SessionLog, SessionRecord, SessionStore, SettingKey,
    Settings, SettingsProvider, SoundSink, TimerController, TimerState,
};

const MIN: u64 = 60 * 1000;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Ongoing { remaining_ms: u64, phase: Phase, running: bool },
    Completion(Phase),
    Clear,
    Sound(Phase),
    SoundStop,
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NotificationSink for Recorder {
    fn show_ongoing(&self, remaining_ms: u64, phase: Phase, is_running: bool) {
        self.push(Call::Ongoing {
            remaining_ms,
            phase,
            running: is_running,
        });
    }

    fn show_completion(&self, phase: Phase) {
        self.push(Call::Completion(phase));
    }

    fn clear_ongoing(&self) {
        self.push(Call::Clear);
    }
}

impl SoundSink for Recorder {
    fn play_phase_completion(&self, phase: Phase) {
        self.push(Call::Sound(phase));
    }

    fn stop(&self) {
        self.push(Call::SoundStop);
    }
}

struct Harness {
    controller: TimerController,
    provider: SettingsProvider,
    log: SessionLog,
    sinks: Arc<Recorder>,
}

fn harness_with_store(settings: Settings, store: Arc<dyn SessionStore>) -> Harness {
    let provider = SettingsProvider::ephemeral(settings);
    let log = SessionLog::new(store).unwrap();
    let sinks = Arc::new(Recorder::default());
    let controller = TimerController::builder(provider.subscribe())
        .notifier(sinks.clone())
        .sound(sinks.clone())
        .session_log(log.clone())
        .spawn();
    Harness {
        controller,
        provider,
        log,
        sinks,
    }
}

fn harness(settings: Settings) -> Harness {
    harness_with_store(settings, Arc::new(Database::open_memory().unwrap()))
}

/// One-minute focus and short break, two-minute long break, long break
/// after every second focus.
fn quick() -> Settings {
    Settings {
        focus_minutes: 1,
        short_break_minutes: 1,
        long_break_minutes: 2,
        short_breaks_before_long_break: 2,
    }
}

async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn restore_running_snapshot_finishes_and_records() {
    let h = harness(Settings::default());

    assert!(h.controller.restore_external_state(90_000, Phase::Focus, true).await);
    let snap = h.controller.snapshot();
    assert_eq!(snap.state, TimerState::Running);
    assert_eq!(snap.phase, Phase::Focus);
    assert_eq!(snap.remaining_ms, 90_000);

    // Second restore is ignored.
    assert!(!h.controller.restore_external_state(30_000, Phase::LongBreak, true).await);

    advance_ms(90_500).await;
    h.controller.flush().await;

    let snap = h.controller.snapshot();
    assert_eq!(snap.state, TimerState::Stopped);
    assert_eq!(snap.phase, Phase::ShortBreak);
    assert_eq!(snap.remaining_ms, 5 * MIN);
    assert_eq!(snap.completed_focus_count, 1);

    let records = h.log.query_all().borrow().clone();
    assert_eq!(records.len(), 1);
    assert!(records[0].completed);
    assert_eq!(records[0].phase, Phase::Focus);
    assert_eq!(records[0].duration_min, 25);
    assert_eq!(*h.log.count_completed_focus().borrow(), 1);
    assert_eq!(*h.log.sum_completed_focus_minutes().borrow(), Some(25));

    let calls = h.sinks.calls();
    assert_eq!(calls.iter().filter(|c| **c == Call::Completion(Phase::Focus)).count(), 1);
    assert_eq!(calls.iter().filter(|c| **c == Call::Sound(Phase::Focus)).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn completion_clears_ongoing_before_alerting() {
    let h = harness(quick());
    h.controller.start().await;
    advance_ms(60_500).await;
    h.controller.flush().await;

    let calls = h.sinks.calls();
    let tail = &calls[calls.len() - 3..];
    assert_eq!(
        tail,
        &[Call::Clear, Call::Completion(Phase::Focus), Call::Sound(Phase::Focus)]
    );
    assert!(calls.contains(&Call::Ongoing {
        remaining_ms: 59_000,
        phase: Phase::Focus,
        running: true,
    }));
}

#[tokio::test(start_paused = true)]
async fn rotation_through_long_break() {
    let h = harness(quick());

    h.controller.start().await;
    advance_ms(60_500).await;
    assert_eq!(h.controller.snapshot().phase, Phase::ShortBreak);

    h.controller.start().await;
    advance_ms(60_500).await;
    assert_eq!(h.controller.snapshot().phase, Phase::Focus);

    h.controller.start().await;
    advance_ms(60_500).await;
    let snap = h.controller.snapshot();
    assert_eq!(snap.phase, Phase::LongBreak);
    assert_eq!(snap.completed_focus_count, 2);
    assert_eq!(snap.remaining_ms, 2 * MIN);

    h.controller.start().await;
    advance_ms(120_500).await;
    h.controller.flush().await;
    let snap = h.controller.snapshot();
    assert_eq!(snap.phase, Phase::Focus);
    assert_eq!(snap.completed_focus_count, 2);

    assert_eq!(h.log.query_all().borrow().len(), 4);
    assert_eq!(*h.log.count_completed_focus().borrow(), 2);
}

#[tokio::test(start_paused = true)]
async fn pause_and_resume_keep_exact_remaining() {
    let h = harness(quick());
    h.controller.start().await;
    advance_ms(10_500).await;
    h.controller.pause().await;
    assert_eq!(h.controller.snapshot().remaining_ms, 50_000);
    assert_eq!(h.controller.snapshot().state, TimerState::Paused);

    advance_ms(30_000).await;
    assert_eq!(h.controller.snapshot().remaining_ms, 50_000);

    h.controller.start().await;
    advance_ms(5_500).await;
    assert_eq!(h.controller.snapshot().remaining_ms, 45_000);

    h.controller.flush().await;
    assert!(h.sinks.calls().contains(&Call::Ongoing {
        remaining_ms: 50_000,
        phase: Phase::Focus,
        running: false,
    }));
}

#[tokio::test(start_paused = true)]
async fn start_while_running_keeps_ticker_cadence() {
    let h = harness(quick());
    h.controller.start().await;
    advance_ms(2_500).await;
    h.controller.start().await;
    advance_ms(600).await;
    assert_eq!(h.controller.snapshot().remaining_ms, 57_000);
}

#[tokio::test(start_paused = true)]
async fn reset_while_paused_records_aborted_focus() {
    let h = harness(Settings::default());
    h.controller.start().await;
    advance_ms(600_500).await;
    h.controller.pause().await;
    h.controller.reset().await;
    h.controller.flush().await;

    let snap = h.controller.snapshot();
    assert_eq!(snap.state, TimerState::Stopped);
    assert_eq!(snap.phase, Phase::Focus);
    assert_eq!(snap.remaining_ms, 25 * MIN);

    let records = h.log.query_all().borrow().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].phase, Phase::Focus);
    assert!(!records[0].completed);
    assert_eq!(records[0].duration_min, 10);
    assert_eq!(h.sinks.calls().last(), Some(&Call::Clear));
}

#[tokio::test(start_paused = true)]
async fn short_sessions_leave_no_record() {
    let h = harness(Settings::default());
    h.controller.start().await;
    advance_ms(3_000).await;
    h.controller.reset().await;
    h.controller.flush().await;
    assert!(h.log.query_all().borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn skip_adjusts_count_and_never_completes() {
    let h = harness(quick());
    h.controller.start().await;
    advance_ms(60_500).await;
    assert_eq!(h.controller.snapshot().completed_focus_count, 1);

    h.controller.skip().await;
    assert_eq!(h.controller.snapshot().phase, Phase::Focus);
    assert_eq!(h.controller.snapshot().completed_focus_count, 1);

    h.controller.start().await;
    advance_ms(20_500).await;
    h.controller.skip().await;
    h.controller.flush().await;

    let snap = h.controller.snapshot();
    assert_eq!(snap.phase, Phase::ShortBreak);
    assert_eq!(snap.state, TimerState::Stopped);
    assert_eq!(snap.completed_focus_count, 0);

    let records = h.log.query_all().borrow().clone();
    assert_eq!(records.len(), 2);
    assert!(!records[0].completed);
    assert_eq!(
        h.sinks.calls().iter().filter(|c| matches!(c, Call::Completion(_))).count(),
        1
    );

    // Nothing ticks after a skip.
    advance_ms(5_000).await;
    assert_eq!(h.controller.snapshot().remaining_ms, MIN);
}

#[tokio::test(start_paused = true)]
async fn settings_reload_idle_phase_only() {
    let h = harness(Settings::default());
    let mut snapshots = h.controller.subscribe();

    h.provider.set(SettingKey::FocusMinutes, 30).unwrap();
    snapshots.changed().await.unwrap();
    assert_eq!(h.controller.snapshot().remaining_ms, 30 * MIN);

    h.controller.start().await;
    h.provider.set(SettingKey::FocusMinutes, 40).unwrap();
    h.provider.set(SettingKey::ShortBreakMinutes, 10).unwrap();
    advance_ms(1_500).await;
    assert_eq!(h.controller.snapshot().remaining_ms, 30 * MIN - 1_000);

    h.controller.skip().await;
    assert_eq!(h.controller.snapshot().remaining_ms, 10 * MIN);
}

struct FailingStore;

impl SessionStore for FailingStore {
    fn insert(&self, _record: &SessionRecord) -> Result<i64> {
        Err(DatabaseError::Locked.into())
    }
    fn all(&self) -> Result<Vec<SessionRecord>> {
        Ok(Vec::new())
    }
    fn completed_focus(&self) -> Result<Vec<SessionRecord>> {
        Ok(Vec::new())
    }
    fn count_completed_focus(&self) -> Result<u64> {
        Ok(0)
    }
    fn sum_completed_focus_minutes(&self) -> Result<Option<u64>> {
        Ok(None)
    }
}

#[tokio::test(start_paused = true)]
async fn insert_failure_is_reported_and_timer_continues() {
    let h = harness_with_store(quick(), Arc::new(FailingStore));
    let mut events = h.controller.events();

    h.controller.start().await;
    advance_ms(60_500).await;
    h.controller.flush().await;

    let mut failed = None;
    while let Ok(event) = events.try_recv() {
        if let Event::SessionRecordFailed { record, message } = event {
            failed = Some((record, message));
        }
    }
    let (record, message) = failed.expect("SessionRecordFailed was not broadcast");
    assert!(record.completed);
    assert!(message.contains("locked"), "{message}");

    let snap = h.controller.snapshot();
    assert_eq!(snap.phase, Phase::ShortBreak);
    assert_eq!(snap.completed_focus_count, 1);
    assert!(h.sinks.calls().contains(&Call::Completion(Phase::Focus)));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_ticking_and_releases_sinks() {
    let h = harness(quick());
    h.controller.start().await;
    advance_ms(3_500).await;
    h.controller.shutdown().await;

    let calls = h.sinks.calls();
    assert_eq!(&calls[calls.len() - 2..], &[Call::Clear, Call::SoundStop]);

    let remaining = h.controller.snapshot().remaining_ms;
    advance_ms(10_000).await;
    assert_eq!(h.controller.snapshot().remaining_ms, remaining);

    h.controller.reset().await;
    assert_eq!(h.controller.snapshot().remaining_ms, remaining);
}

#[tokio::test(start_paused = true)]
async fn events_are_broadcast_in_order() {
    let h = harness(quick());
    let mut events = h.controller.events();

    h.controller.start().await;
    h.controller.pause().await;
    h.controller.reset().await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind());
    }
    assert_eq!(
        kinds,
        vec![
            "timer_started",
            "ongoing_updated",
            "timer_paused",
            "ongoing_updated",
            "timer_reset",
            "ongoing_cleared",
        ]
    );
}

/// Notifier whose first call blocks until the test releases it.
struct GatedNotifier {
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
    released: Mutex<Vec<bool>>,
}

impl NotificationSink for GatedNotifier {
    fn show_ongoing(&self, _remaining_ms: u64, _phase: Phase, _is_running: bool) {
        let mut released = self.released.lock().unwrap();
        if released.is_empty() {
            let gate = self.gate.lock().unwrap();
            released.push(gate.recv_timeout(Duration::from_secs(2)).is_ok());
        }
    }

    fn show_completion(&self, _phase: Phase) {}

    fn clear_ongoing(&self) {}
}

// Real time on a single-threaded runtime: the gate can only be opened if the
// blocked sink call left the runtime thread free.
#[tokio::test]
async fn blocking_sink_does_not_stall_the_runtime() {
    let (open, gate) = std::sync::mpsc::channel();
    let notifier = Arc::new(GatedNotifier {
        gate: Mutex::new(gate),
        released: Mutex::new(Vec::new()),
    });
    let provider = SettingsProvider::ephemeral(quick());
    let controller = TimerController::builder(provider.subscribe())
        .notifier(notifier.clone())
        .spawn();

    controller.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.pause().await;
    assert_eq!(controller.snapshot().state, TimerState::Paused);

    open.send(()).unwrap();
    controller.flush().await;
    assert_eq!(*notifier.released.lock().unwrap(), vec![true]);
    controller.shutdown().await;
}
