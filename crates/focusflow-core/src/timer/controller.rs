//! Async owner of a [`PomodoroEngine`].
//!
//! The controller serializes every command and tick through one mutex,
//! drives the countdown with a cancellable one-second ticker, follows the
//! settings channel, and hands side effects to a single dispatcher task so
//! sinks and the session log see them in the order they happened.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::clock::{Clock, MonotonicClock};
use super::engine::{PomodoroEngine, TimerSnapshot, TimerState};
use super::phase::Phase;
use crate::events::Event;
use crate::notify::{NotificationSink, SilentSound, SoundSink, TracingNotifier};
use crate::session::SessionRecord;
use crate::settings::Settings;
use crate::storage::SessionLog;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 256;

enum Effect {
    Event(Event),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct Shared {
    engine: Mutex<PomodoroEngine>,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<TimerSnapshot>,
    events: broadcast::Sender<Event>,
    effects: mpsc::UnboundedSender<Effect>,
    /// Bumped whenever the ticker is replaced or stopped.
    generation: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    /// Publish the outcome of one engine call. Must run with the engine lock held.
    fn publish(&self, engine: &PomodoroEngine, events: Vec<Event>) {
        self.snapshot.send_replace(engine.snapshot());
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event.clone());
            let side_effect = matches!(
                event,
                Event::OngoingUpdated { .. }
                    | Event::OngoingCleared
                    | Event::PhaseCompleted { .. }
                    | Event::SessionEnded { .. }
            );
            if side_effect && self.effects.send(Effect::Event(event)).is_err() {
                tracing::warn!("side-effect dispatcher is gone; effect dropped");
            }
        }
    }
}

/// Builder for [`TimerController`]. Every sink is optional.
pub struct TimerControllerBuilder {
    settings: watch::Receiver<Settings>,
    notifier: Arc<dyn NotificationSink>,
    sound: Arc<dyn SoundSink>,
    session_log: Option<SessionLog>,
    clock: Arc<dyn Clock>,
}

impl TimerControllerBuilder {
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn sound(mut self, sound: Arc<dyn SoundSink>) -> Self {
        self.sound = sound;
        self
    }

    pub fn session_log(mut self, log: SessionLog) -> Self {
        self.session_log = Some(log);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the controller and spawn its background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> TimerController {
        let mut settings = self.settings;
        let engine = PomodoroEngine::new(*settings.borrow_and_update());

        let (snapshot, _) = watch::channel(engine.snapshot());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (effects, effects_rx) = mpsc::unbounded_channel();

        let dispatcher = Dispatcher {
            notifier: self.notifier,
            sound: self.sound,
            session_log: self.session_log,
            events: events.clone(),
        };

        let shared = Arc::new(Shared {
            engine: Mutex::new(engine),
            clock: self.clock,
            snapshot,
            events,
            effects,
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let dispatcher = tokio::spawn(dispatcher.run(effects_rx));
        let watcher = tokio::spawn(watch_settings(Arc::downgrade(&shared), settings));

        TimerController {
            shared,
            ticker: StdMutex::new(None),
            watcher: StdMutex::new(Some(watcher)),
            dispatcher: StdMutex::new(Some(dispatcher)),
        }
    }
}

/// Pomodoro session controller.
///
/// Owns its engine and tasks; there is no global instance. Dropping the
/// controller aborts the ticker, settings watcher, and dispatcher.
pub struct TimerController {
    shared: Arc<Shared>,
    ticker: StdMutex<Option<JoinHandle<()>>>,
    watcher: StdMutex<Option<JoinHandle<()>>>,
    dispatcher: StdMutex<Option<JoinHandle<()>>>,
}

impl TimerController {
    pub fn builder(settings: watch::Receiver<Settings>) -> TimerControllerBuilder {
        TimerControllerBuilder {
            settings,
            notifier: Arc::new(TracingNotifier),
            sound: Arc::new(SilentSound),
            session_log: None,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TimerSnapshot {
        *self.shared.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.shared.events.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn start(&self) {
        self.command(|engine, now| engine.start(now)).await;
    }

    pub async fn pause(&self) {
        self.command(|engine, now| engine.pause(now)).await;
    }

    pub async fn reset(&self) {
        self.command(|engine, now| engine.reset(now)).await;
    }

    pub async fn skip(&self) {
        self.command(|engine, now| engine.skip(now)).await;
    }

    /// Adopt a snapshot handed back by an external surface. Returns whether
    /// it was applied.
    pub async fn restore_external_state(
        &self,
        remaining_ms: i64,
        phase: Phase,
        is_running: bool,
    ) -> bool {
        self.command(|engine, now| {
            engine.restore_external_state(remaining_ms, phase, is_running, now)
        })
        .await
    }

    /// Wait until every side effect queued so far has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.shared.effects.send(Effect::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Stop all background work, clear the ongoing display, and release the
    /// sound sink. Later commands are ignored.
    pub async fn shutdown(&self) {
        {
            // Hold the engine so no command or tick interleaves with teardown.
            let _engine = self.shared.engine.lock().await;
            self.shared.closed.store(true, Ordering::SeqCst);
            self.stop_ticker();
        }
        let watcher = slot(&self.watcher).take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        let (done, wait) = oneshot::channel();
        if self.shared.effects.send(Effect::Shutdown(done)).is_ok() {
            let _ = wait.await;
        }
        let dispatcher = slot(&self.dispatcher).take();
        if let Some(dispatcher) = dispatcher {
            let _ = dispatcher.await;
        }
        tracing::debug!("timer controller shut down");
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Run one engine command under the lock and publish its events.
    /// Returns whether the command produced any event.
    async fn command<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut PomodoroEngine, chrono::DateTime<chrono::Utc>) -> Vec<Event>,
    {
        let mut engine = self.shared.engine.lock().await;
        if self.shared.closed.load(Ordering::SeqCst) {
            tracing::debug!("command ignored after shutdown");
            return false;
        }

        let events = f(&mut *engine, self.shared.clock.now());
        let changed = !events.is_empty();
        let started = events
            .iter()
            .any(|e| matches!(e, Event::TimerStarted { .. }));

        self.shared.publish(&engine, events);
        if started {
            self.spawn_ticker();
        } else if engine.state() != TimerState::Running {
            self.stop_ticker();
        }
        changed
    }

    fn spawn_ticker(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(run_ticker(Arc::downgrade(&self.shared), generation));
        if let Some(old) = slot(&self.ticker).replace(handle) {
            old.abort();
        }
    }

    fn stop_ticker(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(old) = slot(&self.ticker).take() {
            old.abort();
        }
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        for handle in [&self.ticker, &self.watcher, &self.dispatcher] {
            if let Some(handle) = slot(handle).take() {
                handle.abort();
            }
        }
    }
}

fn slot(handle: &StdMutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run_ticker(shared: Weak<Shared>, generation: u64) {
    let mut interval = time::interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        interval.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut engine = shared.engine.lock().await;
        // A pause/reset/skip may have won the lock after this tick fired.
        if shared.generation.load(Ordering::SeqCst) != generation
            || engine.state() != TimerState::Running
        {
            break;
        }

        let now = Instant::now();
        let elapsed_ms = u64::try_from(now.duration_since(last).as_millis()).unwrap_or(u64::MAX);
        last = now;

        let events = engine.tick(elapsed_ms, shared.clock.now());
        shared.publish(&engine, events);
        if engine.state() != TimerState::Running {
            break;
        }
    }
}

async fn watch_settings(shared: Weak<Shared>, mut settings: watch::Receiver<Settings>) {
    while settings.changed().await.is_ok() {
        let next = *settings.borrow_and_update();
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut engine = shared.engine.lock().await;
        if engine.update_settings(next) {
            shared.snapshot.send_replace(engine.snapshot());
        }
        tracing::debug!(?next, "settings applied");
    }
}

struct Dispatcher {
    notifier: Arc<dyn NotificationSink>,
    sound: Arc<dyn SoundSink>,
    session_log: Option<SessionLog>,
    events: broadcast::Sender<Event>,
}

impl Dispatcher {
    async fn run(self, mut effects: mpsc::UnboundedReceiver<Effect>) {
        while let Some(effect) = effects.recv().await {
            match effect {
                Effect::Event(event) => self.apply(event).await,
                Effect::Flush(done) => {
                    let _ = done.send(());
                }
                Effect::Shutdown(done) => {
                    let notifier = self.notifier.clone();
                    let sound = self.sound.clone();
                    off_runtime("shutdown", move || {
                        notifier.clear_ongoing();
                        sound.stop();
                    })
                    .await;
                    let _ = done.send(());
                    break;
                }
            }
        }
    }

    async fn apply(&self, event: Event) {
        let notifier = self.notifier.clone();
        match event {
            Event::OngoingUpdated {
                phase,
                remaining_ms,
                running,
            } => {
                off_runtime("show_ongoing", move || {
                    notifier.show_ongoing(remaining_ms, phase, running)
                })
                .await
            }
            Event::OngoingCleared => {
                off_runtime("clear_ongoing", move || notifier.clear_ongoing()).await
            }
            Event::PhaseCompleted { phase, .. } => {
                let sound = self.sound.clone();
                off_runtime("show_completion", move || {
                    notifier.show_completion(phase);
                    sound.play_phase_completion(phase);
                })
                .await
            }
            Event::SessionEnded { record } => self.record(record).await,
            _ => {}
        }
    }

    async fn record(&self, record: SessionRecord) {
        let Some(log) = self.session_log.clone() else {
            tracing::debug!(phase = %record.phase, "no session log attached; record dropped");
            return;
        };

        let pending = record.clone();
        let message = match tokio::task::spawn_blocking(move || log.insert(&pending)).await {
            Ok(Ok(id)) => {
                tracing::debug!(
                    id,
                    phase = %record.phase,
                    completed = record.completed,
                    duration_min = record.duration_min,
                    "session recorded"
                );
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        tracing::error!(error = %message, phase = %record.phase, "failed to record session");
        let _ = self.events.send(Event::SessionRecordFailed { record, message });
    }
}

/// Run a sink call on the blocking pool and wait for it, so a slow display
/// or device never stalls the runtime.
async fn off_runtime<F>(call: &'static str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    if let Err(e) = tokio::task::spawn_blocking(f).await {
        tracing::error!(call, error = %e, "sink call failed");
    }
}
