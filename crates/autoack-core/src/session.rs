//! Session controller: owns the shared run state and mediates between the
//! hotkey listener, the control surface and the watch loop.
//!
//! `start`, `stop` and `toggle_run` all funnel through one guarded state
//! cell, so concurrent calls from the hotkey thread and the control surface
//! can never spawn two loops or tear one down twice.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actuator::{ClickSink, ClickThrottle};
use crate::config::WatchConfig;
use crate::template::{TemplateError, TemplateStore};
use crate::watcher::{self, MatchObservation, ScreenSource, WatchEvent, WatcherHandle};

/// Operator-tunable threshold bounds; values outside are clamped.
pub const MIN_THRESHOLD: f64 = 0.5;
pub const MAX_THRESHOLD: f64 = 1.0;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no templates loaded")]
    NoTemplatesLoaded,
    #[error("watch loop is already running")]
    AlreadyRunning,
    #[error("platform adapter unavailable: {0}")]
    Platform(String),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Run state of the watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Stopped,
    Running,
}

/// Direction for [`Session::reorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Live tunables the watch loop re-reads every iteration.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) threshold: f64,
    pub(crate) min_interval: Duration,
    pub(crate) test_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            min_interval: Duration::from_secs(2),
            test_mode: false,
        }
    }
}

/// State shared between the session, the watch loop and the control surface.
pub(crate) struct Shared {
    pub(crate) store: Mutex<TemplateStore>,
    pub(crate) settings: Mutex<Settings>,
    pub(crate) throttle: Arc<ClickThrottle>,
    pub(crate) clicks: Arc<AtomicU64>,
    pub(crate) last_match: Mutex<Option<MatchObservation>>,
}

type SourceFactory = dyn Fn() -> Result<Box<dyn ScreenSource>, String> + Send + Sync;
type SinkFactory = dyn Fn() -> Result<Box<dyn ClickSink>, String> + Send + Sync;

/// The long-lived controller a control surface and the hotkey listener talk
/// to. Construct once at process start with the platform adapter factories.
pub struct Session {
    shared: Arc<Shared>,
    runner: Mutex<Option<WatcherHandle>>,
    events: Mutex<Option<Receiver<WatchEvent>>>,
    auto_start: AtomicBool,
    toggle_key: Mutex<String>,
    make_source: Box<SourceFactory>,
    make_sink: Box<SinkFactory>,
}

impl Session {
    pub fn new<S, C>(make_source: S, make_sink: C) -> Self
    where
        S: Fn() -> Result<Box<dyn ScreenSource>, String> + Send + Sync + 'static,
        C: Fn() -> Result<Box<dyn ClickSink>, String> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(TemplateStore::new()),
                settings: Mutex::new(Settings::default()),
                throttle: Arc::new(ClickThrottle::new()),
                clicks: Arc::new(AtomicU64::new(0)),
                last_match: Mutex::new(None),
            }),
            runner: Mutex::new(None),
            events: Mutex::new(None),
            auto_start: AtomicBool::new(false),
            toggle_key: Mutex::new("F2".to_string()),
            make_source: Box::new(make_source),
            make_sink: Box::new(make_sink),
        }
    }

    /// Start the watch loop. Refused when it is already running or when the
    /// store is empty; both checks happen under the run-state guard.
    pub fn start(&self) -> Result<(), SessionError> {
        let mut runner = self.runner.lock().unwrap();
        self.start_locked(&mut runner)
    }

    fn start_locked(&self, runner: &mut Option<WatcherHandle>) -> Result<(), SessionError> {
        if runner.is_some() {
            return Err(SessionError::AlreadyRunning);
        }
        if self.shared.store.lock().unwrap().is_empty() {
            return Err(SessionError::NoTemplatesLoaded);
        }
        let source = (self.make_source)().map_err(SessionError::Platform)?;
        let sink = (self.make_sink)().map_err(SessionError::Platform)?;
        // a fresh run may click immediately
        self.shared.throttle.reset();
        let (event_tx, event_rx) = bounded(256);
        *self.events.lock().unwrap() = Some(event_rx);
        *runner = Some(watcher::spawn(self.shared.clone(), source, sink, event_tx));
        info!("session started the watch loop");
        Ok(())
    }

    /// Stop the watch loop and wait for it to wind down. Unconditional;
    /// stopping an already stopped session is a no-op.
    pub fn stop(&self) {
        let mut runner = self.runner.lock().unwrap();
        Self::stop_locked(&mut runner);
    }

    fn stop_locked(runner: &mut Option<WatcherHandle>) {
        if let Some(handle) = runner.take() {
            handle.stop();
            info!("session stopped the watch loop");
        }
    }

    /// Flip between running and stopped; the single entry point both the
    /// hotkey listener and the control surface funnel through.
    pub fn toggle_run(&self) -> Result<RunState, SessionError> {
        let mut runner = self.runner.lock().unwrap();
        if runner.is_some() {
            Self::stop_locked(&mut runner);
            Ok(RunState::Stopped)
        } else {
            self.start_locked(&mut runner)?;
            Ok(RunState::Running)
        }
    }

    pub fn state(&self) -> RunState {
        if self.runner.lock().unwrap().is_some() {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn load_template(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.shared.store.lock().unwrap().load(path)?;
        Ok(())
    }

    pub fn remove_template(&self, index: usize) -> Result<(), SessionError> {
        self.shared.store.lock().unwrap().remove(index)?;
        Ok(())
    }

    /// Move a template one slot toward the front or back of the cycle.
    /// Boundary moves are no-ops and report `false`.
    pub fn reorder(&self, index: usize, direction: Direction) -> Result<bool, SessionError> {
        let mut store = self.shared.store.lock().unwrap();
        let moved = match direction {
            Direction::Up => store.move_up(index)?,
            Direction::Down => store.move_down(index)?,
        };
        Ok(moved)
    }

    pub fn template_names(&self) -> Vec<String> {
        self.shared.store.lock().unwrap().names()
    }

    pub fn template_count(&self) -> usize {
        self.shared.store.lock().unwrap().len()
    }

    /// Set the match threshold, clamped to
    /// [`MIN_THRESHOLD`]`..=`[`MAX_THRESHOLD`].
    pub fn set_threshold(&self, threshold: f64) {
        let clamped = if threshold.is_finite() {
            threshold.clamp(MIN_THRESHOLD, MAX_THRESHOLD)
        } else {
            Settings::default().threshold
        };
        if clamped != threshold {
            debug!(threshold, clamped, "threshold outside operator range");
        }
        self.shared.settings.lock().unwrap().threshold = clamped;
    }

    pub fn threshold(&self) -> f64 {
        self.shared.settings.lock().unwrap().threshold
    }

    pub fn set_min_interval(&self, interval: Duration) {
        self.shared.settings.lock().unwrap().min_interval = interval;
    }

    pub fn min_interval(&self) -> Duration {
        self.shared.settings.lock().unwrap().min_interval
    }

    pub fn set_test_mode(&self, on: bool) {
        self.shared.settings.lock().unwrap().test_mode = on;
    }

    pub fn test_mode(&self) -> bool {
        self.shared.settings.lock().unwrap().test_mode
    }

    pub fn set_auto_start(&self, on: bool) {
        self.auto_start.store(on, Ordering::SeqCst);
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start.load(Ordering::SeqCst)
    }

    pub fn set_toggle_key(&self, key: impl Into<String>) {
        *self.toggle_key.lock().unwrap() = key.into();
    }

    pub fn toggle_key(&self) -> String {
        self.toggle_key.lock().unwrap().clone()
    }

    /// Clicks fired since process start.
    pub fn click_count(&self) -> u64 {
        self.shared.clicks.load(Ordering::SeqCst)
    }

    /// The most recent match, for control-surface display.
    pub fn last_match(&self) -> Option<MatchObservation> {
        self.shared.last_match.lock().unwrap().clone()
    }

    /// Clone of the observer channel for the current run, if any. The
    /// receiver stays valid after the run winds down and ends with
    /// [`WatchEvent::Stopped`].
    pub fn event_receiver(&self) -> Option<Receiver<WatchEvent>> {
        self.events.lock().unwrap().clone()
    }

    /// Drain pending observer notifications without blocking.
    pub fn drain_events(&self) -> Vec<WatchEvent> {
        let guard = self.events.lock().unwrap();
        let mut drained = Vec::new();
        if let Some(rx) = guard.as_ref() {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }
        drained
    }

    /// Apply a persisted configuration: settings first, then templates.
    /// Missing or unreadable template files are skipped with a warning (a
    /// stale path must not block startup). Returns how many templates
    /// loaded.
    pub fn apply_config(&self, config: &WatchConfig) -> usize {
        self.set_threshold(config.threshold);
        self.set_min_interval(duration_from_secs(config.interval_secs));
        self.set_test_mode(config.test_mode);
        self.set_auto_start(config.auto_start);
        self.set_toggle_key(config.toggle_key.clone());

        let mut loaded = 0;
        for path in &config.template_paths {
            match self.shared.store.lock().unwrap().load(path) {
                Ok(_) => loaded += 1,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping template from config")
                }
            }
        }
        info!(
            loaded,
            listed = config.template_paths.len(),
            "applied configuration"
        );
        loaded
    }

    /// Snapshot the current settings and template order for persistence.
    pub fn snapshot_config(&self) -> WatchConfig {
        let settings = self.shared.settings.lock().unwrap().clone();
        WatchConfig {
            interval_secs: settings.min_interval.as_secs_f64(),
            threshold: settings.threshold,
            test_mode: settings.test_mode,
            auto_start: self.auto_start.load(Ordering::SeqCst),
            toggle_key: self.toggle_key.lock().unwrap().clone(),
            template_paths: self.shared.store.lock().unwrap().paths(),
        }
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Settings::default().min_interval
    }
}
