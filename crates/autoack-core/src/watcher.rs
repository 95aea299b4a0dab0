//! The watch loop: a background thread that probes templates in round-robin
//! order against full-screen captures and actuates throttled clicks on hits.
//!
//! Every per-iteration failure (capture, match, injection) is absorbed here
//! and surfaced as a [`WatchEvent`]; nothing in the loop is fatal. All
//! pauses go through the stop channel, so a stop request takes effect
//! within one pause.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use image::GrayImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actuator::{Actuator, ClickSink};
use crate::matcher;
use crate::session::Shared;

/// Pause after a full no-hit cycle, bounding CPU when nothing is on screen.
const EMPTY_CYCLE_PAUSE: Duration = Duration::from_millis(200);
/// Poll period while the store is drained mid-run.
const DRAINED_IDLE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture failed: {0}")]
    Capture(String),
}

/// Seam for the OS screen-capture service (implemented by
/// `autoack-platform`, faked in tests).
pub trait ScreenSource: Send {
    fn capture(&mut self) -> Result<GrayImage, CaptureError>;
}

/// The most recent successful match, kept for control-surface display.
#[derive(Debug, Clone, Serialize)]
pub struct MatchObservation {
    pub template: String,
    pub x: i32,
    pub y: i32,
    pub confidence: f64,
}

/// Notifications emitted for the embedding control surface.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum WatchEvent {
    Started {
        test_mode: bool,
    },
    Stopped {
        clicks: u64,
    },
    MatchFound {
        template: String,
        x: i32,
        y: i32,
        confidence: f64,
    },
    ClickFired {
        template: String,
        x: i32,
        y: i32,
        clicks: u64,
    },
    ClickSuppressed {
        template: String,
    },
    CycleCompleted,
    StoreDrained,
    Error {
        message: String,
    },
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEvent::Started { test_mode: true } => write!(f, "watching started (test mode)"),
            WatchEvent::Started { test_mode: false } => write!(f, "watching started"),
            WatchEvent::Stopped { clicks } => {
                write!(f, "watching stopped, {clicks} clicks so far")
            }
            WatchEvent::MatchFound {
                template,
                x,
                y,
                confidence,
            } => write!(
                f,
                "match: {template} at ({x}, {y}), confidence {confidence:.2}"
            ),
            WatchEvent::ClickFired {
                template,
                x,
                y,
                clicks,
            } => write!(f, "clicked {template} at ({x}, {y}), {clicks} total"),
            WatchEvent::ClickSuppressed { template } => {
                write!(f, "click on {template} suppressed by throttle")
            }
            WatchEvent::CycleCompleted => write!(f, "full cycle completed without a hit"),
            WatchEvent::StoreDrained => write!(f, "template store is empty, idling"),
            WatchEvent::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Handle to the watch-loop thread. Dropping it stops and joins the loop.
pub(crate) struct WatcherHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub(crate) fn stop(mut self) {
        self.shutdown();
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    source: Box<dyn ScreenSource>,
    sink: Box<dyn ClickSink>,
    event_tx: Sender<WatchEvent>,
) -> WatcherHandle {
    let (stop_tx, stop_rx) = bounded(1);
    let thread = thread::spawn(move || run_loop(shared, source, sink, stop_rx, event_tx));
    WatcherHandle {
        stop_tx,
        thread: Some(thread),
    }
}

fn run_loop(
    shared: Arc<Shared>,
    mut source: Box<dyn ScreenSource>,
    sink: Box<dyn ClickSink>,
    stop_rx: Receiver<()>,
    event_tx: Sender<WatchEvent>,
) {
    let mut actuator = Actuator::new(sink, shared.throttle.clone(), shared.clicks.clone());
    let test_mode = shared.settings.lock().unwrap().test_mode;
    info!(test_mode, "watch loop started");
    emit(&event_tx, WatchEvent::Started { test_mode });

    let mut cursor: usize = 0;
    let mut drained_logged = false;

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        // cursor resolution and fetch happen under one store guard so a
        // concurrent remove or reorder cannot hand us a stale entry
        let resolved = {
            let store = shared.store.lock().unwrap();
            store
                .resolve(cursor)
                .map(|(index, template)| (index, store.len(), template))
        };
        let Some((index, len, template)) = resolved else {
            if !drained_logged {
                warn!("template store drained while running, idling at low frequency");
                emit(&event_tx, WatchEvent::StoreDrained);
                drained_logged = true;
            }
            if wait_or_stop(&stop_rx, DRAINED_IDLE) {
                break;
            }
            continue;
        };
        drained_logged = false;
        cursor = index;

        let settings = shared.settings.lock().unwrap().clone();

        let result = match source.capture() {
            Ok(screen) => Some(matcher::find_match(
                &screen,
                template.pixels(),
                settings.threshold,
            )),
            Err(err) => {
                warn!(error = %err, "screen capture failed, treating as a miss");
                emit(
                    &event_tx,
                    WatchEvent::Error {
                        message: err.to_string(),
                    },
                );
                None
            }
        };

        match result {
            Some(m) if m.found => {
                debug!(
                    template = template.name(),
                    x = m.x,
                    y = m.y,
                    confidence = m.confidence,
                    "template matched"
                );
                *shared.last_match.lock().unwrap() = Some(MatchObservation {
                    template: template.name().to_string(),
                    x: m.x,
                    y: m.y,
                    confidence: m.confidence,
                });
                emit(
                    &event_tx,
                    WatchEvent::MatchFound {
                        template: template.name().to_string(),
                        x: m.x,
                        y: m.y,
                        confidence: m.confidence,
                    },
                );

                if settings.test_mode {
                    // passive preview: no click, no cursor motion, the same
                    // template is re-evaluated immediately
                    continue;
                }

                match actuator.click(m.x, m.y, settings.min_interval) {
                    Ok(true) => {
                        let clicks = shared.clicks.load(Ordering::SeqCst);
                        info!(
                            template = template.name(),
                            x = m.x,
                            y = m.y,
                            clicks,
                            "click fired"
                        );
                        emit(
                            &event_tx,
                            WatchEvent::ClickFired {
                                template: template.name().to_string(),
                                x: m.x,
                                y: m.y,
                                clicks,
                            },
                        );
                        cursor = (index + 1) % len;
                        // pace before the next probe so a prompt that
                        // lingers on screen after the click is not hit again
                        if wait_or_stop(&stop_rx, settings.min_interval) {
                            break;
                        }
                    }
                    Ok(false) => {
                        emit(
                            &event_tx,
                            WatchEvent::ClickSuppressed {
                                template: template.name().to_string(),
                            },
                        );
                        // cursor stays put; the same template is retried
                    }
                    Err(err) => {
                        warn!(error = %err, "click injection failed");
                        emit(
                            &event_tx,
                            WatchEvent::Error {
                                message: err.to_string(),
                            },
                        );
                        // counted as not fired; cursor stays put
                    }
                }
            }
            _ => {
                // miss, or a capture failure treated as one: round-robin
                cursor = index + 1;
                if cursor >= len {
                    cursor = 0;
                    emit(&event_tx, WatchEvent::CycleCompleted);
                    if wait_or_stop(&stop_rx, EMPTY_CYCLE_PAUSE) {
                        break;
                    }
                }
            }
        }
    }

    let clicks = shared.clicks.load(Ordering::SeqCst);
    info!(clicks, "watch loop stopped");
    emit(&event_tx, WatchEvent::Stopped { clicks });
}

/// Interruptible sleep doubling as the loop's cancellation point. Returns
/// true when stop was requested.
fn wait_or_stop(stop_rx: &Receiver<()>, timeout: Duration) -> bool {
    match stop_rx.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        Err(RecvTimeoutError::Timeout) => false,
    }
}

fn emit(event_tx: &Sender<WatchEvent>, event: WatchEvent) {
    if event_tx.try_send(event).is_err() {
        warn!("observer channel full or disconnected, dropping event");
    }
}
