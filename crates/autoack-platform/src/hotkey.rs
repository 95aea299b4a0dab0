//! Global run/stop toggle hotkey.
//!
//! One capability, two implementations selected at registration time: the
//! primary path installs an OS-level input hook via `rdev`; when hook
//! installation fails (no permission, another process owns the hook) the
//! listener falls back to sampling raw key state at 50 Hz. Both paths run
//! the same debounce, so one physical press produces exactly one toggle no
//! matter how long the key is held or how often the OS auto-repeats it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::{PlatformError, PlatformResult};

/// Sampling period of the polling fallback.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Keys that can be bound as the run/stop toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKey {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl ToggleKey {
    /// Parse a configured key name, case-insensitively.
    pub fn parse(name: &str) -> PlatformResult<Self> {
        let parsed = match name.trim().to_lowercase().as_str() {
            "f1" => Self::F1,
            "f2" => Self::F2,
            "f3" => Self::F3,
            "f4" => Self::F4,
            "f5" => Self::F5,
            "f6" => Self::F6,
            "f7" => Self::F7,
            "f8" => Self::F8,
            "f9" => Self::F9,
            "f10" => Self::F10,
            "f11" => Self::F11,
            "f12" => Self::F12,
            _ => return Err(PlatformError::UnknownKey(name.to_string())),
        };
        Ok(parsed)
    }

    fn matches(self, key: rdev::Key) -> bool {
        matches!(
            (self, key),
            (Self::F1, rdev::Key::F1)
                | (Self::F2, rdev::Key::F2)
                | (Self::F3, rdev::Key::F3)
                | (Self::F4, rdev::Key::F4)
                | (Self::F5, rdev::Key::F5)
                | (Self::F6, rdev::Key::F6)
                | (Self::F7, rdev::Key::F7)
                | (Self::F8, rdev::Key::F8)
                | (Self::F9, rdev::Key::F9)
                | (Self::F10, rdev::Key::F10)
                | (Self::F11, rdev::Key::F11)
                | (Self::F12, rdev::Key::F12)
        )
    }

    /// Windows virtual-key code, for the polling fallback.
    #[cfg(windows)]
    fn virtual_key(self) -> i32 {
        // VK_F1 is 0x70 and the function keys are contiguous
        0x70 + self.ordinal()
    }

    #[cfg(windows)]
    fn ordinal(self) -> i32 {
        match self {
            Self::F1 => 0,
            Self::F2 => 1,
            Self::F3 => 2,
            Self::F4 => 3,
            Self::F5 => 4,
            Self::F6 => 5,
            Self::F7 => 6,
            Self::F8 => 7,
            Self::F9 => 8,
            Self::F10 => 9,
            Self::F11 => 10,
            Self::F12 => 11,
        }
    }
}

impl Default for ToggleKey {
    fn default() -> Self {
        Self::F2
    }
}

impl FromStr for ToggleKey {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ToggleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Collapses a held key into a single logical press: fires only on the
/// released -> pressed transition.
#[derive(Debug, Default)]
struct EdgeDetector {
    held: bool,
}

impl EdgeDetector {
    fn update(&mut self, pressed: bool) -> bool {
        let fire = pressed && !self.held;
        self.held = pressed;
        fire
    }
}

/// Handle to the toggle listener thread.
pub struct ToggleListenerHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl ToggleListenerHandle {
    /// Signal the listener to stop.
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Check if the listener thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }
}

impl Drop for ToggleListenerHandle {
    fn drop(&mut self) {
        self.stop();
        // take the thread handle but don't join it: the rdev hook blocks
        // until the next event and cannot be interrupted from outside
        let _ = self.thread.take();
    }
}

/// Start the toggle listener on its own thread.
///
/// `on_toggle` is invoked exactly once per debounced physical press of
/// `key`, from the listener's thread.
pub fn spawn_toggle_listener(
    key: ToggleKey,
    on_toggle: impl Fn() + Send + Sync + 'static,
) -> ToggleListenerHandle {
    let (stop_tx, stop_rx) = bounded(1);
    let on_toggle: Arc<dyn Fn() + Send + Sync> = Arc::new(on_toggle);
    let thread = thread::spawn(move || run_listener(key, on_toggle, stop_rx));
    ToggleListenerHandle {
        stop_tx,
        thread: Some(thread),
    }
}

fn run_listener(key: ToggleKey, on_toggle: Arc<dyn Fn() + Send + Sync>, stop_rx: Receiver<()>) {
    info!(%key, "toggle hotkey listener started (input hook)");

    let hook_toggle = on_toggle.clone();
    let hook_stop = stop_rx.clone();
    let mut edge = EdgeDetector::default();
    let result = rdev::listen(move |event: rdev::Event| {
        // a pending stop only mutes the callback; the hook itself cannot be
        // torn down from outside
        if hook_stop.try_recv().is_ok() {
            return;
        }
        match event.event_type {
            rdev::EventType::KeyPress(k) if key.matches(k) => {
                if edge.update(true) {
                    debug!(%key, "toggle press");
                    hook_toggle();
                }
            }
            rdev::EventType::KeyRelease(k) if key.matches(k) => {
                edge.update(false);
            }
            _ => {}
        }
    });

    if let Err(error) = result {
        warn!(
            ?error,
            "hotkey hook registration failed, falling back to key-state polling"
        );
        poll_loop(key, on_toggle, stop_rx);
    }

    info!("toggle hotkey listener exiting");
}

/// Fallback: sample raw key state at a fixed rate and run the same
/// debounce over the observed transitions.
fn poll_loop(key: ToggleKey, on_toggle: Arc<dyn Fn() + Send + Sync>, stop_rx: Receiver<()>) {
    info!(%key, "toggle hotkey listener started (polling)");
    let mut edge = EdgeDetector::default();
    loop {
        match stop_rx.recv_timeout(POLL_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        match key_state::is_pressed(key) {
            Some(pressed) => {
                if edge.update(pressed) {
                    debug!(%key, "toggle press");
                    on_toggle();
                }
            }
            None => {
                warn!("key-state polling is not available on this platform, toggle hotkey disabled");
                break;
            }
        }
    }
}

/// Raw key-state sampling for the polling fallback.
mod key_state {
    use super::ToggleKey;

    #[cfg(windows)]
    pub(super) fn is_pressed(key: ToggleKey) -> Option<bool> {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
        // high bit set while the key is down
        let state = unsafe { GetAsyncKeyState(key.virtual_key()) };
        Some((state as u16) & 0x8000 != 0)
    }

    #[cfg(not(windows))]
    pub(super) fn is_pressed(_key: ToggleKey) -> Option<bool> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_held_key_fires_once_per_press() {
        let mut edge = EdgeDetector::default();
        // a 500 ms hold sampled at 50 ms: ten pressed samples in a row
        let fired = (0..10).filter(|_| edge.update(true)).count();
        assert_eq!(fired, 1);
        // release, then a fresh press fires again
        assert!(!edge.update(false));
        assert!(edge.update(true));
    }

    #[test]
    fn key_names_parse_case_insensitively() {
        assert_eq!(ToggleKey::parse("f2").unwrap(), ToggleKey::F2);
        assert_eq!(ToggleKey::parse("F11").unwrap(), ToggleKey::F11);
        assert_eq!(" f5 ".parse::<ToggleKey>().unwrap(), ToggleKey::F5);
        assert!(matches!(
            ToggleKey::parse("ctrl+q"),
            Err(PlatformError::UnknownKey(_))
        ));
    }

    #[test]
    fn rdev_keys_match_their_toggle_key() {
        assert!(ToggleKey::F2.matches(rdev::Key::F2));
        assert!(!ToggleKey::F2.matches(rdev::Key::F3));
        assert!(!ToggleKey::F2.matches(rdev::Key::Space));
    }

    #[test]
    fn stopping_a_listener_is_safe_whenever() {
        let handle = spawn_toggle_listener(ToggleKey::F2, || {});
        handle.stop();
        // dropping after stop must not block on the hook thread
        drop(handle);
    }
}
