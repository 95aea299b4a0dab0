//! autoack-core: domain model + watch-loop scheduling.
//!
//! autoack keeps an ordered set of small reference images ("templates"),
//! scans full-screen captures for them one at a time and fires a throttled
//! synthetic click when one is found, so a recurring on-screen prompt can be
//! acknowledged automatically.
//!
//! Design goal: keep this crate UI-agnostic and platform-agnostic. Screen
//! capture, click injection and the global toggle hotkey are behind the
//! [`ScreenSource`]/[`ClickSink`] seams and live in `autoack-platform`; the
//! visual control surface embedding all of this is out of scope entirely and
//! talks to the [`Session`] controller.

mod actuator;
mod config;
mod matcher;
mod session;
mod template;
mod watcher;

pub use actuator::{Actuator, ClickError, ClickSink, ClickThrottle};
pub use config::{
    config_path, load_config, load_config_from, save_config, save_config_to, ConfigError,
    WatchConfig,
};
pub use matcher::{find_match, MatchResult};
pub use session::{Direction, RunState, Session, SessionError, MAX_THRESHOLD, MIN_THRESHOLD};
pub use template::{Template, TemplateError, TemplateStore};
pub use watcher::{CaptureError, MatchObservation, ScreenSource, WatchEvent};
