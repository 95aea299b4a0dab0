//! autoack-platform: platform-specific I/O boundary for autoack.
//!
//! This crate provides:
//! - Full-screen capture via `xcap` (the [`autoack_core::ScreenSource`] seam)
//! - Synthetic click injection via `enigo` (the [`autoack_core::ClickSink`]
//!   seam)
//! - The global run/stop toggle hotkey: an OS input hook via `rdev`, with a
//!   key-state polling fallback when hook registration fails
//!
//! Wiring it all together is a few lines for the embedding surface:
//!
//! ```no_run
//! use std::sync::Arc;
//! use autoack_core::{ClickSink, ScreenSource, Session};
//! use autoack_platform::{spawn_toggle_listener, EnigoClicker, MonitorSource, ToggleKey};
//!
//! let session = Arc::new(Session::new(
//!     || Ok(Box::new(MonitorSource::primary()) as Box<dyn ScreenSource>),
//!     || {
//!         EnigoClicker::new()
//!             .map(|clicker| Box::new(clicker) as Box<dyn ClickSink>)
//!             .map_err(|err| err.to_string())
//!     },
//! ));
//! session.load_template("templates/accept.png")?;
//!
//! let _hotkey = {
//!     let session = session.clone();
//!     spawn_toggle_listener(ToggleKey::F2, move || {
//!         if let Err(err) = session.toggle_run() {
//!             tracing::warn!(%err, "toggle refused");
//!         }
//!     })
//! };
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod capture;
mod clicker;
mod error;
mod hotkey;

pub use capture::MonitorSource;
pub use clicker::EnigoClicker;
pub use error::{PlatformError, PlatformResult};
pub use hotkey::{spawn_toggle_listener, ToggleKey, ToggleListenerHandle};
