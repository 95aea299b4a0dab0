//! Synthetic click injection via `enigo`.

use autoack_core::{ClickError, ClickSink};
use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};
use tracing::debug;

use crate::{PlatformError, PlatformResult};

/// Primary-button click sink backed by `enigo`.
pub struct EnigoClicker {
    enigo: Enigo,
}

impl EnigoClicker {
    pub fn new() -> PlatformResult<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(|err| {
            PlatformError::InjectionFailed(format!("failed to create Enigo: {err}"))
        })?;
        Ok(Self { enigo })
    }
}

impl ClickSink for EnigoClicker {
    fn click(&mut self, x: i32, y: i32) -> Result<(), ClickError> {
        debug!(x, y, "injecting click");
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|err| ClickError::Injection(err.to_string()))?;
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|err| ClickError::Injection(err.to_string()))?;
        Ok(())
    }
}
