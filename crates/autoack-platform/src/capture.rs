//! Full-screen capture via `xcap`.

use autoack_core::{CaptureError, ScreenSource};
use image::{DynamicImage, GrayImage};
use tracing::debug;
use xcap::Monitor;

/// Screen source that grabs one whole monitor per capture.
///
/// Monitors are re-enumerated on every call: display-mode changes make
/// cached handles go stale, and a failed enumeration must stay a transient
/// error for the watch loop rather than wedge the source.
pub struct MonitorSource {
    index: usize,
}

impl MonitorSource {
    /// Capture the first monitor the OS reports.
    pub fn primary() -> Self {
        Self { index: 0 }
    }

    /// Capture a specific monitor by enumeration index.
    pub fn monitor(index: usize) -> Self {
        Self { index }
    }
}

impl ScreenSource for MonitorSource {
    fn capture(&mut self) -> Result<GrayImage, CaptureError> {
        let monitors = Monitor::all().map_err(|err| CaptureError::Capture(err.to_string()))?;
        let monitor = monitors.get(self.index).ok_or_else(|| {
            CaptureError::Capture(format!(
                "monitor {} not found ({} available)",
                self.index,
                monitors.len()
            ))
        })?;
        let frame = monitor
            .capture_image()
            .map_err(|err| CaptureError::Capture(err.to_string()))?;
        debug!(
            width = frame.width(),
            height = frame.height(),
            "captured screen"
        );
        Ok(DynamicImage::ImageRgba8(frame).into_luma8())
    }
}
