//! Throttled click actuation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClickError {
    #[error("input injection failed: {0}")]
    Injection(String),
}

/// Seam for the OS input-injection service (implemented by
/// `autoack-platform`, faked in tests).
pub trait ClickSink: Send {
    fn click(&mut self, x: i32, y: i32) -> Result<(), ClickError>;
}

/// Minimum enforced time gap between two actuated clicks.
///
/// The pressed-recently check and the timestamp update happen under one
/// lock, so the contract holds even with concurrent callers.
#[derive(Debug, Default)]
pub struct ClickThrottle {
    last_fired: Mutex<Option<Instant>>,
}

impl ClickThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the last firing time; the next click is never suppressed.
    pub fn reset(&self) {
        *self.last_fired.lock().unwrap() = None;
    }
}

/// Performs throttled primary-button clicks through a [`ClickSink`] and
/// counts the ones that actually fired.
pub struct Actuator {
    sink: Box<dyn ClickSink>,
    throttle: Arc<ClickThrottle>,
    clicks: Arc<AtomicU64>,
}

impl Actuator {
    pub fn new(
        sink: Box<dyn ClickSink>,
        throttle: Arc<ClickThrottle>,
        clicks: Arc<AtomicU64>,
    ) -> Self {
        Self {
            sink,
            throttle,
            clicks,
        }
    }

    /// Click at absolute screen coordinates unless the throttle window is
    /// still open. Returns `Ok(true)` when the click fired, `Ok(false)`
    /// when it was suppressed (no side effects). A failed injection leaves
    /// both the throttle window and the counter untouched.
    pub fn click(&mut self, x: i32, y: i32, min_interval: Duration) -> Result<bool, ClickError> {
        let mut last = self.throttle.last_fired.lock().unwrap();
        if let Some(fired_at) = *last {
            if fired_at.elapsed() < min_interval {
                debug!(x, y, "click suppressed by throttle");
                return Ok(false);
            }
        }
        self.sink.click(x, y)?;
        *last = Some(Instant::now());
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl ClickSink for NullSink {
        fn click(&mut self, _x: i32, _y: i32) -> Result<(), ClickError> {
            Ok(())
        }
    }

    /// Fails the first `failures` injections, then succeeds.
    struct FlakySink {
        failures: u32,
    }

    impl ClickSink for FlakySink {
        fn click(&mut self, _x: i32, _y: i32) -> Result<(), ClickError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ClickError::Injection("synthetic failure".into()));
            }
            Ok(())
        }
    }

    fn actuator(sink: Box<dyn ClickSink>) -> (Actuator, Arc<AtomicU64>) {
        let clicks = Arc::new(AtomicU64::new(0));
        let throttle = Arc::new(ClickThrottle::new());
        (Actuator::new(sink, throttle, clicks.clone()), clicks)
    }

    #[test]
    fn second_click_within_the_interval_is_suppressed() {
        let (mut actuator, clicks) = actuator(Box::new(NullSink));
        let interval = Duration::from_secs(2);
        assert!(actuator.click(10, 20, interval).unwrap());
        std::thread::sleep(Duration::from_millis(100));
        assert!(!actuator.click(10, 20, interval).unwrap());
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn click_fires_again_once_the_interval_elapsed() {
        let (mut actuator, clicks) = actuator(Box::new(NullSink));
        let interval = Duration::from_millis(10);
        assert!(actuator.click(0, 0, interval).unwrap());
        std::thread::sleep(Duration::from_millis(30));
        assert!(actuator.click(0, 0, interval).unwrap());
        assert_eq!(clicks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_injection_neither_counts_nor_consumes_the_window() {
        let (mut actuator, clicks) = actuator(Box::new(FlakySink { failures: 1 }));
        let interval = Duration::from_secs(2);
        assert!(actuator.click(5, 5, interval).is_err());
        assert_eq!(clicks.load(Ordering::SeqCst), 0);
        // the window was not consumed, so an immediate retry fires
        assert!(actuator.click(5, 5, interval).unwrap());
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_reopens_the_window() {
        let clicks = Arc::new(AtomicU64::new(0));
        let throttle = Arc::new(ClickThrottle::new());
        let mut actuator = Actuator::new(Box::new(NullSink), throttle.clone(), clicks.clone());
        let interval = Duration::from_secs(60);
        assert!(actuator.click(0, 0, interval).unwrap());
        assert!(!actuator.click(0, 0, interval).unwrap());
        throttle.reset();
        assert!(actuator.click(0, 0, interval).unwrap());
        assert_eq!(clicks.load(Ordering::SeqCst), 2);
    }
}
