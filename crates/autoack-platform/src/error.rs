//! Common error types for autoack-platform.

use thiserror::Error;

/// Platform-level errors.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("injection failed: {0}")]
    InjectionFailed(String),
    #[error("unknown key name: {0}")]
    UnknownKey(String),
}

/// Result type for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
