//! Unified error type for the blinkloop-lib crate.
//!
//! [`BlinkError`] wraps the transport-level [`DeviceError`] and the
//! crate's own error kinds (queue positions, config, color parsing).
//! `From` impls let `?` propagate across module boundaries.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for blinkloop-lib operations.
#[derive(Debug)]
pub enum BlinkError {
    /// Device acquisition or report I/O error.
    Device(DeviceError),
    /// Standard I/O error (config persistence).
    Io(std::io::Error),
    /// A queue position outside `0..=len` (set) or `0..len` (remove).
    InvalidQueuePosition { position: usize, len: usize },
    /// Configuration validation error.
    Config(String),
    /// Color parsing error.
    Color(String),
}

impl fmt::Display for BlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlinkError::Device(e) => write!(f, "{e}"),
            BlinkError::Io(e) => write!(f, "I/O error: {e}"),
            BlinkError::InvalidQueuePosition { position, len } => {
                write!(f, "Invalid queue position {position} (queue length {len})")
            }
            BlinkError::Config(e) => write!(f, "Config error: {e}"),
            BlinkError::Color(e) => write!(f, "Color error: {e}"),
        }
    }
}

impl std::error::Error for BlinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BlinkError::Device(e) => Some(e),
            BlinkError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for BlinkError {
    fn from(e: DeviceError) -> Self {
        BlinkError::Device(e)
    }
}

impl From<std::io::Error> for BlinkError {
    fn from(e: std::io::Error) -> Self {
        BlinkError::Io(e)
    }
}

/// Crate-level Result alias using [`BlinkError`].
pub type Result<T> = std::result::Result<T, BlinkError>;
