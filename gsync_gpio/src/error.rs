//! Error types for GPIO line operations.

use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while configuring or driving a GPIO line.
#[derive(Debug, Error)]
pub enum GpioError {
    /// The line identifier string could not be parsed.
    #[error("invalid GPIO line identifier '{0}' (expected '<chip>:<offset>' or a positive number)")]
    InvalidLineId(String),

    /// The requested operation needs a line state that has not been set up.
    #[error("GPIO line is not configured for {needed}")]
    NotRequested {
        /// What the operation needed (e.g. "output", "edge events").
        needed: &'static str,
    },

    /// A filesystem operation on the GPIO interface failed.
    #[error("failed to {op} {path:?}: {source}")]
    Io {
        /// Operation description.
        op: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A GPIO character-device ioctl failed.
    #[error("{op} ioctl on {path:?} failed: {source}")]
    Ioctl {
        /// ioctl description.
        op: &'static str,
        /// Chip device path.
        path: PathBuf,
        /// Underlying errno.
        source: Errno,
    },

    /// The kernel interface returned something outside its own contract.
    #[error("unexpected {what} value '{got}'")]
    Protocol {
        /// Which attribute misbehaved.
        what: &'static str,
        /// The value observed.
        got: String,
    },
}

/// Result type for GPIO operations.
pub type GpioResult<T> = Result<T, GpioError>;
