//! Error types for shared slot operations.

use nix::errno::Errno;
use thiserror::Error;

/// Errors that can occur while opening or using the shared slot.
#[derive(Debug, Error)]
pub enum SlotError {
    /// Key must be a positive integer.
    #[error("shared memory key must be a positive integer, got {key}")]
    InvalidKey {
        /// Rejected key value.
        key: i32,
    },

    /// `shmget` failed for both the exclusive-create and attach paths.
    #[error("failed to get shared memory segment for key {key}: {source}")]
    Segment {
        /// Requested key.
        key: i32,
        /// Underlying errno.
        source: Errno,
    },

    /// `shmat` failed.
    #[error("failed to attach shared memory segment {id}: {source}")]
    Attach {
        /// Kernel segment id.
        id: i32,
        /// Underlying errno.
        source: Errno,
    },

    /// Creator-side mutex initialization failed.
    #[error("failed to initialize slot mutex: {source}")]
    MutexInit {
        /// Underlying errno.
        source: Errno,
    },

    /// `pthread_mutex_lock` returned an error (EDEADLK included).
    #[error("failed to lock slot mutex: {source}")]
    Lock {
        /// Underlying errno.
        source: Errno,
    },

    /// `pthread_mutex_unlock` returned an error (EPERM included).
    #[error("failed to unlock slot mutex: {source}")]
    Unlock {
        /// Underlying errno.
        source: Errno,
    },
}

/// Result type for shared slot operations.
pub type SlotResult<T> = Result<T, SlotError>;
