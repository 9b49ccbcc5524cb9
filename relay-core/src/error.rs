//! Relay error types.
//!
//! Comprehensive error handling for the relay's control surface. Transport
//! failures on a live session are *not* represented here — per the error
//! handling design they are recovered locally and surfaced only through the
//! `disconnected` state-change event (see `relay::session`).

use std::io;
use thiserror::Error;

/// Main error type for relay control operations.
#[derive(Error, Debug)]
pub enum RelayError {
    /// I/O error during socket setup (bind, accept, connect).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A send was attempted from a thread other than the event loop's worker.
    #[error("operation attempted from outside the event loop's worker thread")]
    WrongThread,

    /// A work item was scheduled, or a send attempted, after the owning loop
    /// or session began disposing.
    #[error("event loop is shutting down")]
    ShuttingDown,
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// `true` if retrying the operation that produced this error is
    /// reasonable without embedder intervention.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            Self::WrongThread | Self::ShuttingDown => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_interrupted_is_recoverable() {
        let err = RelayError::Io(io::Error::from(io::ErrorKind::Interrupted));
        assert!(err.is_recoverable());
    }

    #[test]
    fn wrong_thread_is_not_recoverable() {
        assert!(!RelayError::WrongThread.is_recoverable());
    }

    #[test]
    fn display_messages() {
        assert_eq!(RelayError::ShuttingDown.to_string(), "event loop is shutting down");
        assert_eq!(
            RelayError::WrongThread.to_string(),
            "operation attempted from outside the event loop's worker thread"
        );
    }
}
