//! Error types for the session layer
//!
//! These never cross [`crate::run_interactive`]; the runner downgrades them to
//! [`crate::ExitOutcome::Failed`].

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, SessionError>;

/// Faults raised by the interaction layer itself (not by the spawned command)
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Empty command line")]
    EmptyCommand,

    #[error("Failed to open PTY: {0}")]
    PtyOpen(String),

    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session already closed")]
    Closed,

    #[error("Exit status unavailable: {0}")]
    StatusUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
