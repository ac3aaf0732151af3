//! Error types for the signaling server.

use thiserror::Error;

/// Severity classification for a [`SignalError`].
///
/// Warnings describe recoverable conditions (a duplicate room create, an
/// unknown option name) that the caller may log and continue past. Errors
/// describe conditions that abort the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation failed and must not be treated as applied.
    Error,
    /// The operation was refused but the system state remains consistent.
    Warning,
}

/// Error type covering all signaling server operations.
///
/// The taxonomy is scoped by layer (server, application, connection) with an
/// error and a warning variant per layer. Messages are human-readable and
/// intended for the server log; client-facing failures are reported through
/// the closed error-code catalog instead.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Server-level failure (listener setup, transport, state corruption).
    #[error("Server error: {0}")]
    Server(String),

    /// Server-level recoverable condition.
    #[error("Server warning: {0}")]
    ServerWarning(String),

    /// Application-level failure.
    #[error("Application error: {0}")]
    Application(String),

    /// Application-level recoverable condition (bad room name, duplicate
    /// create, unknown option).
    #[error("Application warning: {0}")]
    ApplicationWarning(String),

    /// Connection-level failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connection-level recoverable condition (zombie connection, invalid
    /// presence value, bad field name).
    #[error("Connection warning: {0}")]
    ConnectionWarning(String),
}

impl SignalError {
    /// Returns the severity of this error.
    pub fn severity(&self) -> Severity {
        match self {
            SignalError::Server(_)
            | SignalError::Application(_)
            | SignalError::Connection(_) => Severity::Error,
            SignalError::ServerWarning(_)
            | SignalError::ApplicationWarning(_)
            | SignalError::ConnectionWarning(_) => Severity::Warning,
        }
    }

    /// Returns true when the error is a recoverable warning.
    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }
}

/// Result type alias for signaling server operations.
pub type SignalResult<T> = Result<T, SignalError>;
