//! Error types for event dispatch.

/// Errors produced while registering or dispatching events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// No listener is installed for the emitted event name.
    #[error("No listener registered for event '{0}'")]
    NoListener(String),

    /// No default listener exists for the given event name, so it cannot be
    /// restored.
    #[error("No default listener known for event '{0}'")]
    NoDefaultListener(String),

    /// The listener ran but reported a failure.
    #[error("Listener execution failed: {0}")]
    ListenerExecution(String),

    /// Event payload serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
