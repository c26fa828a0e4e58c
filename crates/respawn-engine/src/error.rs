//! Error types for engine operations.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by the container engine binding.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Exec was attempted against a container whose main process is not running.
    #[error("container is not running: {0}")]
    ContainerNotRunning(String),

    /// Container, image or exec instance not found.
    #[error("no such object: {0}")]
    NotFound(String),

    /// Conflicting request (e.g. name already in use).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Image build reported an error.
    #[error("build failed: {0}")]
    Build(String),

    /// Any other engine error response.
    #[error("engine returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message reported by the engine.
        message: String,
    },

    /// Could not reach the engine.
    #[error("engine connection failed: {0}")]
    Connection(String),

    /// The binding has been closed.
    #[error("engine connection closed")]
    Closed,

    /// The engine answered with something we could not interpret.
    #[error("unexpected engine response: {0}")]
    Protocol(String),

    /// I/O error while preparing a request.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Returns true if the target container was not running.
    #[must_use]
    pub const fn is_not_running(&self) -> bool {
        matches!(self, Self::ContainerNotRunning(_))
    }

    /// Returns true if the target object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the request conflicted with existing state.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
