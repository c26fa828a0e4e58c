//! Error types for container lifecycle operations.

use respawn_engine::EngineError;
use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, RespawnError>;

/// Errors that can occur while managing a container instance.
#[derive(Debug, Error)]
pub enum RespawnError {
    /// The name is empty or uses characters the engine rejects.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// An image or container with this name already exists.
    #[error("an image or container named {0} already exists")]
    AlreadyExists(String),

    /// No container with this name exists.
    #[error("no container named {0}")]
    NotFound(String),

    /// The instance has been removed.
    #[error("instance {0} has been removed")]
    AlreadyRemoved(String),

    /// The command line could not be split into arguments.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// Command execution failed for a reason other than a stopped container.
    #[error("failed to execute {command:?}: {source}")]
    ExecutionFailed {
        /// The command line.
        command: String,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// The container was stopped and running the command in a replacement failed.
    #[error("failed to recover execution of {command:?}: {source}")]
    RecoveryFailed {
        /// The command line.
        command: String,
        /// Cause of the failure.
        #[source]
        source: Box<RespawnError>,
    },

    /// Engine error.
    #[error("engine error: {0}")]
    EngineFault(#[from] EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RespawnError {
    /// Returns true if the instance has been removed.
    #[must_use]
    pub const fn is_already_removed(&self) -> bool {
        matches!(self, Self::AlreadyRemoved(_))
    }

    /// Returns true if the name is already taken.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns true if the name was rejected.
    #[must_use]
    pub const fn is_invalid_name(&self) -> bool {
        matches!(self, Self::InvalidName(_))
    }

    /// Returns true if the named container does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
