//! # respawn-core
//!
//! Lifecycle management for a single named container, with command
//! execution that survives the container stopping.
//!
//! ## Components
//!
//! - [`InstanceRegistry`]: builds an image from a context and starts a
//!   container under a unique name, or reattaches to an existing one
//! - [`ContainerInstance`]: output polling, command execution, file
//!   injection, duplication and removal for one container
//! - [`Config`]: layered configuration (defaults, files, `RESPAWN_*` environment)
//!
//! ## Recovery
//!
//! Executing a command in a container whose main process has exited does not
//! fail. The instance commits the stopped container to a new image, runs the
//! command in a replacement container created from it, merges the replacement's
//! output into its own and continues against the replacement.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod instance;
pub mod logging;
pub mod naming;
pub mod output;
pub mod registry;

pub use config::{Config, LogFormat, LoggingConfig};
pub use error::{RespawnError, Result};
pub use instance::{ContainerHandle, ContainerInstance};
pub use output::OutputBuffer;
pub use registry::InstanceRegistry;
