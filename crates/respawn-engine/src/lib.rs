//! # respawn-engine
//!
//! Container engine binding for respawn.
//!
//! This crate provides the narrow [`Engine`] interface the lifecycle core
//! drives, and [`DockerEngine`], an implementation over the Docker Engine
//! API on a Unix socket.
//!
//! ## Components
//!
//! - [`Engine`]: image build, container lifecycle, logs, exec, commit and archive upload
//! - [`DockerEngine`]: HTTP/1.1 client for the engine control socket
//! - [`stream`]: multiplexed stdout/stderr frame decoding
//! - [`archive`]: tar packing for build contexts and file uploads
//!
//! Exec against a container whose main process has exited is reported as
//! [`EngineError::ContainerNotRunning`] so callers can recover from it.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod client;
pub mod engine;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{DockerEngine, DEFAULT_API_VERSION, DEFAULT_SOCKET_PATH};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use types::{BuildOptions, ContainerInfo, ContainerStatus, CreateOptions, ExecChunk, ImageInfo};
