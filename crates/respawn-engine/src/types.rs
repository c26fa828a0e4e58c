//! Engine-facing data types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Container status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container created but not started.
    Created,
    /// Container is running.
    Running,
    /// Container is paused.
    Paused,
    /// Container is restarting.
    Restarting,
    /// Container is being removed.
    Removing,
    /// Container has exited.
    Exited,
    /// Container is dead (error state).
    Dead,
}

impl ContainerStatus {
    /// Returns whether the container counts as running for lifecycle checks.
    ///
    /// A created container has not exited yet, so it is treated as live.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Restarting => write!(f, "restarting"),
            Self::Removing => write!(f, "removing"),
            Self::Exited => write!(f, "exited"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// Container information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Engine container ID.
    pub id: String,
    /// Container name, without the leading slash.
    pub name: String,
    /// Current status.
    pub status: ContainerStatus,
}

/// Image information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Engine image ID.
    pub id: String,
    /// Repository tags (`name:tag`).
    pub tags: Vec<String>,
}

impl ImageInfo {
    /// Returns whether the image carries exactly this tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Image build options.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Tag for the resulting image.
    pub tag: String,
    /// Dockerfile path inside the build context.
    pub dockerfile: String,
    /// Remove intermediate containers after the build.
    pub remove_intermediate: bool,
}

impl BuildOptions {
    /// Creates build options for the given tag with default settings.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            dockerfile: "Dockerfile".to_string(),
            remove_intermediate: true,
        }
    }
}

/// Container creation options.
///
/// Containers are always created detached; output is captured through the
/// engine's log stream.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Image to create the container from.
    pub image: String,
    /// Container name.
    pub name: Option<String>,
    /// Command override. `None` keeps the image default.
    pub cmd: Option<Vec<String>>,
    /// Capture stdout.
    pub attach_stdout: bool,
    /// Capture stderr.
    pub attach_stderr: bool,
    /// Bind mounts in `host:container` form.
    pub binds: Vec<String>,
}

impl CreateOptions {
    /// Creates options for a container from `image` with stdout and stderr captured.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: None,
            cmd: None,
            attach_stdout: true,
            attach_stderr: true,
            binds: Vec::new(),
        }
    }

    /// Sets the container name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the image command.
    #[must_use]
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// Adds a bind mount.
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.binds.push(bind.into());
        self
    }
}

/// A chunk of exec results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecChunk {
    /// Bytes written to stdout.
    Stdout(Bytes),
    /// Bytes written to stderr.
    Stderr(Bytes),
    /// Exit status of the exec'd process. Not output.
    Exit(i64),
}

impl ExecChunk {
    /// Returns the output bytes carried by this chunk, if any.
    #[must_use]
    pub const fn output(&self) -> Option<&Bytes> {
        match self {
            Self::Stdout(data) | Self::Stderr(data) => Some(data),
            Self::Exit(_) => None,
        }
    }
}
