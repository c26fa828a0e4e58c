//! Container instance lifecycle and self-healing execution.
//!
//! A [`ContainerInstance`] is the caller-facing handle for one logical
//! container. When a command is executed after the container's main process
//! has exited, the instance snapshots the container into a new image, runs
//! the command in a disposable replacement created from it, merges the
//! replacement's output and retargets itself at the replacement. The caller
//! keeps using the same handle throughout.

use std::path::Path;
use std::sync::Arc;

use respawn_engine::{archive, CreateOptions, Engine, EngineError, ExecChunk};

use crate::error::{RespawnError, Result};
use crate::naming::{disposable_name, image_tag, split_command, validate_name};
use crate::output::OutputBuffer;

/// Engine-side identity of a container and its paired image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Engine container ID.
    pub id: String,
    /// Name shared by the container and its image tag.
    pub name: String,
}

#[derive(Debug)]
enum Target {
    Live(ContainerHandle),
    Removed,
}

/// A managed container with incremental output and failure recovery.
pub struct ContainerInstance {
    engine: Arc<dyn Engine>,
    name: String,
    target: Target,
    output: OutputBuffer,
    is_duplicate: bool,
    retired_images: Vec<String>,
    binds: Vec<String>,
    recovery_prefix: String,
}

impl std::fmt::Debug for ContainerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerInstance")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("is_duplicate", &self.is_duplicate)
            .field("retired_images", &self.retired_images)
            .finish_non_exhaustive()
    }
}

impl ContainerInstance {
    pub(crate) fn new(
        engine: Arc<dyn Engine>,
        handle: ContainerHandle,
        binds: Vec<String>,
        recovery_prefix: String,
    ) -> Self {
        Self {
            engine,
            name: handle.name.clone(),
            target: Target::Live(handle),
            output: OutputBuffer::new(),
            is_duplicate: false,
            retired_images: Vec::new(),
            binds,
            recovery_prefix,
        }
    }

    /// Returns the logical name the instance was created under.
    ///
    /// The name is stable across recoveries.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the container currently backing this instance.
    #[must_use]
    pub const fn handle(&self) -> Option<&ContainerHandle> {
        match &self.target {
            Target::Live(handle) => Some(handle),
            Target::Removed => None,
        }
    }

    /// Returns whether the instance has been removed.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        matches!(self.target, Target::Removed)
    }

    /// Returns whether the instance was produced by duplication or recovery.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        self.is_duplicate
    }

    fn live(&self) -> Result<&ContainerHandle> {
        match &self.target {
            Target::Live(handle) => Ok(handle),
            Target::Removed => Err(RespawnError::AlreadyRemoved(self.name.clone())),
        }
    }

    /// Returns output produced since the previous call.
    ///
    /// Returns `None` when there is nothing new. Every byte of container log
    /// and command output is returned exactly once, in order.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved` after [`remove`](Self::remove), or an engine error.
    pub async fn get_output(&mut self) -> Result<Option<Vec<u8>>> {
        let id = self.live()?.id.clone();
        let logs = self.engine.container_logs(&id).await?;
        self.output.absorb_logs(&logs);
        Ok(self.output.take())
    }

    /// Executes a command in the container, capturing stdout and stderr.
    ///
    /// If the container has stopped, the command is run in a replacement
    /// container created from a snapshot of this one, and the instance
    /// switches to the replacement. A non-zero exit status is not an error.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved`, `InvalidCommand`, `ExecutionFailed` for
    /// engine failures, or `RecoveryFailed` if the replacement could not run.
    pub async fn execute(&mut self, command: &str) -> Result<()> {
        let id = self.live()?.id.clone();
        let args = split_command(command)?;

        tracing::debug!(name = %self.name, container = %id, command, "executing");

        match self.engine.exec(&id, &args).await {
            Ok(chunks) => {
                let mut collected = Vec::new();
                for data in chunks.iter().filter_map(ExecChunk::output) {
                    collected.extend_from_slice(data);
                }
                self.output.append(&collected);
                Ok(())
            }
            Err(EngineError::ContainerNotRunning(_)) => self.recover(command).await,
            Err(source) => Err(RespawnError::ExecutionFailed {
                command: command.to_string(),
                source,
            }),
        }
    }

    async fn recover(&mut self, command: &str) -> Result<()> {
        let original = self.live()?.clone();
        let disposable = disposable_name(&self.recovery_prefix);

        tracing::info!(
            name = %self.name,
            container = %original.id,
            replacement = %disposable,
            command,
            "container not running, recovering"
        );

        // Unpolled output of the stopped container would be lost by the swap.
        let logs = self
            .engine
            .container_logs(&original.id)
            .await
            .map_err(|e| recovery_failed(command, e.into()))?;
        self.output.absorb_logs(&logs);
        let original_pending = self.output.take();

        let attempt = self.run_replacement(&disposable, command).await;
        self.output.replace_pending(original_pending);

        let (replacement, replacement_logs) = match attempt {
            Ok(result) => result,
            Err(e) => {
                self.discard(&disposable).await;
                return Err(recovery_failed(command, e));
            }
        };

        self.output.append(&replacement_logs);

        if let Err(e) = self.engine.remove_container(&original.id).await {
            tracing::warn!(container = %original.id, error = %e, "failed to remove stopped container");
        }

        tracing::info!(
            name = %self.name,
            container = %replacement.id,
            "recovered into replacement container"
        );

        self.retired_images.push(original.name);
        self.target = Target::Live(replacement);
        self.output.set_delivered_offset(replacement_logs.len());
        self.is_duplicate = true;
        Ok(())
    }

    /// Runs `command` to completion in a duplicate named `name`.
    async fn run_replacement(
        &self,
        name: &str,
        command: &str,
    ) -> Result<(ContainerHandle, Vec<u8>)> {
        let args = [command.to_string()];
        let replacement = self.duplicate(name, Some(&args[..])).await?;
        let handle = replacement.live()?.clone();

        self.engine.start_container(&handle.id).await?;
        let status = self.engine.wait_container(&handle.id).await?;
        let logs = self.engine.container_logs(&handle.id).await?;

        tracing::debug!(container = %handle.id, status, bytes = logs.len(), "replacement exited");
        Ok((handle, logs.to_vec()))
    }

    /// Removes what a failed recovery left behind.
    async fn discard(&self, name: &str) {
        if let Err(e) = self.engine.remove_container(name).await {
            if !e.is_not_found() {
                tracing::warn!(container = %name, error = %e, "failed to discard replacement container");
            }
        }
        if let Err(e) = self.engine.remove_image(&image_tag(name)).await {
            if !e.is_not_found() {
                tracing::warn!(image = %name, error = %e, "failed to discard replacement image");
            }
        }
    }

    /// Snapshots this container into image `name` and creates, without
    /// starting, a container `name` from it.
    ///
    /// With `args`, the arguments joined by single spaces form the new
    /// container's command.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved`, `InvalidName`, `InvalidCommand` or an engine error.
    pub async fn duplicate(&self, name: &str, args: Option<&[String]>) -> Result<Self> {
        let handle = self.live()?;
        validate_name(name)?;
        let cmd = args.map(|args| split_command(&args.join(" "))).transpose()?;

        self.engine.commit_container(&handle.id, name).await?;

        let mut options = CreateOptions::new(image_tag(name)).with_name(name);
        if let Some(cmd) = cmd {
            options = options.with_cmd(cmd);
        }
        for bind in &self.binds {
            options = options.with_bind(bind.clone());
        }
        let id = self.engine.create_container(&options).await?;

        tracing::debug!(source = %handle.id, container = %id, name, "duplicated container");

        let mut duplicate = Self::new(
            Arc::clone(&self.engine),
            ContainerHandle {
                id,
                name: name.to_string(),
            },
            self.binds.clone(),
            self.recovery_prefix.clone(),
        );
        duplicate.is_duplicate = true;
        Ok(duplicate)
    }

    /// Copies a local file into `destination_dir` inside the container.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved`, or an error if the file cannot be read or uploaded.
    pub async fn copy_file(&self, source: impl AsRef<Path>, destination_dir: &str) -> Result<()> {
        let handle = self.live()?;
        let archive = archive::pack_file(source.as_ref())?;
        self.engine
            .upload_archive(&handle.id, destination_dir, archive)
            .await?;
        Ok(())
    }

    /// Blocks until the container's main process exits. Returns its exit status.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved` or an engine error.
    pub async fn wait(&self) -> Result<i64> {
        let handle = self.live()?;
        Ok(self.engine.wait_container(&handle.id).await?)
    }

    /// Returns whether the container is running or created and not yet exited.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved` or an engine error.
    pub async fn is_running(&self) -> Result<bool> {
        let handle = self.live()?;
        let info = self.engine.inspect_container(&handle.id).await?;
        Ok(info.status.is_live())
    }

    /// Stops the container if it is running.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved` or an engine error.
    pub async fn stop(&self) -> Result<()> {
        if self.is_running().await? {
            let handle = self.live()?;
            self.engine.stop_container(&handle.id).await?;
            tracing::info!(name = %self.name, container = %handle.id, "stopped");
        }
        Ok(())
    }

    /// Starts a created or stopped container.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved` or an engine error.
    pub async fn start(&self) -> Result<()> {
        let handle = self.live()?;
        self.engine.start_container(&handle.id).await?;
        tracing::info!(name = %self.name, container = %handle.id, "started");
        Ok(())
    }

    /// Stops and removes the container, then deletes its image and any
    /// images retired by recoveries.
    ///
    /// Every image is attempted. The instance only becomes removed once all
    /// of them are gone; images that could not be deleted are kept so a
    /// later call can retry them.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyRemoved`, or the first engine error hit while
    /// removing the container or its images.
    pub async fn remove(&mut self) -> Result<()> {
        let handle = self.live()?.clone();

        match self.engine.inspect_container(&handle.id).await {
            Ok(info) => {
                if info.status.is_live() {
                    self.engine.stop_container(&handle.id).await?;
                }
                match self.engine.remove_container(&handle.id).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(container = %handle.id, "container already removed");
            }
            Err(e) => return Err(e.into()),
        }

        let retired = std::mem::take(&mut self.retired_images);
        let mut first_error = None;
        for image in std::iter::once(handle.name.clone()).chain(retired) {
            match self.engine.remove_image(&image_tag(&image)).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(image = %image, "image already removed");
                }
                Err(e) => {
                    tracing::warn!(image = %image, error = %e, "failed to remove image");
                    if image != handle.name {
                        self.retired_images.push(image);
                    }
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        self.target = Target::Removed;
        tracing::info!(name = %self.name, container = %handle.id, "removed");
        Ok(())
    }
}

fn recovery_failed(command: &str, source: RespawnError) -> RespawnError {
    RespawnError::RecoveryFailed {
        command: command.to_string(),
        source: Box::new(source),
    }
}
