//! Instance creation and lookup.

use std::path::PathBuf;
use std::sync::Arc;

use respawn_engine::{archive, BuildOptions, CreateOptions, DockerEngine, Engine};

use crate::config::{BuildConfig, Config, InstanceConfig};
use crate::error::{RespawnError, Result};
use crate::instance::{ContainerHandle, ContainerInstance};
use crate::naming::{image_tag, validate_name};

/// Creates container instances and reattaches to existing ones.
///
/// A name identifies an image and container pair; it cannot be reused while
/// either still exists.
pub struct InstanceRegistry {
    engine: Arc<dyn Engine>,
    build: BuildConfig,
    instance: InstanceConfig,
    engine_socket: PathBuf,
    recovery_prefix: String,
}

impl InstanceRegistry {
    /// Creates a registry over an existing engine connection.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, config: &Config) -> Self {
        Self {
            engine,
            build: config.build.clone(),
            instance: config.instance.clone(),
            engine_socket: config.engine.socket_path.clone(),
            recovery_prefix: config.recovery.name_prefix.clone(),
        }
    }

    /// Connects to the configured engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    pub async fn connect(config: &Config) -> Result<Self> {
        let engine =
            DockerEngine::open(&config.engine.socket_path, &config.engine.api_version).await?;
        tracing::info!(socket = %config.engine.socket_path.display(), "connected to engine");
        Ok(Self::new(Arc::new(engine), config))
    }

    /// Returns whether an image tagged `name:latest` exists.
    ///
    /// # Errors
    ///
    /// Returns an engine error if images cannot be listed.
    pub async fn image_exists(&self, name: &str) -> Result<bool> {
        let tag = image_tag(name);
        let images = self.engine.list_images().await?;
        Ok(images.iter().any(|image| image.has_tag(&tag)))
    }

    /// Returns whether a container named exactly `name` exists.
    ///
    /// # Errors
    ///
    /// Returns an engine error if containers cannot be listed.
    pub async fn container_exists(&self, name: &str) -> Result<bool> {
        let containers = self.engine.list_containers().await?;
        Ok(containers.iter().any(|c| c.name == name))
    }

    /// Builds an image from the configured context and runs a container from it.
    ///
    /// Both the image and the container are named `name`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the name is not a valid engine name, `AlreadyExists`
    /// if an image or container with the name exists, or an engine error if
    /// the build or run fails.
    pub async fn start(&self, name: &str) -> Result<ContainerInstance> {
        validate_name(name)?;

        if self.image_exists(name).await? || self.container_exists(name).await? {
            return Err(RespawnError::AlreadyExists(name.to_string()));
        }

        let tag = image_tag(name);
        let context = archive::pack_context(&self.build.context_dir)?;
        let options = BuildOptions {
            tag: tag.clone(),
            dockerfile: self.build.dockerfile.clone(),
            remove_intermediate: true,
        };
        let image = self.engine.build_image(context, &options).await?;
        tracing::info!(name, image = %image, "image built");

        let binds = self.binds();
        let mut create = CreateOptions::new(tag).with_name(name);
        for bind in &binds {
            create = create.with_bind(bind.clone());
        }

        let id = match self.engine.run_container(&create).await {
            Ok(id) => id,
            Err(e) => {
                self.discard(name).await;
                return Err(e.into());
            }
        };
        tracing::info!(name, container = %id, "container started");

        Ok(ContainerInstance::new(
            Arc::clone(&self.engine),
            ContainerHandle {
                id,
                name: name.to_string(),
            },
            binds,
            self.recovery_prefix.clone(),
        ))
    }

    /// Wraps the existing container named `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no container has this exact name.
    pub async fn get_existing_instance(&self, name: &str) -> Result<ContainerInstance> {
        let containers = self.engine.list_containers().await?;
        let container = containers
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RespawnError::NotFound(name.to_string()))?;

        tracing::debug!(name, container = %container.id, "attached to existing container");

        Ok(ContainerInstance::new(
            Arc::clone(&self.engine),
            ContainerHandle {
                id: container.id,
                name: container.name,
            },
            self.binds(),
            self.recovery_prefix.clone(),
        ))
    }

    /// Releases the engine connection.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the connection cannot be closed.
    pub async fn dispose(self) -> Result<()> {
        self.engine.close().await?;
        Ok(())
    }

    fn binds(&self) -> Vec<String> {
        if self.instance.mount_engine_socket {
            let socket = self.engine_socket.display();
            vec![format!("{socket}:{socket}")]
        } else {
            Vec::new()
        }
    }

    /// Frees the name after a failed run.
    async fn discard(&self, name: &str) {
        if let Err(e) = self.engine.remove_container(name).await {
            if !e.is_not_found() {
                tracing::warn!(container = %name, error = %e, "failed to remove container");
            }
        }
        if let Err(e) = self.engine.remove_image(&image_tag(name)).await {
            if !e.is_not_found() {
                tracing::warn!(image = %name, error = %e, "failed to remove image");
            }
        }
    }
}
