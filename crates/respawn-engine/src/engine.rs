//! The engine abstraction consumed by the core.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{BuildOptions, ContainerInfo, CreateOptions, ExecChunk, ImageInfo};

/// Narrow interface to a container engine.
///
/// Every method completes its engine round-trips before returning.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Checks that the engine is reachable.
    async fn ping(&self) -> Result<()>;

    /// Builds an image from a tar build context. Returns the image ID.
    async fn build_image(&self, context: Vec<u8>, options: &BuildOptions) -> Result<String>;

    /// Creates a container without starting it. Returns the container ID.
    async fn create_container(&self, options: &CreateOptions) -> Result<String>;

    /// Starts a created or stopped container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stops a running container.
    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Blocks until the container's main process exits. Returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;

    /// Removes a container.
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Inspects a container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;

    /// Returns the container's cumulative stdout and stderr log.
    async fn container_logs(&self, id: &str) -> Result<Bytes>;

    /// Runs a command in a running container.
    ///
    /// Returns the output chunks followed by an [`ExecChunk::Exit`].
    /// Fails with `ContainerNotRunning` when the container's main process has exited.
    async fn exec(&self, id: &str, cmd: &[String]) -> Result<Vec<ExecChunk>>;

    /// Commits the container's filesystem as `repo:latest`. Returns the image ID.
    async fn commit_container(&self, id: &str, repo: &str) -> Result<String>;

    /// Extracts a tar archive into `path` inside the container.
    async fn upload_archive(&self, id: &str, path: &str, archive: Vec<u8>) -> Result<()>;

    /// Lists local images.
    async fn list_images(&self) -> Result<Vec<ImageInfo>>;

    /// Lists all containers, including stopped ones.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Removes an image by tag or ID.
    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Releases the engine connection. Later calls fail with `Closed`.
    async fn close(&self) -> Result<()>;

    /// Creates and starts a container. Returns the container ID.
    async fn run_container(&self, options: &CreateOptions) -> Result<String> {
        let id = self.create_container(options).await?;
        self.start_container(&id).await?;
        Ok(id)
    }
}
