//! In-memory engine used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use respawn_core::{Config, InstanceRegistry};
use respawn_engine::{
    BuildOptions, ContainerInfo, ContainerStatus, CreateOptions, Engine, EngineError, ExecChunk,
    ImageInfo, Result,
};
use tempfile::TempDir;

/// Top-level entries of every built image.
pub const BASE_FILES: &[&str] = &["/bin", "/etc", "/tmp"];

/// What a container does when started with the image's default command.
#[derive(Debug, Clone)]
pub struct Recipe {
    /// Output written on start.
    pub banner: Vec<u8>,
    /// Whether the main process keeps running after writing the banner.
    pub keeps_running: bool,
    /// How long the main process runs before `wait` returns.
    pub runs_for: Duration,
}

impl Recipe {
    /// A container that prints `banner` and exits.
    pub fn exits(banner: &[u8]) -> Self {
        Self {
            banner: banner.to_vec(),
            keeps_running: false,
            runs_for: Duration::ZERO,
        }
    }

    /// A container that prints `banner` and keeps running.
    pub fn keeps_running(banner: &[u8]) -> Self {
        Self {
            banner: banner.to_vec(),
            keeps_running: true,
            runs_for: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeImage {
    pub id: String,
    pub tag: String,
    pub recipe: Recipe,
    pub files: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub cmd: Option<Vec<String>>,
    pub binds: Vec<String>,
    pub status: ContainerStatus,
    pub exit_code: i64,
    pub logs: Vec<u8>,
    pub files: BTreeSet<String>,
    pub recipe: Recipe,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub images: HashMap<String, FakeImage>,
    pub containers: Vec<FakeContainer>,
    pub calls: Vec<String>,
    pub build_contexts: Vec<Vec<String>>,
    pub closed: bool,
    pub next_id: u64,
    pub fail_build: bool,
    pub fail_start: bool,
    pub fail_commit: bool,
    pub fail_exec: bool,
    /// Image reference whose removal fails with a conflict.
    pub fail_remove_image: Option<String>,
}

impl FakeState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:012x}", self.next_id)
    }

    pub fn container(&self, id_or_name: &str) -> Option<&FakeContainer> {
        self.containers
            .iter()
            .find(|c| c.id == id_or_name || c.name == id_or_name)
    }

    fn container_mut(&mut self, id_or_name: &str) -> Result<&mut FakeContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id_or_name || c.name == id_or_name)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id_or_name}")))
    }

    pub fn image_tags(&self) -> BTreeSet<String> {
        self.images.keys().cloned().collect()
    }

    pub fn container_names(&self) -> BTreeSet<String> {
        self.containers.iter().map(|c| c.name.clone()).collect()
    }
}

/// Engine double that simulates a handful of shell commands.
pub struct FakeEngine {
    recipe: Recipe,
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new(recipe: Recipe) -> Arc<Self> {
        Arc::new(Self {
            recipe,
            state: Mutex::new(FakeState::default()),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn begin(&self, call: &str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        if state.closed {
            return Err(EngineError::Closed);
        }
        state.calls.push(call.to_string());
        Ok(state)
    }
}

/// Runs a simulated command against a container filesystem.
fn simulate(files: &mut BTreeSet<String>, args: &[String]) -> (Vec<u8>, Vec<u8>, i64) {
    let program = args.first().map(String::as_str).unwrap_or_default();
    match program {
        "echo" => (format!("{}\n", args[1..].join(" ")).into_bytes(), Vec::new(), 0),
        "ls" => {
            let dir = args.get(1).map_or("/", |d| d.trim_end_matches('/'));
            let dir = if dir.is_empty() { "/" } else { dir };
            let mut out = String::new();
            for file in files.iter() {
                let path = Path::new(file);
                if path.parent() == Some(Path::new(dir)) {
                    if let Some(name) = path.file_name() {
                        out.push_str(&name.to_string_lossy());
                        out.push('\n');
                    }
                }
            }
            (out.into_bytes(), Vec::new(), 0)
        }
        "touch" => {
            for path in &args[1..] {
                files.insert(path.clone());
            }
            (Vec::new(), Vec::new(), 0)
        }
        "true" => (Vec::new(), Vec::new(), 0),
        "false" => (Vec::new(), Vec::new(), 1),
        other => (
            Vec::new(),
            format!("sh: {other}: not found\n").into_bytes(),
            127,
        ),
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn ping(&self) -> Result<()> {
        self.begin("ping").map(|_| ())
    }

    async fn build_image(&self, context: Vec<u8>, options: &BuildOptions) -> Result<String> {
        let mut state = self.begin(&format!("build_image:{}", options.tag))?;
        if state.fail_build {
            return Err(EngineError::Build("COPY failed: no such file".to_string()));
        }

        let mut entries = Vec::new();
        let mut archive = tar::Archive::new(&context[..]);
        for entry in archive.entries().map_err(EngineError::Io)? {
            let mut entry = entry.map_err(EngineError::Io)?;
            let path = entry.path().map_err(EngineError::Io)?.to_string_lossy().into_owned();
            let mut sink = Vec::new();
            entry.read_to_end(&mut sink).map_err(EngineError::Io)?;
            entries.push(path);
        }
        state.build_contexts.push(entries);

        let id = format!("sha256:{}", state.next_id());
        state.images.insert(
            options.tag.clone(),
            FakeImage {
                id: id.clone(),
                tag: options.tag.clone(),
                recipe: self.recipe.clone(),
                files: BASE_FILES.iter().map(ToString::to_string).collect(),
            },
        );
        Ok(id)
    }

    async fn create_container(&self, options: &CreateOptions) -> Result<String> {
        let mut state = self.begin("create_container")?;
        let name = options.name.clone().unwrap_or_default();
        if state.container(&name).is_some() {
            return Err(EngineError::Conflict(format!(
                "The container name \"/{name}\" is already in use"
            )));
        }
        let image = state
            .images
            .get(&options.image)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {}", options.image)))?;

        let id = state.next_id();
        state.containers.push(FakeContainer {
            id: id.clone(),
            name,
            image: options.image.clone(),
            cmd: options.cmd.clone(),
            binds: options.binds.clone(),
            status: ContainerStatus::Created,
            exit_code: 0,
            logs: Vec::new(),
            files: image.files,
            recipe: image.recipe,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.begin(&format!("start_container:{id}"))?;
        if state.fail_start {
            return Err(EngineError::Api {
                status: 500,
                message: "failed to set up container networking".to_string(),
            });
        }
        let container = state.container_mut(id)?;
        if container.status == ContainerStatus::Running {
            return Ok(());
        }

        if let Some(cmd) = container.cmd.clone() {
            let (stdout, stderr, code) = simulate(&mut container.files, &cmd);
            container.logs.extend(stdout);
            container.logs.extend(stderr);
            container.exit_code = code;
            container.status = ContainerStatus::Exited;
        } else {
            let banner = container.recipe.banner.clone();
            container.logs.extend(banner);
            container.exit_code = 0;
            container.status = if container.recipe.keeps_running {
                ContainerStatus::Running
            } else {
                ContainerStatus::Exited
            };
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.begin(&format!("stop_container:{id}"))?;
        let container = state.container_mut(id)?;
        container.status = ContainerStatus::Exited;
        container.exit_code = 137;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let runs_for = {
            let mut state = self.begin(&format!("wait_container:{id}"))?;
            let container = state.container_mut(id)?;
            if container.status == ContainerStatus::Exited {
                return Ok(container.exit_code);
            }
            container.recipe.runs_for
        };

        tokio::time::sleep(runs_for).await;

        let mut state = self.state();
        let container = state.container_mut(id)?;
        container.status = ContainerStatus::Exited;
        Ok(container.exit_code)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.begin(&format!("remove_container:{id}"))?;
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id && c.name != id);
        if state.containers.len() == before {
            return Err(EngineError::NotFound(format!("No such container: {id}")));
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let state = self.begin(&format!("inspect_container:{id}"))?;
        let container = state
            .container(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id}")))?;
        Ok(ContainerInfo {
            id: container.id.clone(),
            name: container.name.clone(),
            status: container.status,
        })
    }

    async fn container_logs(&self, id: &str) -> Result<Bytes> {
        let state = self.begin(&format!("container_logs:{id}"))?;
        let container = state
            .container(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {id}")))?;
        Ok(Bytes::from(container.logs.clone()))
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<Vec<ExecChunk>> {
        let mut state = self.begin(&format!("exec:{id}"))?;
        if state.fail_exec {
            return Err(EngineError::Api {
                status: 500,
                message: "OCI runtime exec failed".to_string(),
            });
        }
        let container = state.container_mut(id)?;
        if container.status != ContainerStatus::Running {
            return Err(EngineError::ContainerNotRunning(container.id.clone()));
        }

        let (stdout, stderr, code) = simulate(&mut container.files, cmd);
        let mut chunks = Vec::new();
        if !stdout.is_empty() {
            chunks.push(ExecChunk::Stdout(Bytes::from(stdout)));
        }
        if !stderr.is_empty() {
            chunks.push(ExecChunk::Stderr(Bytes::from(stderr)));
        }
        chunks.push(ExecChunk::Exit(code));
        Ok(chunks)
    }

    async fn commit_container(&self, id: &str, repo: &str) -> Result<String> {
        let mut state = self.begin(&format!("commit_container:{id}:{repo}"))?;
        if state.fail_commit {
            return Err(EngineError::Api {
                status: 500,
                message: "no space left on device".to_string(),
            });
        }
        let container = state.container_mut(id)?.clone();
        let image_id = format!("sha256:{}", state.next_id());
        let tag = format!("{repo}:latest");
        state.images.insert(
            tag.clone(),
            FakeImage {
                id: image_id.clone(),
                tag,
                recipe: container.recipe,
                files: container.files,
            },
        );
        Ok(image_id)
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Vec<u8>) -> Result<()> {
        let mut state = self.begin(&format!("upload_archive:{id}:{path}"))?;
        let container = state.container_mut(id)?;

        let mut reader = tar::Archive::new(&archive[..]);
        for entry in reader.entries().map_err(EngineError::Io)? {
            let entry = entry.map_err(EngineError::Io)?;
            let name = entry.path().map_err(EngineError::Io)?.to_string_lossy().into_owned();
            container
                .files
                .insert(format!("{}/{}", path.trim_end_matches('/'), name));
        }
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let state = self.begin("list_images")?;
        Ok(state
            .images
            .values()
            .map(|image| ImageInfo {
                id: image.id.clone(),
                tags: vec![image.tag.clone()],
            })
            .collect())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let state = self.begin("list_containers")?;
        Ok(state
            .containers
            .iter()
            .map(|c| ContainerInfo {
                id: c.id.clone(),
                name: c.name.clone(),
                status: c.status,
            })
            .collect())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let mut state = self.begin(&format!("remove_image:{image}"))?;
        if state.fail_remove_image.as_deref() == Some(image) {
            return Err(EngineError::Conflict(format!(
                "unable to delete {image}: image is being used by a running container"
            )));
        }
        state
            .images
            .remove(image)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(format!("No such image: {image}")))
    }

    async fn close(&self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

/// A build context holding a placeholder Dockerfile.
pub fn build_context() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
    dir
}

/// Config pointing at `context`.
pub fn config_for(context: &TempDir) -> Config {
    let mut config = Config::default();
    config.build.context_dir = context.path().to_path_buf();
    config
}

/// A registry over a fresh fake engine.
pub fn setup(recipe: Recipe) -> (TempDir, Arc<FakeEngine>, InstanceRegistry) {
    let context = build_context();
    let engine = FakeEngine::new(recipe);
    let registry = InstanceRegistry::new(engine.clone(), &config_for(&context));
    (context, engine, registry)
}
