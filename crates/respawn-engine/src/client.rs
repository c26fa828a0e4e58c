//! Docker Engine API client.
//!
//! Talks HTTP/1.1 to the engine over its Unix control socket.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;
use urlencoding::encode;

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::stream;
use crate::types::{
    BuildOptions, ContainerInfo, ContainerStatus, CreateOptions, ExecChunk, ImageInfo,
};

/// Default socket path for the Docker engine.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Default Docker Engine API version.
pub const DEFAULT_API_VERSION: &str = "1.43";

/// Exit code reported by a shell when a command cannot be executed.
const EXIT_CANNOT_EXECUTE: i64 = 126;

/// Request body variants.
enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Tar(Vec<u8>),
}

impl RequestBody {
    fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(Self::Json)
            .map_err(|e| EngineError::Protocol(format!("failed to serialize request: {e}")))
    }
}

/// Docker engine connection.
pub struct DockerEngine {
    socket_path: PathBuf,
    api_version: String,
    closed: AtomicBool,
}

impl DockerEngine {
    /// Creates an engine client with a custom socket path.
    #[must_use]
    pub fn with_socket(path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: path.as_ref().to_path_buf(),
            api_version: DEFAULT_API_VERSION.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    /// Sets the API version used as the request path prefix.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Opens a connection to the engine and checks it responds.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    pub async fn open(socket_path: impl AsRef<Path>, api_version: &str) -> Result<Self> {
        let engine = Self::with_socket(socket_path).with_api_version(api_version);
        engine.ping().await?;
        tracing::debug!(socket = %engine.socket_path.display(), "connected to engine");
        Ok(engine)
    }

    /// Returns whether [`Engine::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Performs an HTTP request to the engine.
    async fn send(&self, method: Method, path: &str, body: RequestBody) -> Result<(StatusCode, Bytes)> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }

        tracing::debug!(method = %method, path, "engine request");

        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            EngineError::Connection(format!(
                "failed to connect to engine at {}: {e}",
                self.socket_path.display()
            ))
        })?;

        let io = TokioIo::new(stream);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| EngineError::Connection(format!("HTTP handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("engine connection closed: {}", e);
            }
        });

        let builder = Request::builder()
            .method(method)
            .uri(format!("http://localhost/v{}{}", self.api_version, path))
            .header("Host", "localhost");

        let (builder, payload) = match body {
            RequestBody::Empty => (builder, Bytes::new()),
            RequestBody::Json(data) => (
                builder
                    .header("Content-Type", "application/json")
                    .header("Content-Length", data.len()),
                Bytes::from(data),
            ),
            RequestBody::Tar(data) => (
                builder
                    .header("Content-Type", "application/x-tar")
                    .header("Content-Length", data.len()),
                Bytes::from(data),
            ),
        };

        let request = builder
            .body(Full::new(payload))
            .map_err(|e| EngineError::Protocol(format!("failed to build request: {e}")))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| EngineError::Connection(format!("failed to send request: {e}")))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| EngineError::Connection(format!("failed to read response: {e}")))?
            .to_bytes();

        Ok((status, body))
    }

    /// Performs a request and fails on any non-success status.
    async fn call(&self, method: Method, path: &str, body: RequestBody) -> Result<Bytes> {
        let (status, body) = self.send(method, path, body).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status, &body))
        }
    }

    /// Performs a request and parses the JSON response.
    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T> {
        let body = self.call(method, path, body).await?;
        parse_json(&body)
    }

    /// Performs a state-change request where 304 means the state already holds.
    async fn change_state(&self, path: &str) -> Result<()> {
        let (status, body) = self.send(Method::POST, path, RequestBody::Empty).await?;
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(())
        } else {
            Err(status_error(status, &body))
        }
    }

    /// Runs the exec create/start/inspect sequence.
    async fn run_exec(&self, id: &str, cmd: &[String]) -> Result<Vec<ExecChunk>> {
        let request = ExecCreateRequest {
            attach_stdout: true,
            attach_stderr: true,
            cmd: cmd.to_vec(),
        };
        let (status, body) = self
            .send(
                Method::POST,
                &format!("/containers/{}/exec", encode(id)),
                RequestBody::json(&request)?,
            )
            .await?;
        if status == StatusCode::CONFLICT {
            return Err(EngineError::ContainerNotRunning(id.to_string()));
        }
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        let created: IdResponse = parse_json(&body)?;

        let start = ExecStartRequest {
            detach: false,
            tty: false,
        };
        let (status, raw) = self
            .send(
                Method::POST,
                &format!("/exec/{}/start", encode(&created.id)),
                RequestBody::json(&start)?,
            )
            .await?;
        if status == StatusCode::CONFLICT {
            return Err(EngineError::ContainerNotRunning(id.to_string()));
        }
        if !status.is_success() {
            return Err(status_error(status, &raw));
        }

        let mut chunks: Vec<ExecChunk> = stream::demux(&raw)
            .into_iter()
            .filter_map(|(stream_type, data)| match stream_type {
                stream::STDOUT => Some(ExecChunk::Stdout(data)),
                stream::STDERR => Some(ExecChunk::Stderr(data)),
                _ => None,
            })
            .collect();

        let inspect: ExecInspectResponse = self
            .call_json(
                Method::GET,
                &format!("/exec/{}/json", encode(&created.id)),
                RequestBody::Empty,
            )
            .await?;
        let exit_code = inspect.exit_code.unwrap_or_default();

        // The process may die between exec create and start.
        if exit_code == EXIT_CANNOT_EXECUTE && !self.inspect_container(id).await?.status.is_live() {
            return Err(EngineError::ContainerNotRunning(id.to_string()));
        }

        chunks.push(ExecChunk::Exit(exit_code));
        Ok(chunks)
    }

    /// Resolves an image ID by tag.
    async fn image_id(&self, tag: &str) -> Result<String> {
        let image: IdResponse = self
            .call_json(
                Method::GET,
                &format!("/images/{}/json", encode(tag)),
                RequestBody::Empty,
            )
            .await?;
        Ok(image.id)
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.call(Method::GET, "/_ping", RequestBody::Empty).await?;
        Ok(())
    }

    async fn build_image(&self, context: Vec<u8>, options: &BuildOptions) -> Result<String> {
        let mut path = format!(
            "/build?t={}&dockerfile={}",
            encode(&options.tag),
            encode(&options.dockerfile)
        );
        if options.remove_intermediate {
            path.push_str("&rm=1&forcerm=1");
        }

        let body = self.call(Method::POST, &path, RequestBody::Tar(context)).await?;

        let mut image_id = None;
        for message in serde_json::Deserializer::from_slice(&body).into_iter::<BuildMessage>() {
            let message = message
                .map_err(|e| EngineError::Protocol(format!("malformed build output: {e}")))?;
            if let Some(error) = message.error {
                return Err(EngineError::Build(error));
            }
            if let Some(line) = message.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    tracing::debug!(tag = %options.tag, "{}", line);
                }
            }
            if let Some(aux) = message.aux {
                image_id = Some(aux.id);
            }
        }

        let id = match image_id {
            Some(id) => id,
            None => self.image_id(&options.tag).await?,
        };
        tracing::debug!(tag = %options.tag, image = %id, "image built");
        Ok(id)
    }

    async fn create_container(&self, options: &CreateOptions) -> Result<String> {
        let path = match &options.name {
            Some(name) => format!("/containers/create?name={}", encode(name)),
            None => "/containers/create".to_string(),
        };
        let request = ContainerCreateRequest {
            image: options.image.clone(),
            cmd: options.cmd.clone(),
            attach_stdout: options.attach_stdout,
            attach_stderr: options.attach_stderr,
            host_config: HostConfig {
                binds: options.binds.clone(),
            },
        };
        let created: IdResponse = self
            .call_json(Method::POST, &path, RequestBody::json(&request)?)
            .await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.change_state(&format!("/containers/{}/start", encode(id)))
            .await
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.change_state(&format!("/containers/{}/stop", encode(id)))
            .await
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        let response: WaitResponse = self
            .call_json(
                Method::POST,
                &format!("/containers/{}/wait", encode(id)),
                RequestBody::Empty,
            )
            .await?;
        Ok(response.status_code)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/containers/{}?force=1", encode(id)),
            RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        let response: ContainerInspectResponse = self
            .call_json(
                Method::GET,
                &format!("/containers/{}/json", encode(id)),
                RequestBody::Empty,
            )
            .await?;
        Ok(ContainerInfo {
            id: response.id,
            name: trim_name(&response.name),
            status: response.state.status,
        })
    }

    async fn container_logs(&self, id: &str) -> Result<Bytes> {
        let raw = self
            .call(
                Method::GET,
                &format!("/containers/{}/logs?stdout=1&stderr=1", encode(id)),
                RequestBody::Empty,
            )
            .await?;
        Ok(Bytes::from(stream::combined_output(&raw)))
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<Vec<ExecChunk>> {
        self.run_exec(id, cmd).await
    }

    async fn commit_container(&self, id: &str, repo: &str) -> Result<String> {
        let path = format!(
            "/commit?container={}&repo={}&tag=latest",
            encode(id),
            encode(repo)
        );
        let response: IdResponse = self
            .call_json(Method::POST, &path, RequestBody::Json(b"{}".to_vec()))
            .await?;
        Ok(response.id)
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Vec<u8>) -> Result<()> {
        self.call(
            Method::PUT,
            &format!(
                "/containers/{}/archive?path={}",
                encode(id),
                encode(path)
            ),
            RequestBody::Tar(archive),
        )
        .await?;
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<ImageInfo>> {
        let images: Vec<ImageSummary> = self
            .call_json(Method::GET, "/images/json", RequestBody::Empty)
            .await?;
        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                tags: image.repo_tags.unwrap_or_default(),
            })
            .collect())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let containers: Vec<ContainerSummary> = self
            .call_json(Method::GET, "/containers/json?all=1", RequestBody::Empty)
            .await?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                name: c.names.first().map(|n| trim_name(n)).unwrap_or_default(),
                id: c.id,
                status: c.state,
            })
            .collect())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/images/{}?force=1", encode(image)),
            RequestBody::Empty,
        )
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(socket = %self.socket_path.display(), "engine connection closed");
        }
        Ok(())
    }
}

/// Maps an error response to an [`EngineError`].
fn status_error(status: StatusCode, body: &[u8]) -> EngineError {
    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    match status {
        StatusCode::NOT_FOUND => EngineError::NotFound(message),
        StatusCode::CONFLICT => EngineError::Conflict(message),
        _ => EngineError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| EngineError::Protocol(format!("failed to parse response: {e}")))
}

fn trim_name(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

// Wire types

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BuildMessage {
    #[serde(default)]
    stream: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    aux: Option<BuildAux>,
}

#[derive(Debug, Deserialize)]
struct BuildAux {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerCreateRequest {
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cmd: Option<Vec<String>>,
    attach_stdout: bool,
    attach_stderr: bool,
    host_config: HostConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    binds: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecCreateRequest {
    attach_stdout: bool,
    attach_stderr: bool,
    cmd: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ExecStartRequest {
    detach: bool,
    tty: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExecInspectResponse {
    #[serde(default)]
    exit_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WaitResponse {
    status_code: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspectResponse {
    id: String,
    #[serde(default)]
    name: String,
    state: ContainerState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerState {
    status: ContainerStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerSummary {
    id: String,
    #[serde(default)]
    names: Vec<String>,
    state: ContainerStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageSummary {
    id: String,
    #[serde(default)]
    repo_tags: Option<Vec<String>>,
}
