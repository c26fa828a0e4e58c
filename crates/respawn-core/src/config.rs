//! Configuration management.
//!
//! Configuration is loaded from multiple sources with the following priority:
//!
//! 1. Environment variables (`RESPAWN_*`, nested keys separated by `__`)
//! 2. User configuration file (`~/.config/respawn/config.toml`)
//! 3. System configuration file (`/etc/respawn/config.toml`)
//! 4. Default values
//!
//! ## Example Configuration File
//!
//! ```toml
//! [engine]
//! socket_path = "/var/run/docker.sock"
//! api_version = "1.43"
//!
//! [build]
//! context_dir = "."
//! dockerfile = "Dockerfile"
//!
//! [instance]
//! mount_engine_socket = false
//!
//! [recovery]
//! name_prefix = "respawn"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use respawn_engine::{DEFAULT_API_VERSION, DEFAULT_SOCKET_PATH};
use serde::{Deserialize, Serialize};

/// Environment variable prefix.
const ENV_PREFIX: &str = "RESPAWN_";

/// respawn configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine connection.
    pub engine: EngineConfig,
    /// Image builds.
    pub build: BuildConfig,
    /// Started containers.
    pub instance: InstanceConfig,
    /// Failure recovery.
    pub recovery: RecoveryConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file(user_config_path()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Loads configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}

/// Engine connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine control socket.
    pub socket_path: PathBuf,
    /// Engine API version.
    pub api_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

/// Image build configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Directory sent to the engine as the build context.
    pub context_dir: PathBuf,
    /// Dockerfile path relative to the build context.
    pub dockerfile: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            context_dir: PathBuf::from("."),
            dockerfile: "Dockerfile".to_string(),
        }
    }
}

/// Configuration for started containers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Bind the engine control socket into started containers.
    pub mount_engine_socket: bool,
}

/// Recovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Prefix for disposable replacement names.
    pub name_prefix: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            name_prefix: "respawn".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

fn default_socket_path() -> PathBuf {
    std::env::var("DOCKER_HOST")
        .ok()
        .as_deref()
        .and_then(socket_from_host)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Extracts the socket path from a `unix://` engine host URL.
fn socket_from_host(host: &str) -> Option<PathBuf> {
    host.strip_prefix("unix://")
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("respawn")
        .join("config.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/respawn/config.toml")
}
