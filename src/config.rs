//! Configuration parsing for daytona-smoke.toml files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "daytona-smoke.toml";

/// Environment variable that overrides `server.api_url`.
pub const API_URL_ENV: &str = "DAYTONA_API_URL";

/// Root configuration structure matching the daytona-smoke.toml schema.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Timeout for a single `/health` probe
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
    /// Delay between probes while waiting for a freshly spawned server
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            health_timeout_secs: default_health_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_health_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_max_poll_attempts() -> u32 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Name or path of the daytona executable
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Name given to generated API keys
    #[serde(default = "default_key_name")]
    pub key_name: String,
    #[serde(default = "default_generate_timeout_secs")]
    pub generate_timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            key_name: default_key_name(),
            generate_timeout_secs: default_generate_timeout_secs(),
        }
    }
}

fn default_binary() -> String {
    "daytona".to_string()
}

fn default_key_name() -> String {
    "python-sdk-auto".to_string()
}

fn default_generate_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_image")]
    pub image: String,
    /// Total time allowed for a new sandbox to answer a no-op command
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_ready_poll_secs")]
    pub ready_poll_secs: u64,
    /// Interval between "still waiting" progress logs
    #[serde(default = "default_progress_every_secs")]
    pub progress_every_secs: u64,
    /// Per-request timeout for commands run inside the sandbox
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
    /// Bound on a single removal call during cleanup
    #[serde(default = "default_remove_timeout_secs")]
    pub remove_timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            image: default_image(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_secs: default_ready_poll_secs(),
            progress_every_secs: default_progress_every_secs(),
            exec_timeout_secs: default_exec_timeout_secs(),
            remove_timeout_secs: default_remove_timeout_secs(),
        }
    }
}

fn default_language() -> String {
    "python".to_string()
}

fn default_image() -> String {
    "mcr.microsoft.com/devcontainers/python:3.11-bullseye".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    300
}

fn default_ready_poll_secs() -> u64 {
    5
}

fn default_progress_every_secs() -> u64 {
    30
}

fn default_exec_timeout_secs() -> u64 {
    180
}

fn default_remove_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Pause between consecutive smoke tests
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
        }
    }
}

fn default_delay_secs() -> u64 {
    2
}

/// Bounded fixed-interval polling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Timing for the sandbox readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPolicy {
    pub timeout: Duration,
    pub interval: Duration,
    pub progress_every: Duration,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Load from an explicit path, or from the first default location that
    /// exists, or fall back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_locations().into_iter().find(|p| p.exists()) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Apply `DAYTONA_API_URL` and then a command-line override, in that order.
    pub fn with_api_url_override(mut self, env_url: Option<String>, cli_url: Option<String>) -> Self {
        if let Some(url) = cli_url.or(env_url).filter(|u| !u.trim().is_empty()) {
            self.server.api_url = url.trim().trim_end_matches('/').to_string();
        }
        self
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.server.health_timeout_secs)
    }

    pub fn server_poll(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.server.poll_interval_secs),
            max_attempts: self.server.max_poll_attempts,
        }
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.cli.generate_timeout_secs)
    }

    pub fn ready_policy(&self) -> ReadyPolicy {
        ReadyPolicy {
            timeout: Duration::from_secs(self.sandbox.ready_timeout_secs),
            interval: Duration::from_secs(self.sandbox.ready_poll_secs),
            progress_every: Duration::from_secs(self.sandbox.progress_every_secs),
        }
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox.exec_timeout_secs)
    }

    pub fn remove_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox.remove_timeout_secs)
    }

    pub fn suite_delay(&self) -> Duration {
        Duration::from_secs(self.suite.delay_secs)
    }
}

/// `./daytona-smoke.toml`, then `<config dir>/daytona-smoke/config.toml`.
fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("daytona-smoke").join("config.toml"));
    }
    paths
}
