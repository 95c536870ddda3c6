//! Health probing and idempotent startup of the local backend server.

use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::PollPolicy;
use crate::tool::{Tool, ToolError};

/// Outcome of [`BackendServer::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Healthy before anything was spawned
    AlreadyRunning,
    /// Spawned and became healthy after `attempts` polls
    Started { attempts: u32 },
    /// Spawned but never became healthy
    TimedOut { attempts: u32 },
    /// The tool executable could not be found
    NotInstalled,
    /// Spawning failed for another reason
    SpawnFailed(String),
}

impl StartOutcome {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::Started { .. })
    }
}

/// The backend reachable at a base address.
pub struct BackendServer {
    base_url: String,
    http: reqwest::Client,
    poll: PollPolicy,
}

impl BackendServer {
    pub fn new(base_url: &str, health_timeout: Duration, poll: PollPolicy) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(health_timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            poll,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single bounded probe of `/health`. Only HTTP 200 counts as healthy.
    pub async fn check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                info!("Daytona server is healthy");
                true
            }
            Ok(resp) => {
                error!("Daytona server answered {} on {}", resp.status(), url);
                false
            }
            Err(e) => {
                error!("Cannot reach Daytona server at {}: {}", self.base_url, e);
                info!("Make sure the server is running: daytona server");
                false
            }
        }
    }

    /// Ensure the server is up, spawning it through `tool` only if the first
    /// probe fails. Polls at a fixed interval up to the configured ceiling.
    pub async fn start(&self, tool: &dyn Tool) -> StartOutcome {
        if self.check().await {
            return StartOutcome::AlreadyRunning;
        }

        info!("Starting Daytona server...");
        match tool.spawn_server() {
            Ok(()) => {}
            Err(ToolError::NotFound(binary)) => {
                error!("`{}` not found; install Daytona first", binary);
                info!("Installation guide: https://docs.daytona.io/installation/");
                return StartOutcome::NotInstalled;
            }
            Err(e) => {
                error!("Failed to start Daytona server: {}", e);
                return StartOutcome::SpawnFailed(e.to_string());
            }
        }

        let max = self.poll.max_attempts;
        for attempt in 1..=max {
            tokio::time::sleep(self.poll.interval).await;
            if self.check().await {
                info!("Daytona server started");
                return StartOutcome::Started { attempts: attempt };
            }
            info!("Waiting for server to start... ({}/{})", attempt, max);
        }

        warn!("Daytona server did not become healthy after {} checks", max);
        if let Some(log) = tool.server_log() {
            info!("Server output: {}", log.display());
        }
        StartOutcome::TimedOut { attempts: max }
    }
}
