//! Session state and the end-to-end smoke-test flow.
//!
//! The orchestrator owns the backend address, the resolved credential, the
//! connected client and every sandbox it asked the backend to create. Each
//! tracked sandbox is handed to the removal call exactly once by
//! [`Orchestrator::cleanup`], whatever path the run took.

use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use sysinfo::System;
use tracing::{error, info, warn};

use crate::client::{self, CreateSandboxParams, DaytonaClient, Sandbox, SandboxApi};
use crate::config::Config;
use crate::credential::{self, Credential};
use crate::execution::wait_for_ready;
use crate::server::BackendServer;
use crate::suite::{SMOKE_TESTS, SuiteReport, run_suite};
use crate::tool::Tool;

/// How a full run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    InitFailed,
    CreateFailed,
    Interrupted,
    Tested(SuiteReport),
}

impl RunOutcome {
    /// 0 only when every test passed.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Tested(report) if report.all_passed() => 0,
            _ => 1,
        }
    }
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Host and session facts logged at the start of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub version: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu_count: usize,
    /// Bytes
    pub memory_total: u64,
    /// Bytes
    pub memory_available: u64,
    pub api_url: String,
    pub has_client: bool,
    pub sandbox_count: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub struct Orchestrator {
    config: Config,
    server: BackendServer,
    tool: Arc<dyn Tool>,
    credential: Option<Credential>,
    client: Option<Arc<dyn SandboxApi>>,
    sandboxes: Vec<Arc<dyn Sandbox>>,
}

impl Orchestrator {
    pub fn new(config: Config, tool: Arc<dyn Tool>) -> Result<Self> {
        let server = BackendServer::new(
            &config.server.api_url,
            config.health_timeout(),
            config.server_poll(),
        )
        .context("Failed to build health-check client")?;

        Ok(Self {
            config,
            server,
            tool,
            credential: None,
            client: None,
            sandboxes: Vec::new(),
        })
    }

    pub fn api_url(&self) -> &str {
        self.server.base_url()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// The connected provisioning client.
    pub fn client(&self) -> client::Result<Arc<dyn SandboxApi>> {
        self.client.clone().ok_or(client::Error::NotConnected)
    }

    /// Ids of tracked sandboxes, in creation order.
    pub fn sandbox_ids(&self) -> Vec<String> {
        self.sandboxes.iter().map(|s| s.id().to_string()).collect()
    }

    /// Use `client` for all further provisioning calls.
    pub fn attach_client(&mut self, client: Arc<dyn SandboxApi>) {
        self.client = Some(client);
    }

    pub fn system_info(&self) -> SystemInfo {
        let mut system = System::new();
        system.refresh_memory();

        SystemInfo {
            version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            memory_total: system.total_memory(),
            memory_available: system.available_memory(),
            api_url: self.api_url().to_string(),
            has_client: self.has_client(),
            sandbox_count: self.sandboxes.len(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Start the server if needed, resolve a credential, connect and verify
    /// the connection by listing sandboxes.
    pub async fn initialize(&mut self, external_key: Option<&str>) -> bool {
        info!("Initializing Daytona client...");

        let outcome = self.server.start(self.tool.as_ref()).await;
        if !outcome.is_up() {
            error!("Daytona server unavailable: {:?}", outcome);
            return false;
        }

        let Some(credential) =
            credential::resolve(external_key, self.tool.as_ref(), &self.config.cli.key_name).await
        else {
            return false;
        };

        let client = match DaytonaClient::builder(self.api_url(), credential.key())
            .timeout(self.config.exec_timeout())
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build API client: {}", e);
                return false;
            }
        };
        self.credential = Some(credential);
        self.attach_client(Arc::new(client));
        self.verify_client().await
    }

    async fn verify_client(&self) -> bool {
        let result = match self.client() {
            Ok(client) => client.list().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(existing) => {
                info!(
                    "Client initialized, {} existing sandbox(es)",
                    existing.len()
                );
                true
            }
            Err(e) => {
                error!("Client verification failed: {}", e);
                false
            }
        }
    }

    /// Provision a sandbox and wait for it to accept commands.
    ///
    /// The handle is tracked for cleanup as soon as the backend returns it, so
    /// a sandbox that never becomes ready is still removed later.
    pub async fn create_sandbox(&mut self) -> Option<Arc<dyn Sandbox>> {
        let sandbox = self.provision().await?;
        self.await_ready(sandbox).await
    }

    /// Ask the backend for a sandbox and track the returned handle.
    async fn provision(&mut self) -> Option<Arc<dyn Sandbox>> {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                error!("Cannot create sandbox: {}", e);
                return None;
            }
        };

        let params =
            CreateSandboxParams::new(&self.config.sandbox.language, &self.config.sandbox.image);
        info!(
            "Creating {} sandbox from {}...",
            params.language, params.image
        );

        let sandbox = match client.create(&params).await {
            Ok(sandbox) => sandbox,
            Err(e) => {
                error!("Failed to create sandbox: {}", e);
                return None;
            }
        };
        self.sandboxes.push(Arc::clone(&sandbox));
        info!("Sandbox provisioning: {}", sandbox.id());
        Some(sandbox)
    }

    async fn await_ready(&self, sandbox: Arc<dyn Sandbox>) -> Option<Arc<dyn Sandbox>> {
        if wait_for_ready(sandbox.as_ref(), self.config.ready_policy()).await {
            info!("Sandbox created: {}", sandbox.id());
            Some(sandbox)
        } else {
            error!("Sandbox startup timed out");
            None
        }
    }

    /// Run the built-in smoke battery against `sandbox`.
    pub async fn run_tests(&self, sandbox: &dyn Sandbox) -> SuiteReport {
        run_suite(sandbox, SMOKE_TESTS, self.config.suite_delay()).await
    }

    /// Remove every tracked sandbox once, in creation order, then forget them.
    pub async fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.sandboxes.is_empty() {
            info!("Nothing to clean up");
            return report;
        }

        let sandboxes = std::mem::take(&mut self.sandboxes);
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                error!("Cannot remove {} sandbox(es): {}", sandboxes.len(), e);
                report.failed = sandboxes.iter().map(|s| s.id().to_string()).collect();
                return report;
            }
        };

        info!("Removing {} sandbox(es)...", sandboxes.len());
        let bound = self.config.remove_timeout();
        for (i, sandbox) in sandboxes.iter().enumerate() {
            let id = sandbox.id().to_string();
            info!("Removing sandbox {}: {}", i + 1, id);
            match tokio::time::timeout(bound, client.remove(sandbox.as_ref())).await {
                Ok(Ok(())) => {
                    info!("Sandbox {} removed", i + 1);
                    report.removed.push(id);
                }
                Ok(Err(e)) => {
                    error!("Failed to remove sandbox {}: {}", i + 1, e);
                    report.failed.push(id);
                }
                Err(_) => {
                    error!(
                        "Removing sandbox {} timed out after {}s",
                        i + 1,
                        bound.as_secs()
                    );
                    report.failed.push(id);
                }
            }
        }

        info!("Cleanup finished");
        report
    }

    /// Full flow short of cleanup: initialize, create, test.
    ///
    /// Callers must run [`Orchestrator::cleanup`] afterwards on every path.
    pub async fn run(&mut self, external_key: Option<&str>) -> Result<RunOutcome> {
        self.run_until(external_key, std::future::pending()).await
    }

    /// Like [`Orchestrator::run`], but stops early once `shutdown` completes.
    ///
    /// The provisioning call itself is never abandoned: a sandbox the backend
    /// hands back is tracked before the interrupt is honoured, so
    /// [`Orchestrator::cleanup`] still removes it.
    pub async fn run_until<F>(
        &mut self,
        external_key: Option<&str>,
        shutdown: F,
    ) -> Result<RunOutcome>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!("System info:");
        let info = serde_json::to_value(self.system_info())?;
        if let Some(fields) = info.as_object() {
            for (key, value) in fields {
                info!("  {}: {}", key, value);
            }
        }

        let initialized = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(interrupted()),
            ok = self.initialize(external_key) => ok,
        };
        if !initialized {
            error!("Initialization failed");
            info!("Troubleshooting:");
            info!("  1. Check Docker is running: docker info");
            info!("  2. Check Daytona is installed: daytona version");
            info!("  3. Start the server manually: daytona server");
            info!("  4. Check connectivity: curl {}/health", self.api_url());
            return Ok(RunOutcome::InitFailed);
        }

        let Some(provisioned) = self.provision().await else {
            error!("Sandbox creation failed");
            return Ok(RunOutcome::CreateFailed);
        };

        let ready = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(interrupted()),
            ready = self.await_ready(provisioned) => ready,
        };
        let Some(sandbox) = ready else {
            error!("Sandbox creation failed");
            return Ok(RunOutcome::CreateFailed);
        };

        let report = tokio::select! {
            biased;
            _ = &mut shutdown => return Ok(interrupted()),
            report = self.run_tests(sandbox.as_ref()) => report,
        };
        if report.all_passed() {
            info!("Daytona deployment verified");
            info!("Web UI: {}", self.api_url());
            if let Some(credential) = &self.credential {
                info!("API key: {}", credential.masked());
            }
        } else {
            warn!("Some checks failed; review network access and permissions");
        }
        Ok(RunOutcome::Tested(report))
    }
}

fn interrupted() -> RunOutcome {
    warn!("Interrupted by user");
    RunOutcome::Interrupted
}
