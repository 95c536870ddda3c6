//! Client surface of the sandbox-provisioning service.
//!
//! The orchestrator only ever talks to the service through [`SandboxApi`]
//! (connect-time operations) and [`Sandbox`] (per-sandbox execution), so the
//! REST implementation in [`daytona`] can be swapped for an in-memory fake.

mod daytona;
mod error;
mod types;

use async_trait::async_trait;
use std::sync::Arc;

pub use daytona::{DaytonaClient, DaytonaClientBuilder, RemoteSandbox};
pub use error::{Error, Result, error_from_status};
pub use types::{CreateSandboxParams, ExecuteResponse, LANGUAGE_LABEL, SandboxInfo};

/// Output of one command run inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Combined captured output, untrimmed
    pub output: String,
}

impl From<ExecuteResponse> for CommandOutput {
    fn from(resp: ExecuteResponse) -> Self {
        Self {
            exit_code: resp.exit_code,
            output: resp.result.unwrap_or_default(),
        }
    }
}

/// A provisioned sandbox.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Identifier assigned by the backend
    fn id(&self) -> &str;

    /// Run a shell command
    async fn exec(&self, command: &str) -> Result<CommandOutput>;

    /// Run source code in the sandbox's language runtime
    async fn code_run(&self, code: &str) -> Result<CommandOutput>;
}

/// Operations on a connected provisioning service.
#[async_trait]
pub trait SandboxApi: Send + Sync {
    /// List existing sandboxes
    async fn list(&self) -> Result<Vec<SandboxInfo>>;

    /// Provision a new sandbox
    async fn create(&self, params: &CreateSandboxParams) -> Result<Arc<dyn Sandbox>>;

    /// Remove a sandbox
    async fn remove(&self, sandbox: &dyn Sandbox) -> Result<()>;
}
