//! Running code in a sandbox and waiting for a sandbox to accept commands.

use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::client::Sandbox;
use crate::config::ReadyPolicy;

/// Shell command used to probe readiness.
pub const READY_PROBE: &str = "echo 'sandbox ready'";

/// Normalised result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code was zero
    pub success: bool,
    /// Captured output, trimmed
    pub output: String,
    /// `None` when the call itself failed
    pub exit_code: Option<i32>,
    /// Transport-level failure text
    pub error: Option<String>,
    pub description: String,
}

/// Run `code` in the sandbox's language runtime and capture the outcome.
///
/// Never fails: transport errors become a failed [`ExecutionResult`].
pub async fn execute_code(sandbox: &dyn Sandbox, code: &str, description: &str) -> ExecutionResult {
    if description.is_empty() {
        info!("Executing code...");
    } else {
        info!("Executing: {}", description);
    }

    match sandbox.code_run(code).await {
        Ok(out) => {
            let result = ExecutionResult {
                success: out.exit_code == 0,
                output: out.output.trim().to_string(),
                exit_code: Some(out.exit_code),
                error: None,
                description: description.to_string(),
            };
            if result.success {
                info!("Execution succeeded");
                if !result.output.is_empty() {
                    info!("Output:\n{}", result.output);
                }
            } else {
                error!("Execution failed (exit code {})", out.exit_code);
                if !result.output.is_empty() {
                    error!("Output:\n{}", result.output);
                }
            }
            result
        }
        Err(e) => {
            error!("Execution error: {}", e);
            ExecutionResult {
                success: false,
                output: String::new(),
                exit_code: None,
                error: Some(e.to_string()),
                description: description.to_string(),
            }
        }
    }
}

/// Poll the sandbox with a no-op command until it exits 0 or the timeout
/// elapses. Returns whether the sandbox became ready.
pub async fn wait_for_ready(sandbox: &dyn Sandbox, policy: ReadyPolicy) -> bool {
    info!("Waiting for sandbox {} to become ready...", sandbox.id());
    let start = Instant::now();
    let mut next_progress = policy.progress_every;

    while start.elapsed() < policy.timeout {
        // A probe may not outlive the overall deadline.
        let remaining = policy.timeout.saturating_sub(start.elapsed());
        match tokio::time::timeout(remaining, sandbox.exec(READY_PROBE)).await {
            Ok(Ok(out)) if out.exit_code == 0 => {
                info!("Sandbox ready");
                return true;
            }
            Ok(Ok(out)) => debug!("Sandbox not ready (exit code {})", out.exit_code),
            Ok(Err(e)) => debug!("Sandbox not ready: {}", e),
            Err(_) => {
                debug!("Readiness probe still pending at the deadline");
                break;
            }
        }

        let remaining = policy.timeout.saturating_sub(start.elapsed());
        tokio::time::sleep(policy.interval.min(remaining)).await;

        let elapsed = start.elapsed();
        if !policy.progress_every.is_zero() && elapsed >= next_progress {
            info!(
                "Still waiting... {}s/{}s",
                elapsed.as_secs(),
                policy.timeout.as_secs()
            );
            while next_progress <= elapsed {
                next_progress += policy.progress_every;
            }
        }
    }

    error!(
        "Sandbox {} not ready after {}s",
        sandbox.id(),
        policy.timeout.as_secs()
    );
    false
}
