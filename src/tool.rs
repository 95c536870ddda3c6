//! Wrapper around the external `daytona` command-line tool.
//!
//! Only two invocations are used: launching the local server detached and
//! generating an API key. Both are behind the [`Tool`] trait so the
//! orchestrator can run against a fake.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

/// Errors from invoking the command-line tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("`{0}` executable not found")]
    NotFound(String),

    #[error("`{command}` timed out after {secs}s", secs = .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// The command-line tool as seen by the orchestrator.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Launch `<tool> server` in the background and return immediately.
    fn spawn_server(&self) -> Result<(), ToolError>;

    /// Run `<tool> api-key generate --name <name>` to completion.
    async fn generate_api_key(&self, name: &str) -> Result<ToolOutput, ToolError>;

    /// File receiving the spawned server's output, if any.
    fn server_log(&self) -> Option<&Path> {
        None
    }
}

/// The real `daytona` binary.
pub struct DaytonaCli {
    binary: String,
    generate_timeout: Duration,
    server_log: PathBuf,
}

impl DaytonaCli {
    pub fn new(binary: impl Into<String>, generate_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            generate_timeout,
            server_log: std::env::temp_dir()
                .join(format!("daytona-smoke-server-{}.log", std::process::id())),
        }
    }

    /// Send the spawned server's output to `path` instead.
    pub fn with_server_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_log = path.into();
        self
    }

    fn map_spawn_error(&self, command: String, err: std::io::Error) -> ToolError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotFound(self.binary.clone())
        } else {
            ToolError::Io {
                command,
                source: err,
            }
        }
    }
}

#[async_trait]
impl Tool for DaytonaCli {
    fn spawn_server(&self) -> Result<(), ToolError> {
        let command = format!("{} server", self.binary);
        let log = std::fs::File::create(&self.server_log).map_err(|e| ToolError::Io {
            command: command.clone(),
            source: e,
        })?;
        let log_err = log.try_clone().map_err(|e| ToolError::Io {
            command: command.clone(),
            source: e,
        })?;

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("server")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // Own process group so a Ctrl-C aimed at us does not reach the server
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| self.map_spawn_error(command, e))?;
        debug!(
            "Spawned server pid {:?} (log: {})",
            child.id(),
            self.server_log.display()
        );
        // The server outlives the handle; the runtime reaps it if it exits.
        drop(child);
        Ok(())
    }

    fn server_log(&self) -> Option<&Path> {
        Some(&self.server_log)
    }

    async fn generate_api_key(&self, name: &str) -> Result<ToolOutput, ToolError> {
        let command = format!("{} api-key generate --name {}", self.binary, name);
        let child = tokio::process::Command::new(&self.binary)
            .args(["api-key", "generate", "--name", name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.map_spawn_error(command.clone(), e))?;

        let output = match tokio::time::timeout(self.generate_timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|e| ToolError::Io {
                command: command.clone(),
                source: e,
            })?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    command,
                    timeout: self.generate_timeout,
                });
            }
        };

        Ok(ToolOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_missing_binary_is_not_found() {
        let cli = DaytonaCli::new("daytona-smoke-no-such-binary", Duration::from_secs(1));
        let err = cli.spawn_server().unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref b) if b == "daytona-smoke-no-such-binary"));
    }

    #[tokio::test]
    async fn generate_missing_binary_is_not_found() {
        let cli = DaytonaCli::new("daytona-smoke-no-such-binary", Duration::from_secs(1));
        let err = cli.generate_api_key("test").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_captures_stdout() {
        // `echo` ignores the subcommand and prints its arguments.
        let cli = DaytonaCli::new("echo", Duration::from_secs(5));
        let out = cli.generate_api_key("smoke").await.unwrap();
        assert!(out.success);
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout.trim(), "api-key generate --name smoke");
    }

    #[test]
    fn server_log_is_per_process() {
        let cli = DaytonaCli::new("daytona", Duration::from_secs(1));
        let log = cli.server_log().unwrap();
        let name = log.file_name().unwrap().to_string_lossy();
        assert_eq!(name, format!("daytona-smoke-server-{}.log", std::process::id()));
        assert!(log.starts_with(std::env::temp_dir()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawned_server_writes_to_its_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("server.log");
        let cli = DaytonaCli::new("echo", Duration::from_secs(1)).with_server_log(&log);
        cli.spawn_server().unwrap();

        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(&log).unwrap_or_default();
            if !contents.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(contents.trim(), "server");
    }

    #[test]
    fn timeout_error_message_reports_seconds() {
        let err = ToolError::Timeout {
            command: "daytona api-key generate --name x".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "`daytona api-key generate --name x` timed out after 30s"
        );
    }
}
