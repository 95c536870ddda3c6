//! In-memory fakes for the tool and provisioning API.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use daytona_smoke::client::{
    CommandOutput, CreateSandboxParams, Error, Result, Sandbox, SandboxApi, SandboxInfo,
};
use daytona_smoke::tool::{Tool, ToolError, ToolOutput};

/// Reply for one `code_run` call.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit(i32, &'static str),
    Transport(&'static str),
}

pub struct FakeSandbox {
    id: String,
    /// Number of failing readiness probes before one succeeds; `None` = never
    ready_after: Option<usize>,
    /// Time each readiness probe takes before answering
    exec_delay: Option<Duration>,
    pub exec_calls: AtomicUsize,
    pub code_calls: AtomicUsize,
    replies: Mutex<VecDeque<Reply>>,
}

impl FakeSandbox {
    pub fn new(id: &str, ready_after: Option<usize>) -> Self {
        Self {
            id: id.to_string(),
            ready_after,
            exec_delay: None,
            exec_calls: AtomicUsize::new(0),
            code_calls: AtomicUsize::new(0),
            replies: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_replies(self, replies: Vec<Reply>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub fn exec_count(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&self, _command: &str) -> Result<CommandOutput> {
        let n = self.exec_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.exec_delay {
            tokio::time::sleep(delay).await;
        }
        match self.ready_after {
            Some(k) if n >= k => Ok(CommandOutput {
                exit_code: 0,
                output: "sandbox ready\n".to_string(),
            }),
            _ => Err(Error::Server {
                status: 502,
                message: "toolbox not up".to_string(),
            }),
        }
    }

    async fn code_run(&self, _code: &str) -> Result<CommandOutput> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Exit(0, "ok"));
        match reply {
            Reply::Exit(code, out) => Ok(CommandOutput {
                exit_code: code,
                output: out.to_string(),
            }),
            Reply::Transport(msg) => Err(Error::Server {
                status: 500,
                message: msg.to_string(),
            }),
        }
    }
}

/// Provisioning API that hands out [`FakeSandbox`]es and records removals.
#[derive(Default)]
pub struct FakeApi {
    pub ready_after: Option<usize>,
    pub create_fails: bool,
    pub failing_removals: HashSet<String>,
    pub hanging_removals: HashSet<String>,
    pub created: Mutex<Vec<Arc<FakeSandbox>>>,
    pub remove_calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn ready_immediately() -> Self {
        Self {
            ready_after: Some(0),
            ..Default::default()
        }
    }

    pub fn removed(&self) -> Vec<String> {
        self.remove_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxApi for FakeApi {
    async fn list(&self) -> Result<Vec<SandboxInfo>> {
        Ok(Vec::new())
    }

    async fn create(&self, _params: &CreateSandboxParams) -> Result<Arc<dyn Sandbox>> {
        if self.create_fails {
            return Err(Error::Validation("image not allowed".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        let sandbox = Arc::new(FakeSandbox::new(
            &format!("sb-{}", created.len() + 1),
            self.ready_after,
        ));
        created.push(Arc::clone(&sandbox));
        Ok(sandbox)
    }

    async fn remove(&self, sandbox: &dyn Sandbox) -> Result<()> {
        let id = sandbox.id().to_string();
        self.remove_calls.lock().unwrap().push(id.clone());
        if self.hanging_removals.contains(&id) {
            std::future::pending::<()>().await;
        }
        if self.failing_removals.contains(&id) {
            return Err(Error::Server {
                status: 500,
                message: "remove failed".to_string(),
            });
        }
        Ok(())
    }
}

/// Command-line tool fake counting server spawns.
pub struct FakeTool {
    pub spawn_result: fn() -> std::result::Result<(), ToolError>,
    pub generated_stdout: Option<&'static str>,
    pub spawns: AtomicUsize,
    pub generations: AtomicUsize,
}

impl FakeTool {
    pub fn new() -> Self {
        Self {
            spawn_result: || Ok(()),
            generated_stdout: None,
            spawns: AtomicUsize::new(0),
            generations: AtomicUsize::new(0),
        }
    }

    pub fn not_installed() -> Self {
        Self {
            spawn_result: || Err(ToolError::NotFound("daytona".to_string())),
            ..Self::new()
        }
    }

    pub fn generating(stdout: &'static str) -> Self {
        Self {
            generated_stdout: Some(stdout),
            ..Self::new()
        }
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for FakeTool {
    fn spawn_server(&self) -> std::result::Result<(), ToolError> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        (self.spawn_result)()
    }

    async fn generate_api_key(&self, _name: &str) -> std::result::Result<ToolOutput, ToolError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        match self.generated_stdout {
            Some(stdout) => Ok(ToolOutput {
                success: true,
                exit_code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
            None => Ok(ToolOutput {
                success: false,
                exit_code: Some(1),
                stdout: String::new(),
                stderr: "not logged in".to_string(),
            }),
        }
    }
}
