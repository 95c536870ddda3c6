use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;

use super::error::{Error, Result, error_from_status};
use super::types::{CreateRequest, CreateSandboxParams, ExecuteRequest, ExecuteResponse, SandboxInfo};
use super::{CommandOutput, Sandbox, SandboxApi};

const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Builder for constructing a [`DaytonaClient`].
pub struct DaytonaClientBuilder {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl DaytonaClientBuilder {
    /// Set the request timeout. This also bounds commands run in sandboxes.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<DaytonaClient> {
        let mut headers = HeaderMap::new();
        let agent = format!("daytona-smoke/{CLIENT_VERSION}");
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&agent).map_err(|e| Error::Validation(e.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Auth(e.to_string()))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;

        Ok(DaytonaClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            exec_timeout: self.timeout,
            http,
        })
    }
}

/// REST client for the Daytona provisioning API.
#[derive(Clone)]
pub struct DaytonaClient {
    base_url: String,
    exec_timeout: Duration,
    http: reqwest::Client,
}

impl DaytonaClient {
    /// Start building a client for `base_url` authenticated with `api_key`.
    pub fn builder(base_url: impl Into<String>, api_key: impl Into<String>) -> DaytonaClientBuilder {
        DaytonaClientBuilder {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List all sandboxes visible to the key.
    pub async fn list_sandboxes(&self) -> Result<Vec<SandboxInfo>> {
        self.request(reqwest::Method::GET, "/sandbox", None::<&()>)
            .await
    }

    /// Provision a sandbox.
    pub async fn create_sandbox(&self, params: &CreateSandboxParams) -> Result<SandboxInfo> {
        let body = CreateRequest::from(params);
        self.request(reqwest::Method::POST, "/sandbox", Some(&body))
            .await
    }

    /// Remove a sandbox by id.
    pub async fn remove_sandbox(&self, id: &str) -> Result<()> {
        self.send(
            reqwest::Method::DELETE,
            &format!("/sandbox/{id}"),
            None::<&()>,
        )
        .await?;
        Ok(())
    }

    /// Run a shell command through the sandbox toolbox.
    pub async fn execute(&self, id: &str, command: &str) -> Result<ExecuteResponse> {
        let body = ExecuteRequest {
            command: command.to_string(),
            timeout: Some(self.exec_timeout.as_secs()),
        };
        self.request(
            reqwest::Method::POST,
            &format!("/toolbox/{id}/toolbox/process/execute"),
            Some(&body),
        )
        .await
    }

    // -- Internal --

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&(impl serde::Serialize + ?Sized)>,
    ) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.http.request(method, &url);
        if let Some(b) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(b);
        }

        let response = req.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if status >= 400 {
            return Err(error_from_status(status, &text));
        }
        Ok(text)
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&(impl serde::Serialize + ?Sized)>,
    ) -> Result<T> {
        let text = self.send(method, path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Wrap Python source into a shell command that survives any quoting.
pub(crate) fn python_command(code: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(code);
    format!("sh -c \"echo '{encoded}' | base64 -d | python3 -u\"")
}

#[async_trait]
impl SandboxApi for DaytonaClient {
    async fn list(&self) -> Result<Vec<SandboxInfo>> {
        self.list_sandboxes().await
    }

    async fn create(&self, params: &CreateSandboxParams) -> Result<Arc<dyn Sandbox>> {
        let info = self.create_sandbox(params).await?;
        Ok(Arc::new(RemoteSandbox {
            info,
            client: self.clone(),
        }))
    }

    async fn remove(&self, sandbox: &dyn Sandbox) -> Result<()> {
        self.remove_sandbox(sandbox.id()).await
    }
}

/// Handle to a sandbox provisioned through [`DaytonaClient`].
///
/// Owns a clone of the client (`reqwest::Client` is `Arc`-backed).
pub struct RemoteSandbox {
    info: SandboxInfo,
    client: DaytonaClient,
}

#[async_trait]
impl Sandbox for RemoteSandbox {
    fn id(&self) -> &str {
        &self.info.id
    }

    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let resp = self.client.execute(&self.info.id, command).await?;
        Ok(resp.into())
    }

    async fn code_run(&self, code: &str) -> Result<CommandOutput> {
        self.exec(&python_command(code)).await
    }
}
