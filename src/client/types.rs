use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label the toolbox reads to decide how `code_run` interprets code.
pub const LANGUAGE_LABEL: &str = "code-toolbox-language";

/// Parameters for provisioning a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSandboxParams {
    /// Runtime/language tag, e.g. `python`
    pub language: String,
    /// Base image reference
    pub image: String,
}

impl CreateSandboxParams {
    pub fn new(language: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            image: image.into(),
        }
    }
}

/// Information about a sandbox as reported by the API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInfo {
    pub id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Raw response of the toolbox execute endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub exit_code: i32,
    #[serde(default)]
    pub result: Option<String>,
}

/// Create sandbox request body (internal).
#[derive(Serialize)]
pub(crate) struct CreateRequest {
    pub image: String,
    pub labels: HashMap<String, String>,
}

impl From<&CreateSandboxParams> for CreateRequest {
    fn from(params: &CreateSandboxParams) -> Self {
        let mut labels = HashMap::new();
        labels.insert(LANGUAGE_LABEL.to_string(), params.language.clone());
        Self {
            image: params.image.clone(),
            labels,
        }
    }
}

/// Execute request body (internal).
#[derive(Serialize)]
pub(crate) struct ExecuteRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}
