//! API key resolution.
//!
//! Sources are tried in a fixed order: an externally supplied key, then a key
//! generated by the command-line tool. Parsing of the tool's free-form output
//! lives in [`parse_generated_key`] so format changes stay in one place.

use tracing::{error, info, warn};

use crate::tool::Tool;

/// Environment variable carrying a pre-provisioned key.
pub const API_KEY_ENV: &str = "DAYTONA_API_KEY";

/// Value shipped in sample `.env` files; treated as unset.
pub const PLACEHOLDER_KEY: &str = "your-api-key-here";

/// Generated keys printed without a marker are longer than this.
const MIN_BARE_KEY_LEN: usize = 20;

/// Line prefixes of tool chatter that are never a bare key.
const BOILERPLATE_PREFIXES: &[&str] = &["API", "Generated"];

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    External,
    Generated,
}

/// A resolved API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    key: String,
    source: CredentialSource,
}

impl Credential {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Key shortened for logs: first 10 characters followed by `...`.
    pub fn masked(&self) -> String {
        mask_key(&self.key)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key", &self.masked())
            .field("source", &self.source)
            .finish()
    }
}

pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(10).collect();
    format!("{prefix}...")
}

/// Accept an externally supplied key unless it is blank or the placeholder.
pub fn external_key(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value == PLACEHOLDER_KEY {
        return None;
    }
    Some(value.to_string())
}

/// Extract a key from the output of `api-key generate`.
///
/// The first line containing `Key:` wins and yields the text after the
/// marker. Failing that, the first line longer than 20 characters that does
/// not start with a known boilerplate prefix is taken as a bare key.
pub fn parse_generated_key(stdout: &str) -> Option<String> {
    for line in stdout.trim().lines() {
        let line = line.trim();
        if let Some((_, rest)) = line.split_once("Key:") {
            let key = rest.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        } else if line.chars().count() > MIN_BARE_KEY_LEN
            && !BOILERPLATE_PREFIXES.iter().any(|p| line.starts_with(p))
        {
            return Some(line.to_string());
        }
    }
    None
}

/// Resolve a key from `external`, falling back to generation via `tool`.
///
/// Returns `None` when no source yields a key; every failure is logged.
pub async fn resolve(external: Option<&str>, tool: &dyn Tool, key_name: &str) -> Option<Credential> {
    if let Some(key) = external_key(external) {
        info!("Using externally supplied API key");
        return Some(Credential {
            key,
            source: CredentialSource::External,
        });
    }

    info!("Generating a new API key '{}'...", key_name);
    match tool.generate_api_key(key_name).await {
        Ok(output) if output.success => match parse_generated_key(&output.stdout) {
            Some(key) => {
                info!("API key generated");
                return Some(Credential {
                    key,
                    source: CredentialSource::Generated,
                });
            }
            None => {
                error!("Could not parse API key from generator output");
                info!("Command output: {}", output.stdout.trim());
            }
        },
        Ok(output) => {
            error!(
                "API key generation failed (exit code {:?}): {}",
                output.exit_code,
                output.stderr.trim()
            );
        }
        Err(e) => error!("API key generation failed: {}", e),
    }

    warn!("Automatic API key generation failed");
    info!("Generate one manually:");
    info!("  1. daytona api-key generate --name my-key");
    info!("  2. export {}=<your-key>", API_KEY_ENV);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{ToolError, ToolOutput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeTool {
        result: fn() -> Result<ToolOutput, ToolError>,
        calls: AtomicUsize,
    }

    impl FakeTool {
        fn new(result: fn() -> Result<ToolOutput, ToolError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn spawn_server(&self) -> Result<(), ToolError> {
            Ok(())
        }

        async fn generate_api_key(&self, _name: &str) -> Result<ToolOutput, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn stdout(text: &str) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput {
            success: true,
            exit_code: Some(0),
            stdout: text.to_string(),
            stderr: String::new(),
        })
    }

    #[test]
    fn parses_marker_line() {
        assert_eq!(
            parse_generated_key("Generated API Key: abc123XYZ\n"),
            Some("abc123XYZ".to_string())
        );
    }

    #[test]
    fn parses_bare_key_line() {
        let out = "API key created\n\n  dtn_9f8e7d6c5b4a39281706f5e4  \n";
        assert_eq!(
            parse_generated_key(out),
            Some("dtn_9f8e7d6c5b4a39281706f5e4".to_string())
        );
    }

    #[test]
    fn skips_boilerplate_and_short_lines() {
        assert_eq!(parse_generated_key("API key generation is disabled here"), None);
        assert_eq!(parse_generated_key("Generated something long enough to count"), None);
        assert_eq!(parse_generated_key("short\nlines\nonly"), None);
        assert_eq!(parse_generated_key(""), None);
    }

    #[test]
    fn empty_marker_value_falls_through() {
        let out = "Key:\nabcdefghijklmnopqrstuvwxyz012345\n";
        assert_eq!(
            parse_generated_key(out),
            Some("abcdefghijklmnopqrstuvwxyz012345".to_string())
        );
    }

    #[test]
    fn first_candidate_wins() {
        let out = "0123456789abcdefghijklmnop\nKey: later\n";
        assert_eq!(
            parse_generated_key(out),
            Some("0123456789abcdefghijklmnop".to_string())
        );
    }

    #[test]
    fn placeholder_is_treated_as_unset() {
        assert_eq!(external_key(Some(PLACEHOLDER_KEY)), None);
        assert_eq!(external_key(Some("   ")), None);
        assert_eq!(external_key(None), None);
        assert_eq!(external_key(Some(" real-key ")), Some("real-key".to_string()));
    }

    #[test]
    fn masks_to_ten_chars() {
        assert_eq!(mask_key("abcdefghijklmnop"), "abcdefghij...");
        assert_eq!(mask_key("abc"), "abc...");
    }

    #[tokio::test]
    async fn external_key_skips_generation() {
        let tool = FakeTool::new(|| stdout("Key: generated"));
        let cred = resolve(Some("from-env"), &tool, "n").await.unwrap();
        assert_eq!(cred.key(), "from-env");
        assert_eq!(cred.source(), CredentialSource::External);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn placeholder_and_unset_behave_the_same() {
        let tool = FakeTool::new(|| stdout("Generated API Key: abc123XYZ\n"));
        let from_placeholder = resolve(Some(PLACEHOLDER_KEY), &tool, "n").await.unwrap();
        let from_unset = resolve(None, &tool, "n").await.unwrap();
        assert_eq!(from_placeholder, from_unset);
        assert_eq!(from_unset.key(), "abc123XYZ");
        assert_eq!(from_unset.source(), CredentialSource::Generated);
        assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_yield_no_credential() {
        let nonzero = FakeTool::new(|| {
            Ok(ToolOutput {
                success: false,
                exit_code: Some(1),
                stdout: "Key: ignored".to_string(),
                stderr: "unauthorized".to_string(),
            })
        });
        assert!(resolve(None, &nonzero, "n").await.is_none());

        let timeout = FakeTool::new(|| {
            Err(ToolError::Timeout {
                command: "daytona api-key generate".to_string(),
                timeout: Duration::from_secs(30),
            })
        });
        assert!(resolve(None, &timeout, "n").await.is_none());

        let missing = FakeTool::new(|| Err(ToolError::NotFound("daytona".to_string())));
        assert!(resolve(None, &missing, "n").await.is_none());

        let garbage = FakeTool::new(|| stdout("ok\n"));
        assert!(resolve(None, &garbage, "n").await.is_none());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let cred = Credential {
            key: "supersecretkey-123456".to_string(),
            source: CredentialSource::External,
        };
        let dbg = format!("{:?}", cred);
        assert!(!dbg.contains("supersecretkey-123456"));
        assert!(dbg.contains("supersecre..."));
    }
}
