//! Service-account credential bootstrap
//!
//! Credentials usually arrive through an environment variable that has been
//! pasted through several shells and dashboards, so the JSON payload is
//! accepted in a few loosely-escaped forms before giving up.

use super::ProviderConfig;
use crate::error::{RaglineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Primary variable holding the service-account payload
pub const CREDENTIALS_ENV: &str = "GOOGLE_CREDENTIALS";

/// Fallback variable (also accepts a path to a credentials file)
pub const APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Parsed service-account key
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,

    /// PEM-encoded RSA key used to sign token requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_id: Option<String>,

    /// OAuth2 token endpoint; Google's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,

    /// Remaining fields, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Outcome of credential bootstrap; never fatal to process start
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialStatus {
    /// Credentials parsed and materialized to `path`
    Loaded { project_id: String, path: PathBuf },
    /// No credential variable set
    Missing,
    /// Payload present but unusable
    Invalid(String),
}

/// Parse a service-account payload, tolerating common escaping damage
///
/// Strict JSON is tried first. Otherwise backticks are dropped, single quotes
/// become double quotes and raw newlines inside string literals become `\n`
/// escapes.
pub fn parse_service_account(raw: &str) -> Result<ServiceAccount> {
    if let Ok(account) = serde_json::from_str::<ServiceAccount>(raw.trim()) {
        return Ok(account);
    }

    let normalized = normalize_payload(raw);
    serde_json::from_str(&normalized)
        .map_err(|e| RaglineError::Credentials(format!("Invalid JSON in credentials: {}", e)))
}

fn normalize_payload(raw: &str) -> String {
    let cleaned = raw.replace('`', "").replace('\'', "\"");
    escape_newlines_in_strings(cleaned.trim())
}

/// Replace raw line breaks inside JSON string literals with `\n`
fn escape_newlines_in_strings(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => {}
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }

    out
}

/// Read the credential payload from the environment
///
/// `GOOGLE_APPLICATION_CREDENTIALS` conventionally holds a file path, so a
/// value that does not look like JSON but names an existing file is read.
pub fn read_credentials_env() -> Option<String> {
    let raw = std::env::var(CREDENTIALS_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var(APPLICATION_CREDENTIALS_ENV)
                .ok()
                .filter(|v| !v.trim().is_empty())
        })?;

    let stripped = raw.trim().trim_matches('`');
    if !stripped.starts_with('{') {
        let path = Path::new(stripped);
        if path.is_file() {
            return std::fs::read_to_string(path).ok();
        }
    }
    Some(raw)
}

/// Write normalized credentials to a private file and return its path
pub fn materialize(account: &ServiceAccount, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("service-account.json");
    let json = serde_json::to_string_pretty(account)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    use std::io::Write;
    let mut file = options.open(&path)?;
    file.write_all(json.as_bytes())?;
    Ok(path)
}

/// Load credentials from the environment and wire them into the provider config
///
/// Fills `project_id` when not configured explicitly and hands the account to
/// the provider client, which mints access tokens from it. The process
/// environment is left untouched. Problems are logged and reported, never
/// returned as errors.
pub fn bootstrap_credentials(provider: &mut ProviderConfig) -> CredentialStatus {
    let Some(raw) = read_credentials_env() else {
        tracing::warn!("No Google credentials found in environment variables");
        return CredentialStatus::Missing;
    };

    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(crate::CACHE_DIR_NAME);

    let status = load_credentials(&raw, &dir, provider);
    match status {
        CredentialStatus::Loaded {
            ref project_id,
            ref path,
        } => {
            tracing::info!(
                project_id = %project_id,
                key_file = ?path,
                "Loaded service-account credentials"
            );
        }
        CredentialStatus::Invalid(ref reason) => {
            tracing::error!("Unusable credentials: {}", reason);
        }
        CredentialStatus::Missing => {}
    }
    status
}

fn load_credentials(raw: &str, dir: &Path, provider: &mut ProviderConfig) -> CredentialStatus {
    let account = match parse_service_account(raw) {
        Ok(account) => account,
        Err(e) => return CredentialStatus::Invalid(e.to_string()),
    };

    let Some(project_id) = account.project_id.clone().filter(|p| !p.is_empty()) else {
        return CredentialStatus::Invalid("No project_id found in credentials".to_string());
    };

    let path = match materialize(&account, dir) {
        Ok(path) => path,
        Err(e) => return CredentialStatus::Invalid(format!("Failed to write credentials: {}", e)),
    };

    if provider.project_id.is_none() {
        provider.project_id = Some(project_id.clone());
    }
    provider.service_account = Some(account);

    CredentialStatus::Loaded { project_id, path }
}
