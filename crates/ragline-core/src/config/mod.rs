//! Configuration management

pub mod credentials;

use crate::error::{RaglineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use credentials::{bootstrap_credentials, CredentialStatus, ServiceAccount};

/// Origin that is always allowed to call the HTTP API (local frontend dev server)
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chat and embedding provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Vector store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Ingestion settings
    #[serde(default)]
    pub ingest: IngestConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Provider configuration for the external chat/embedding service
///
/// Talks to any OpenAI-compatible endpoint. When no explicit `url` is set the
/// Vertex AI OpenAI-compatible endpoint for `project_id`/`region` is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Explicit base URL (e.g. a vLLM server); overrides the Vertex endpoint
    #[serde(default = "default_url")]
    pub url: Option<String>,

    /// Cloud project id (may also be discovered from service-account credentials)
    #[serde(default = "default_project_id")]
    pub project_id: Option<String>,

    /// Cloud region
    #[serde(default = "default_region")]
    pub region: String,

    /// Model name for chat completions
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Model name for embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimensions (detected from the first response if not specified)
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: Option<usize>,

    /// Bearer token sent with every request
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,

    /// Sampling temperature for chat completions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Service account used to mint access tokens when no `api_key` is set
    #[serde(skip)]
    pub service_account: Option<ServiceAccount>,
}

impl ProviderConfig {
    /// Whether requests go to Vertex AI rather than an explicit endpoint
    pub fn is_vertex(&self) -> bool {
        self.url.is_none()
    }

    /// Base URL of the OpenAI-compatible API (without trailing slash)
    pub fn base_url(&self) -> Result<String> {
        if let Some(ref url) = self.url {
            return Ok(format!("{}/v1", url.trim_end_matches('/')));
        }

        let project = self.project_id.as_deref().ok_or_else(|| {
            RaglineError::Config(
                "No provider endpoint: set RAGLINE_LLM_URL, VERTEX_PROJECT_ID or GOOGLE_CREDENTIALS"
                    .to_string(),
            )
        })?;

        Ok(format!(
            "https://{region}-aiplatform.googleapis.com/v1/projects/{project}/locations/{region}/endpoints/openapi",
            region = self.region,
            project = project,
        ))
    }

    pub fn chat_url(&self) -> Result<String> {
        Ok(format!("{}/chat/completions", self.base_url()?))
    }

    pub fn embeddings_url(&self) -> Result<String> {
        Ok(format!("{}/embeddings", self.base_url()?))
    }

    /// Model identifier as the endpoint expects it
    ///
    /// Vertex's OpenAI-compatible endpoint wants publisher-qualified names.
    pub fn wire_model<'a>(&self, model: &'a str) -> std::borrow::Cow<'a, str> {
        if self.is_vertex() && !model.contains('/') {
            std::borrow::Cow::Owned(format!("google/{}", model))
        } else {
            std::borrow::Cow::Borrowed(model)
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            project_id: default_project_id(),
            region: default_region(),
            model: default_chat_model(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            api_key: default_api_key(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            service_account: None,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn default_url() -> Option<String> {
    non_empty_env("RAGLINE_LLM_URL")
}

fn default_project_id() -> Option<String> {
    non_empty_env("VERTEX_PROJECT_ID")
}

fn default_region() -> String {
    non_empty_env("VERTEX_REGION").unwrap_or_else(|| "us-central1".to_string())
}

fn default_chat_model() -> String {
    non_empty_env("GOOGLE_MODEL_ID").unwrap_or_else(|| "gemini-2.0-flash".to_string())
}

fn default_embedding_model() -> String {
    non_empty_env("EMBEDDINGS_MODEL_ID").unwrap_or_else(|| "text-embedding-005".to_string())
}

fn default_embedding_dimensions() -> Option<usize> {
    non_empty_env("RAGLINE_EMBEDDING_DIMS").and_then(|s| s.parse().ok())
}

fn default_api_key() -> Option<String> {
    non_empty_env("GOOGLE_ACCESS_TOKEN").or_else(|| non_empty_env("RAGLINE_LLM_API_KEY"))
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout() -> u64 {
    60
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the persisted store; wiped by ingestion
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StoreConfig {
    /// SQLite file inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(crate::STORE_FILE_NAME)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    non_empty_env("RAGLINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./ragline_db"))
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory scanned for source documents
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,

    /// Window size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive windows in bytes
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Wipe the store directory before loading
    #[serde(default = "default_true")]
    pub clear_existing: bool,

    /// Texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl IngestConfig {
    /// Reject window settings that cannot make progress
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RaglineError::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RaglineError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.batch_size == 0 {
            return Err(RaglineError::Config("batch_size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            clear_existing: true,
            batch_size: default_batch_size(),
        }
    }
}

fn default_source_dir() -> PathBuf {
    non_empty_env("RAGLINE_SOURCE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    32
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Origins allowed for cross-origin requests
    #[serde(default = "default_frontend_origins")]
    pub frontend_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            frontend_origins: default_frontend_origins(),
        }
    }
}

fn default_bind() -> String {
    non_empty_env("RAGLINE_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string())
}

fn default_frontend_origins() -> Vec<String> {
    let mut origins = vec![DEFAULT_FRONTEND_ORIGIN.to_string()];
    if let Some(extra) = non_empty_env("FRONTEND_URL") {
        origins.extend(parse_origin_list(&extra));
    }
    origins
}

/// Split a comma separated origin list, dropping blanks and duplicates
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    let mut origins: Vec<String> = Vec::new();
    for origin in raw.split(',') {
        let origin = origin.trim().trim_end_matches('/');
        if !origin.is_empty() && !origins.iter().any(|o| o == origin) {
            origins.push(origin.to_string());
        }
    }
    origins
}

impl Config {
    /// Load config from default path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from a YAML file, falling back to defaults when it is absent
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&content)?
        } else {
            Config::default()
        };
        config.ingest.validate()?;
        Ok(config)
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
            .join("config.yml")
    }
}
