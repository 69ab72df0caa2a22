use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::error::{RelayError, Result};

/// Main configuration structure for chat-relay
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// LLM provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Retrieval and quota collaborator endpoints
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl Config {
    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8787")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Connect timeout and longest silence between reads, in seconds, for
    /// outbound calls. Not a total deadline: a completion may stream longer.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Frames buffered between the relay task and the response body
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            timeout_secs: default_timeout_secs(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_stream_buffer() -> usize {
    32
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base API URL; `/chat/completions` is appended
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model used when the client does not ask for one
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Cheaper model forced when the quota check is not OK
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            fallback_model: default_fallback_model(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_fallback_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// Endpoints of the retrieval and quota services
#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorConfig {
    /// Base URL of the application hosting the retrieval endpoints
    #[serde(default = "default_app_url")]
    pub app_url: String,
    /// Path of the single-upload reference lookup
    #[serde(default = "default_single_reference_path")]
    pub single_reference_path: String,
    /// Path of the project-wide reference lookup
    #[serde(default = "default_project_reference_path")]
    pub project_reference_path: String,
    /// Path of the realtime web search
    #[serde(default = "default_realtime_search_path")]
    pub realtime_search_path: String,
    /// Usage accounting endpoint (None = unmetered)
    #[serde(default)]
    pub quota_url: Option<String>,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
            single_reference_path: default_single_reference_path(),
            project_reference_path: default_project_reference_path(),
            realtime_search_path: default_realtime_search_path(),
            quota_url: None,
        }
    }
}

impl CollaboratorConfig {
    pub fn single_reference_url(&self) -> Result<Url> {
        self.endpoint(&self.single_reference_path)
    }

    pub fn project_reference_url(&self) -> Result<Url> {
        self.endpoint(&self.project_reference_path)
    }

    pub fn realtime_search_url(&self) -> Result<Url> {
        self.endpoint(&self.realtime_search_path)
    }

    /// Append `path` to `app_url`, keeping any path prefix the base carries
    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.app_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let joined = format!("{base}/{path}");

        Url::parse(&joined)
            .map_err(|e| RelayError::Config(format!("Invalid endpoint '{joined}': {e}")))
    }
}

fn default_app_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_single_reference_path() -> String {
    "/api/retrieve-single-reference-embeddings".to_string()
}

fn default_project_reference_path() -> String {
    "/api/retrieve-reference-embeddings".to_string()
}

fn default_realtime_search_path() -> String {
    "/api/search-web".to_string()
}
