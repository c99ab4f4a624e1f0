//! Bridge configuration
//!
//! Values come from an optional YAML file, then command-line flags layered on
//! top. A `.env` file is loaded first so that `bearer_env` can name variables
//! defined there.

use crate::error::{BridgeError, Result};
use crate::invocation::{parse_backend_url, HeaderSet, WireProtocol};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8090";
pub const DEFAULT_SERVER_NAME: &str = "gRPC MCP Server";
pub const DEFAULT_SERVER_VERSION: &str = "1.0.0";
pub const DEFAULT_LOG_LEVEL: &str = "info";

fn default_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

fn default_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_version() -> String {
    DEFAULT_SERVER_VERSION.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Complete bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Serialized FileDescriptorSet to load
    #[serde(default)]
    pub descriptors: Option<String>,
    /// Discover descriptors through server reflection
    #[serde(default)]
    pub reflect: bool,
    /// Fully-qualified services to expose; empty exposes all
    #[serde(default)]
    pub services: Vec<String>,
    /// Static headers in `Name: Value` form
    #[serde(default)]
    pub headers: Vec<String>,
    /// Bearer token sent as `Authorization: Bearer <token>`
    #[serde(default)]
    pub bearer: Option<String>,
    /// Environment variable holding the bearer token; wins over `bearer`
    #[serde(default)]
    pub bearer_env: Option<String>,
    /// Backend base URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Wire protocol used for tool calls
    #[serde(default)]
    pub protocol: WireProtocol,
    /// MCP server name
    #[serde(default = "default_name")]
    pub name: String,
    /// MCP server version
    #[serde(default = "default_version")]
    pub version: String,
    /// Serve HTTP/SSE on this address instead of stdio
    #[serde(default)]
    pub hostport: Option<String>,
    /// Per-call deadline in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Log filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            descriptors: None,
            reflect: false,
            services: Vec::new(),
            headers: Vec::new(),
            bearer: None,
            bearer_env: None,
            url: default_url(),
            protocol: WireProtocol::default(),
            name: default_name(),
            version: default_version(),
            hostport: None,
            timeout_secs: None,
            log_level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// Load a YAML configuration file (`~` is expanded)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = path.as_ref().to_string_lossy();
        let expanded = shellexpand::tilde(&raw).into_owned();
        let content = std::fs::read_to_string(&expanded).map_err(|e| {
            BridgeError::config(format!("Failed to read config file '{}': {}", expanded, e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BridgeError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Load `.env` from the working directory if present.
    /// Runs before logging is installed; call `EnvFile::log` afterwards.
    pub fn load_env_file() -> EnvFile {
        EnvFile::from_outcome(dotenvy::dotenv())
    }

    /// Check the configuration before anything is started
    pub fn validate(&self) -> Result<()> {
        if self.descriptors.is_none() && !self.reflect {
            return Err(BridgeError::config(
                "No descriptor source: set 'descriptors' and/or enable 'reflect'",
            ));
        }
        if let Some(path) = &self.descriptors {
            if path.trim().is_empty() {
                return Err(BridgeError::config("Descriptor bundle path cannot be empty"));
            }
        }

        self.backend_url()?;

        HeaderSet::from_flags(&self.headers)?;

        if self.name.trim().is_empty() {
            return Err(BridgeError::config("Server name cannot be empty"));
        }
        if self.timeout_secs == Some(0) {
            return Err(BridgeError::config("Timeout must be at least one second"));
        }
        if let Some(hostport) = &self.hostport {
            if !hostport.contains(':') {
                return Err(BridgeError::config(format!(
                    "Invalid hostport '{}': expected host:port",
                    hostport
                )));
            }
        }

        Ok(())
    }

    /// Parsed backend URL
    pub fn backend_url(&self) -> Result<Url> {
        parse_backend_url(&self.url)
    }

    /// Per-call deadline
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Base headers: header flags plus the bearer token, if any
    pub fn header_set(&self) -> Result<HeaderSet> {
        let mut headers = HeaderSet::from_flags(&self.headers)?;
        if let Some(token) = self.bearer_token() {
            headers.set_bearer(&token)?;
        }
        Ok(headers)
    }

    fn bearer_token(&self) -> Option<String> {
        if let Some(var) = &self.bearer_env {
            match std::env::var(var) {
                Ok(token) if !token.is_empty() => return Some(token),
                _ => tracing::warn!("Bearer token variable {} is not set", var),
            }
            return None;
        }
        self.bearer.clone().filter(|t| !t.is_empty())
    }
}

/// Outcome of loading the `.env` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(PathBuf),
    NotFound,
    Failed(String),
}

impl EnvFile {
    fn from_outcome(outcome: std::result::Result<PathBuf, dotenvy::Error>) -> Self {
        match outcome {
            Ok(path) => EnvFile::Loaded(path),
            Err(e) if e.not_found() => EnvFile::NotFound,
            Err(e) => EnvFile::Failed(e.to_string()),
        }
    }

    pub fn log(&self) {
        match self {
            EnvFile::Loaded(path) => tracing::debug!("Loaded environment variables from {}", path.display()),
            EnvFile::NotFound => tracing::debug!("No .env file found, skipping"),
            EnvFile::Failed(e) => tracing::warn!("Failed to load .env: {}", e),
        }
    }
}

/// Split a comma-separated service list, dropping blanks
pub fn parse_service_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
