//! Client configuration loader.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use toolgate_core::InvocationError;

pub const RPC_URL_ENV: &str = "TOOLGATE_RPC_URL";
pub const EXECUTION_ENDPOINT_ENV: &str = "TOOLGATE_EXECUTION_ENDPOINT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config file is empty")]
    Empty,

    #[error("Invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("Config missing required field: {0}")]
    MissingField(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for InvocationError {
    fn from(err: ConfigError) -> Self {
        InvocationError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecutionConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Extra attempts when the execution service refuses the connection.
    /// A delivered request is never repeated, since execute may have side effects.
    #[serde(default)]
    pub max_retries: usize,
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Permission registry JSON-RPC endpoint.
    pub rpc_url: String,
    pub execution: ExecutionConfig,
}

/// Load client configuration from a YAML file, then apply environment overrides.
pub fn load_client_config(config_path: &str) -> Result<ClientConfig, ConfigError> {
    let config_file = Path::new(config_path);

    if !config_file.exists() {
        return Err(ConfigError::NotFound(config_path.to_string()));
    }

    let content = std::fs::read_to_string(config_file)?;
    if content.trim().is_empty() {
        return Err(ConfigError::Empty);
    }

    let mut config: ClientConfig = serde_yaml::from_str(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    if config.rpc_url.trim().is_empty() {
        return Err(ConfigError::MissingField("rpc_url"));
    }
    if config.execution.endpoint.trim().is_empty() {
        return Err(ConfigError::MissingField("execution.endpoint"));
    }

    Ok(config)
}

fn apply_env_overrides(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(rpc_url) = lookup(RPC_URL_ENV).filter(|v| !v.trim().is_empty()) {
        config.rpc_url = rpc_url;
    }
    if let Some(endpoint) = lookup(EXECUTION_ENDPOINT_ENV).filter(|v| !v.trim().is_empty()) {
        config.execution.endpoint = endpoint;
    }
}
