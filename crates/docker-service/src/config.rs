//! Manager and transport configuration, loadable from YAML or JSON files.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// Detect the format from the file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            Some("json") => Ok(FileFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }

    pub fn parse<T: DeserializeOwned>(&self, content: &str) -> ConfigResult<T> {
        Ok(match self {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        })
    }
}

/// Read and deserialize a YAML or JSON document
pub fn load_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> ConfigResult<T> {
    let path = path.as_ref();
    let format = FileFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    format.parse(&content)
}

/// Settings of the default reqwest transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_ms: u64,
    /// Whole-request timeout, `0` disables it
    pub request_timeout_ms: u64,
    pub default_headers: BTreeMap<String, String>,
    pub user_agent: Option<String>,
    pub proxy_url: Option<String>,
    /// Treat non-2xx statuses as transport errors
    pub validate_status: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: 60_000,
            default_headers: BTreeMap::new(),
            user_agent: None,
            proxy_url: None,
            validate_status: true,
        }
    }
}

/// Settings of a [`crate::ServiceManager`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceManagerConfig {
    /// Simulate every call from fixtures
    pub use_demo_mode: bool,
    /// Pause before an automatic retry
    pub time_before_retry_ms: u64,
    pub transport: TransportConfig,
}

impl Default for ServiceManagerConfig {
    fn default() -> Self {
        Self {
            use_demo_mode: false,
            time_before_retry_ms: 3_000,
            transport: TransportConfig::default(),
        }
    }
}

impl ServiceManagerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let config: Self = load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let config: Self = format.parse(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn time_before_retry(&self) -> Duration {
        Duration::from_millis(self.time_before_retry_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.transport.connect_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "transport.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.transport.request_timeout_ms != 0
            && self.transport.request_timeout_ms < self.transport.connect_timeout_ms
        {
            return Err(ConfigError::Validation(
                "transport.request_timeout_ms must not be shorter than connect_timeout_ms".to_string(),
            ));
        }
        if let Some(proxy) = &self.transport.proxy_url {
            url::Url::parse(proxy).map_err(|e| {
                ConfigError::Validation(format!("Invalid proxy URL '{}': {}", proxy, e))
            })?;
        }
        Ok(())
    }
}
