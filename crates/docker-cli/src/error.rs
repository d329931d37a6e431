//! Error types for the CLI

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] docker_service::ConfigError),

    #[error("Service error: {0}")]
    Service(#[from] docker_service::DockerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid request file: {0}")]
    InvalidRequest(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Call failed: {0}")]
    CallFailed(String),

    #[error("General error: {0}")]
    General(String),
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self::General(format!("{:#}", err))
    }
}

pub type CliResult<T> = Result<T, CliError>;
