use crate::http::{HttpMethod, ResponseHead};
use crate::transport::TransportError;
use std::fmt;

/// Boxed error used for causes coming from pluggable codecs and strategies
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Identifies the service an error belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRef {
    pub base_url: String,
    pub path: String,
}

impl ServiceRef {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base_url = if self.base_url.is_empty() { "unknown" } else { &self.base_url };
        let path = if self.path.is_empty() { "unknown" } else { &self.path };
        write!(f, "base URL: {}, path: {}", base_url, path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DockerError {
    #[error("The URL of the service is invalid ({service})")]
    InvalidUrl { service: ServiceRef },

    #[error("Failed to encode the request body: {0}")]
    Encoding(#[source] BoxError),

    #[error("Failed to encode parameters for the request: {0}")]
    ParameterEncoding(#[source] BoxError),

    #[error("Failed to decode the response: {0}")]
    Decoding(#[source] BoxError),

    #[error("{cause}")]
    Underlying {
        #[source]
        cause: TransportError,
        response: Option<ResponseHead>,
        status_code: u16,
    },

    #[error("Path parameter '{name}' not found ({service})")]
    PathParameterNotFound { name: String, service: ServiceRef },

    #[error("Multipart upload is not supported for {0} requests")]
    MultipartNotSupported(HttpMethod),

    #[error("The multipart body is empty")]
    EmptyMultipartBody,

    #[error("The success demo file is not set ({service})")]
    NilSuccessDemoFile { service: ServiceRef },

    #[error("The failure demo file is not set ({service})")]
    NilFailureDemoFile { service: ServiceRef },

    #[error("The demo file {name} does not exist ({service})")]
    DemoFileNotFound { name: String, service: ServiceRef },

    #[error("Invalid header '{name}' ({service})")]
    InvalidHeader { name: String, service: ServiceRef },

    #[error("Generic error{}", .0.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    Generic(Option<BoxError>),
}

impl DockerError {
    pub fn parameter_encoding(cause: impl Into<BoxError>) -> Self {
        Self::ParameterEncoding(cause.into())
    }

    pub fn decoding(cause: impl Into<BoxError>) -> Self {
        Self::Decoding(cause.into())
    }

    pub fn generic(cause: impl Into<BoxError>) -> Self {
        Self::Generic(Some(cause.into()))
    }

    /// The service the error refers to, when it is known
    pub fn service(&self) -> Option<&ServiceRef> {
        match self {
            Self::InvalidUrl { service }
            | Self::PathParameterNotFound { service, .. }
            | Self::NilSuccessDemoFile { service }
            | Self::NilFailureDemoFile { service }
            | Self::DemoFileNotFound { service, .. }
            | Self::InvalidHeader { service, .. } => Some(service),
            _ => None,
        }
    }

    /// HTTP status attached to a transport-level failure, 0 when none was received
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Underlying { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Errors raised while building a request, before anything is sent
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::Encoding(_)
                | Self::ParameterEncoding(_)
                | Self::PathParameterNotFound { .. }
                | Self::MultipartNotSupported(_)
                | Self::EmptyMultipartBody
                | Self::InvalidHeader { .. }
        )
    }

    pub fn is_underlying(&self) -> bool {
        matches!(self, Self::Underlying { .. })
    }
}

pub type DockerResult<T> = Result<T, DockerError>;
