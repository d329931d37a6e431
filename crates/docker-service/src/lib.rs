//! Declarative HTTP service calls.
//!
//! A [`Service`] names an endpoint (base URL + path), a [`Request`] describes one
//! call against it (method, headers, parameters, body and encoding rules), and the
//! [`ServiceManager`] turns the pair into a wire request, dispatches it through a
//! [`Transport`] and maps the outcome into a typed [`Response`].
//!
//! Requests can also run in demo mode, where fixture files replace the network,
//! and can opt into automatic retries for failures where no response arrived.

pub mod config;
pub mod demo;
pub mod error;
pub mod http;
pub mod manager;
pub mod service;
pub mod transport;

/// `tracing` target used by every log line emitted from this crate.
pub(crate) const LOG_TARGET: &str = "docker.service";

pub use config::{ConfigError, FileFormat, ServiceManagerConfig, TransportConfig};
pub use demo::{DemoConfig, DemoPlan, DirectoryFixtures, FixtureSource, InMemoryFixtures};
pub use error::{BoxError, DockerError, DockerResult, ServiceRef};
pub use http::{
    ArrayEncoding, Binary, BodyEncoding, BodyPart, BoolEncoding, DataDecoder, DataStrategy,
    DateStrategy, Destination, DownloadDestination, DownloadLocation, DownloadedFile, FileDecoder,
    HttpMethod, JsonDecoder, JsonDecoderConfig, JsonEncoderConfig, ParameterEncoding, Parameters,
    Payload, PlistFormat, PropertyListDecoder, PropertyListEncoderConfig, Request, RequestBody,
    RequestKind, Response, ResponseDecoder, ResponseHead, ResponseResult, Timestamp, UrlBuilder,
    UrlEncoding, WireRequest,
};
pub use manager::{
    AutomaticRetry, CallHandle, CallId, Completion, CompletionQueue, Delivery, DeliveryContext,
    ErrorClassification, PendingCall, RetryDecision, ServiceCall, ServiceManager,
    ServiceManagerBuilder,
};
pub use service::Service;
pub use transport::{
    CallControl, CallState, Progress, ProgressCallback, ReqwestTransport, Transport,
    TransportContext, TransportError, TransportOutcome,
};
