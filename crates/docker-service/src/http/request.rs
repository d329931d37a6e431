//! Request descriptor

use super::body_builder::{BodyBuilder, BodyEncoding, RequestBody};
use super::codec::{JsonEncoderConfig, PropertyListEncoderConfig};
use super::method::HttpMethod;
use super::parameter_encoding::{ParameterEncoding, Parameters, UrlEncoding};
use super::url_builder::UrlBuilder;
use super::wire::WireRequest;
use crate::demo::DemoConfig;
use crate::error::{DockerError, DockerResult};
use crate::service::Service;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Which transport operation carries the request
#[derive(Debug, Clone, Default)]
pub enum RequestKind {
    /// Plain request, body held in memory
    #[default]
    Data,
    /// Body streamed from a local file
    UploadFile(PathBuf),
    /// `multipart/form-data` body built from [`Request::multipart_parts`]
    UploadMultipart,
    /// Response body written to disk
    Download(DownloadDestination),
}

/// One part of a multipart body
#[derive(Debug, Clone)]
pub struct BodyPart {
    pub data: Bytes,
    pub name: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

impl BodyPart {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
            file_name: None,
            mime_type: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadLocation {
    /// Write to exactly this file
    File(PathBuf),
    /// Write into this directory, named after the last segment of the request URL
    Directory(PathBuf),
}

/// Where a download is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDestination {
    pub location: DownloadLocation,
    pub create_intermediate_directories: bool,
    pub remove_previous_file: bool,
}

impl DownloadDestination {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DownloadLocation::File(path.into()),
            create_intermediate_directories: true,
            remove_previous_file: true,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            location: DownloadLocation::Directory(path.into()),
            create_intermediate_directories: true,
            remove_previous_file: true,
        }
    }

    pub fn keep_previous_file(mut self) -> Self {
        self.remove_previous_file = false;
        self
    }

    /// Final path of the downloaded file for a request to `url`
    pub fn resolve(&self, url: &Url) -> PathBuf {
        match &self.location {
            DownloadLocation::File(path) => path.clone(),
            DownloadLocation::Directory(dir) => {
                let file_name = url
                    .path_segments()
                    .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                    .map(|s| {
                        urlencoding::decode(s)
                            .map(|d| d.into_owned())
                            .unwrap_or_else(|_| s.to_string())
                    })
                    .filter(|name| is_plain_file_name(name))
                    .unwrap_or_else(|| "download".to_string());
                dir.join(file_name)
            }
        }
    }
}

/// A single normal path component, so joining it never leaves the directory
fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Everything needed to perform one HTTP call against a [`Service`]
#[derive(Debug, Clone)]
pub struct Request {
    pub service: Service,
    pub method: HttpMethod,
    pub kind: RequestKind,
    /// Header names are matched case-insensitively when the wire request is built
    pub headers: IndexMap<String, String>,
    pub url_parameter_encoding: Arc<dyn ParameterEncoding>,
    pub body_encoding: BodyEncoding,
    pub path_parameters: Parameters,
    pub url_parameters: Parameters,
    pub body: Option<RequestBody>,
    pub multipart_parts: Option<Vec<BodyPart>>,
    pub demo: DemoConfig,
    pub error_status_range: RangeInclusive<u16>,
    /// Route statuses inside `error_status_range` through error decoding
    pub use_different_response_for_errors: bool,
}

impl Request {
    /// Request with a raw body and no body encoding
    pub fn new(service: Service) -> Self {
        Self {
            service,
            method: HttpMethod::Get,
            kind: RequestKind::Data,
            headers: IndexMap::new(),
            url_parameter_encoding: Arc::new(UrlEncoding::query_string()),
            body_encoding: BodyEncoding::None,
            path_parameters: Parameters::new(),
            url_parameters: Parameters::new(),
            body: None,
            multipart_parts: None,
            demo: DemoConfig::default(),
            error_status_range: 400..=499,
            use_different_response_for_errors: false,
        }
    }

    /// Request with a JSON body encoding that accepts JSON responses
    pub fn json(service: Service) -> Self {
        Self::new(service)
            .with_body_encoding(BodyEncoding::Json(JsonEncoderConfig::default()))
            .with_header("Accept", "application/json")
    }

    /// Request with a property list body encoding
    pub fn property_list(service: Service) -> Self {
        Self::new(service)
            .with_body_encoding(BodyEncoding::PropertyList(PropertyListEncoderConfig::default()))
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_url_parameter_encoding(mut self, encoding: impl ParameterEncoding + 'static) -> Self {
        self.url_parameter_encoding = Arc::new(encoding);
        self
    }

    pub fn with_body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.body_encoding = encoding;
        self
    }

    pub fn with_path_parameter(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.path_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_url_parameter(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.url_parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a serializable body, encoded with [`Request::body_encoding`] at dispatch
    pub fn with_encodable_body<T>(self, value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        self.with_body(RequestBody::encodable(value))
    }

    pub fn with_multipart_parts(mut self, parts: Vec<BodyPart>) -> Self {
        self.multipart_parts = Some(parts);
        self
    }

    pub fn with_demo(mut self, demo: DemoConfig) -> Self {
        self.demo = demo;
        self
    }

    pub fn with_error_status_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.error_status_range = range;
        self
    }

    pub fn use_different_response_for_errors(mut self, enabled: bool) -> Self {
        self.use_different_response_for_errors = enabled;
        self
    }

    /// Fully resolved request URL, before URL parameters are applied
    pub fn url(&self) -> DockerResult<Url> {
        UrlBuilder::build(
            &self.service.base_url,
            &self.service.path,
            &self.path_parameters,
            &self.service.service_ref(),
        )
    }

    /// Build the wire request. Headers from `default_headers` are overridden by
    /// the request's own headers, then the body and URL parameters are encoded.
    pub fn build_wire_request(&self, default_headers: &HeaderMap) -> DockerResult<WireRequest> {
        let mut wire = WireRequest::new(self.method, self.url()?);

        wire.headers = default_headers.clone();
        for (name, value) in &self.headers {
            let invalid = || DockerError::InvalidHeader {
                name: name.clone(),
                service: self.service.service_ref(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            wire.headers.insert(header_name, header_value);
        }

        if let Some(body) = &self.body {
            wire.body = Some(BodyBuilder::encode(body, &self.body_encoding, &mut wire.headers)?);
        }

        self.url_parameter_encoding
            .encode(&mut wire, &self.url_parameters)
            .map_err(DockerError::ParameterEncoding)?;

        Ok(wire)
    }

    /// Checks a multipart request can be sent: the method must accept a body
    /// and at least one part must be present
    pub fn validate_multipart(&self) -> DockerResult<()> {
        if !matches!(self.kind, RequestKind::UploadMultipart) {
            return Ok(());
        }
        if !self.method.supports_multipart() {
            return Err(DockerError::MultipartNotSupported(self.method));
        }
        match &self.multipart_parts {
            Some(parts) if !parts.is_empty() => Ok(()),
            _ => Err(DockerError::EmptyMultipartBody),
        }
    }

    /// The resolved URL when it can be built, the service path otherwise
    pub fn url_description(&self) -> String {
        self.url()
            .map(|url| url.to_string())
            .unwrap_or_else(|_| self.service.path.clone())
    }

    pub fn short_description(&self) -> String {
        format!("REQUEST {} at {}", self.method, self.url_description())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "REQUEST URL: {}\nMETHOD: {}\nHEADERS: {:?}",
            self.service.composed_url(),
            self.method,
            self.headers
        )?;
        if !self.url_parameters.is_empty() {
            write!(
                f,
                "\nPARAMETERS: {}",
                JsonValue::Object(self.url_parameters.clone().into_iter().collect())
            )?;
        }
        if let Some(body) = &self.body {
            let mut scratch = HeaderMap::new();
            if let Ok(bytes) = BodyBuilder::encode(body, &self.body_encoding, &mut scratch) {
                if let Ok(text) = std::str::from_utf8(&bytes) {
                    write!(f, "\nBODY:\n{}", text)?;
                }
            }
        }
        Ok(())
    }
}
