//! Request definitions loaded from YAML or JSON files.
//!
//! ```yaml
//! service:
//!   base_url: https://api.example.com
//!   path: /users/:id
//! method: GET
//! path_parameters:
//!   id: 42
//! url_parameters:
//!   expand: [owner, team]
//! retries: 2
//! demo:
//!   success_file: user.json
//! ```

use crate::error::{CliError, CliResult};
use crate::utils::validate_file_exists;
use anyhow::Context;
use docker_service::config::load_file;
use docker_service::{
    BodyPart, DemoConfig, DirectoryFixtures, DownloadDestination, HttpMethod, Parameters, Request,
    RequestBody, RequestKind, Service, UrlEncoding,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestFile {
    pub service: ServiceDefinition,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub encoding: EncodingKind,
    #[serde(default)]
    pub parameter_destination: ParameterDestination,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub path_parameters: Parameters,
    #[serde(default)]
    pub url_parameters: Parameters,
    /// Encoded with `encoding`
    #[serde(default)]
    pub body: Option<JsonValue>,
    /// Sent verbatim, wins over `body`
    #[serde(default)]
    pub raw_body: Option<String>,
    #[serde(default)]
    pub upload_file: Option<PathBuf>,
    #[serde(default)]
    pub multipart: Vec<PartDefinition>,
    #[serde(default)]
    pub download: Option<DownloadDefinition>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub use_different_response_for_errors: bool,
    #[serde(default)]
    pub error_status_range: Option<(u16, u16)>,
    #[serde(default)]
    pub demo: Option<DemoDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    pub base_url: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingKind {
    None,
    #[default]
    Json,
    PropertyList,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDestination {
    /// Query string for GET, HEAD and DELETE, form body otherwise
    MethodDependent,
    #[default]
    QueryString,
    HttpBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartDefinition {
    pub name: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Read at load time, relative to the request file
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadDefinition {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub keep_previous_file: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoDefinition {
    pub enabled: bool,
    pub success_file: Option<String>,
    pub failure_file: Option<String>,
    pub failure_chance: f64,
    pub success_status_code: Option<u16>,
    pub failure_status_code: Option<u16>,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
}

impl RequestFile {
    pub fn load(path: impl AsRef<Path>) -> CliResult<Self> {
        let path = path.as_ref();
        validate_file_exists(path)?;
        Ok(load_file(path)?)
    }

    pub fn kind(&self, base_dir: &Path) -> CliResult<RequestKind> {
        let declared = [
            self.upload_file.is_some(),
            !self.multipart.is_empty(),
            self.download.is_some(),
        ];
        if declared.iter().filter(|set| **set).count() > 1 {
            return Err(CliError::InvalidRequest(
                "upload_file, multipart and download are mutually exclusive".to_string(),
            ));
        }

        if let Some(file) = &self.upload_file {
            return Ok(RequestKind::UploadFile(base_dir.join(file)));
        }
        if !self.multipart.is_empty() {
            return Ok(RequestKind::UploadMultipart);
        }
        if let Some(download) = &self.download {
            let destination = match (&download.file, &download.directory) {
                (Some(file), None) => DownloadDestination::file(base_dir.join(file)),
                (None, Some(directory)) => DownloadDestination::directory(base_dir.join(directory)),
                _ => {
                    return Err(CliError::InvalidRequest(
                        "download needs exactly one of 'file' or 'directory'".to_string(),
                    ))
                }
            };
            let destination = if download.keep_previous_file {
                destination.keep_previous_file()
            } else {
                destination
            };
            return Ok(RequestKind::Download(destination));
        }
        Ok(RequestKind::Data)
    }

    /// Build the request. Relative paths resolve against `base_dir`, demo
    /// fixtures against `fixtures` when given.
    pub fn to_request(&self, base_dir: &Path, fixtures: Option<&Path>) -> CliResult<Request> {
        let service = Service::new(self.service.base_url.clone(), self.service.path.clone());
        let mut request = match self.encoding {
            EncodingKind::None => Request::new(service),
            EncodingKind::Json => Request::json(service),
            EncodingKind::PropertyList => Request::property_list(service),
        }
        .with_method(self.method)
        .with_kind(self.kind(base_dir)?)
        .use_different_response_for_errors(self.use_different_response_for_errors);

        request = match self.parameter_destination {
            ParameterDestination::MethodDependent => {
                request.with_url_parameter_encoding(UrlEncoding::method_dependent())
            }
            ParameterDestination::QueryString => {
                request.with_url_parameter_encoding(UrlEncoding::query_string())
            }
            ParameterDestination::HttpBody => {
                request.with_url_parameter_encoding(UrlEncoding::http_body())
            }
        };

        for (name, value) in &self.headers {
            request = request.with_header(name.clone(), value.clone());
        }
        for (name, value) in &self.path_parameters {
            request = request.with_path_parameter(name.clone(), value.clone());
        }
        for (name, value) in &self.url_parameters {
            request = request.with_url_parameter(name.clone(), value.clone());
        }

        if let Some(raw) = &self.raw_body {
            request = request.with_body(RequestBody::data(raw.clone().into_bytes()));
        } else if let Some(body) = &self.body {
            request = request.with_encodable_body(body.clone());
        }

        if !self.multipart.is_empty() {
            request = request.with_multipart_parts(self.parts(base_dir)?);
        }
        if let Some((low, high)) = self.error_status_range {
            if low > high {
                return Err(CliError::InvalidRequest(format!(
                    "error_status_range {}..={} is empty",
                    low, high
                )));
            }
            request = request.with_error_status_range(low..=high);
        }
        if let Some(demo) = &self.demo {
            let root = fixtures.map(Path::to_path_buf).unwrap_or_else(|| base_dir.to_path_buf());
            request = request.with_demo(demo.to_config(root)?);
        }

        Ok(request)
    }

    fn parts(&self, base_dir: &Path) -> CliResult<Vec<BodyPart>> {
        self.multipart
            .iter()
            .map(|part| {
                let data = match (&part.text, &part.path) {
                    (Some(text), None) => text.clone().into_bytes(),
                    (None, Some(path)) => {
                        let path = base_dir.join(path);
                        std::fs::read(&path).with_context(|| {
                            format!("reading multipart part '{}' from {}", part.name, path.display())
                        })?
                    }
                    _ => {
                        return Err(CliError::InvalidRequest(format!(
                            "multipart part '{}' needs exactly one of 'text' or 'path'",
                            part.name
                        )))
                    }
                };
                let mut body_part = BodyPart::new(part.name.clone(), data);
                if let Some(file_name) = &part.file_name {
                    body_part = body_part.with_file_name(file_name.clone());
                }
                if let Some(mime_type) = &part.mime_type {
                    body_part = body_part.with_mime_type(mime_type.clone());
                }
                Ok(body_part)
            })
            .collect()
    }
}

impl DemoDefinition {
    fn to_config(&self, fixtures: PathBuf) -> CliResult<DemoConfig> {
        if !(0.0..=1.0).contains(&self.failure_chance) {
            return Err(CliError::InvalidRequest(format!(
                "demo.failure_chance must be within 0.0..=1.0, got {}",
                self.failure_chance
            )));
        }
        let min_wait = Duration::from_millis(self.min_wait_ms);
        let max_wait = Duration::from_millis(self.max_wait_ms.max(self.min_wait_ms));

        let mut config = DemoConfig::default()
            .with_fixtures(Arc::new(DirectoryFixtures::new(fixtures)))
            .with_failure_chance(self.failure_chance)
            .with_waiting_time(min_wait..=max_wait);
        if self.enabled {
            config = config.enabled();
        }
        if let Some(file) = &self.success_file {
            config = config.with_success_file(file.clone());
        }
        if let Some(file) = &self.failure_file {
            config = config.with_failure_file(file.clone());
        }
        let success = self.success_status_code.unwrap_or(config.success_status_code);
        let failure = self.failure_status_code.unwrap_or(config.failure_status_code);
        Ok(config.with_status_codes(success, failure))
    }
}
