pub mod call;
pub mod validate;

pub use call::{CallArgs, CallCommand};
pub use validate::ValidateCommand;

use crate::cli::OutputFormat;
use crate::error::CliResult;
use docker_service::ServiceManagerConfig;
use serde_json::Value as JsonValue;
use std::path::Path;

/// Manager configuration from `path`, or defaults
pub(crate) fn load_config(path: Option<&str>) -> CliResult<ServiceManagerConfig> {
    match path {
        Some(path) => Ok(ServiceManagerConfig::load_from_file(path)?),
        None => Ok(ServiceManagerConfig::default()),
    }
}

/// Directory relative paths of a request file resolve against
pub(crate) fn base_dir(file: &Path) -> &Path {
    file.parent().unwrap_or_else(|| Path::new("."))
}

/// Body as formatted JSON when it parses, as lossy UTF-8 otherwise
pub(crate) fn render_body(data: &[u8], format: OutputFormat) -> CliResult<String> {
    if format != OutputFormat::Raw {
        if let Ok(value) = serde_json::from_slice::<JsonValue>(data) {
            return Ok(format.format_json(&value)?);
        }
    }
    Ok(String::from_utf8_lossy(data).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_body() {
        let json = br#"{"a":1}"#;
        assert_eq!(render_body(json, OutputFormat::Json).unwrap(), r#"{"a":1}"#);
        assert_eq!(render_body(json, OutputFormat::Pretty).unwrap(), "{\n  \"a\": 1\n}");
        assert_eq!(render_body(json, OutputFormat::Raw).unwrap(), r#"{"a":1}"#);
        assert_eq!(render_body(b"plain text", OutputFormat::Pretty).unwrap(), "plain text");
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(base_dir(Path::new("requests/get.yaml")), Path::new("requests"));
        assert_eq!(base_dir(Path::new("get.yaml")), Path::new(""));
    }
}
