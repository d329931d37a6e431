//! URL composition and `/:name` path placeholder substitution

use super::parameter_encoding::Parameters;
use crate::error::{DockerError, DockerResult, ServiceRef};
use serde_json::Value as JsonValue;
use url::Url;

const PLACEHOLDER_PREFIX: &str = "/:";

/// Builds request URLs from a service's base URL, its path template and the
/// request's path parameters
pub struct UrlBuilder;

impl UrlBuilder {
    /// Concatenate a base URL and a path. No slash normalisation is applied,
    /// the path is appended verbatim.
    pub fn compose(base_url: &str, path: &str) -> String {
        if path.is_empty() {
            return base_url.to_string();
        }
        let mut composed = String::with_capacity(base_url.len() + path.len());
        composed.push_str(base_url);
        composed.push_str(path);
        composed
    }

    /// Replace every `/:name` placeholder with the matching parameter value.
    ///
    /// The placeholder name runs from the character after `:` to the next `/`
    /// or the end of the string. The colon is consumed, the leading slash is kept:
    /// `/items/:id` with `{id: 42}` becomes `/items/42`.
    pub fn resolve_path_parameters(
        template: &str,
        parameters: &Parameters,
        service: &ServiceRef,
    ) -> DockerResult<String> {
        let mut resolved = template.to_string();
        let mut cursor = 0;

        while let Some(offset) = resolved[cursor..].find(PLACEHOLDER_PREFIX) {
            let colon = cursor + offset + 1;
            let name_start = colon + 1;
            let name_end = resolved[name_start..]
                .find('/')
                .map(|i| name_start + i)
                .unwrap_or(resolved.len());
            let name = &resolved[name_start..name_end];

            let value = parameters.get(name).ok_or_else(|| DockerError::PathParameterNotFound {
                name: name.to_string(),
                service: service.clone(),
            })?;
            let replacement = Self::path_value(value);

            resolved.replace_range(colon..name_end, &replacement);
            // Substituted values are never scanned again.
            cursor = colon + replacement.len();
        }

        Ok(resolved)
    }

    /// Compose, substitute and parse the final URL of a request
    pub fn build(
        base_url: &str,
        path: &str,
        parameters: &Parameters,
        service: &ServiceRef,
    ) -> DockerResult<Url> {
        let composed = Self::compose(base_url, path);
        let resolved = Self::resolve_path_parameters(&composed, parameters, service)?;
        Url::parse(&resolved).map_err(|_| DockerError::InvalidUrl {
            service: service.clone(),
        })
    }

    /// String form of a parameter value inside a path segment
    pub fn path_value(value: &JsonValue) -> String {
        match value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            other => other.to_string(),
        }
    }
}
