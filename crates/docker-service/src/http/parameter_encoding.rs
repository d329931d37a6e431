//! URL parameter encoding strategies

use super::wire::WireRequest;
use crate::error::BoxError;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

/// Named request parameters. Keys are kept sorted.
pub type Parameters = BTreeMap<String, JsonValue>;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Strategy that writes URL parameters into a wire request
pub trait ParameterEncoding: Send + Sync + fmt::Debug {
    fn encode(&self, request: &mut WireRequest, parameters: &Parameters) -> Result<(), BoxError>;
}

/// Where URL-encoded parameters are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    /// Query string for GET, HEAD and DELETE, form body otherwise
    #[default]
    MethodDependent,
    QueryString,
    HttpBody,
}

/// How array values are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayEncoding {
    /// `key[]=a&key[]=b`
    #[default]
    Brackets,
    /// `key=a&key=b`
    NoBrackets,
}

/// How boolean values are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolEncoding {
    /// `1` / `0`
    #[default]
    Numeric,
    /// `true` / `false`
    Literal,
}

/// Percent-encoded `key=value` pairs in the query string or a form body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UrlEncoding {
    pub destination: Destination,
    pub array_encoding: ArrayEncoding,
    pub bool_encoding: BoolEncoding,
}

impl UrlEncoding {
    pub fn method_dependent() -> Self {
        Self::default()
    }

    pub fn query_string() -> Self {
        Self {
            destination: Destination::QueryString,
            ..Self::default()
        }
    }

    pub fn http_body() -> Self {
        Self {
            destination: Destination::HttpBody,
            ..Self::default()
        }
    }

    pub fn with_array_encoding(mut self, encoding: ArrayEncoding) -> Self {
        self.array_encoding = encoding;
        self
    }

    pub fn with_bool_encoding(mut self, encoding: BoolEncoding) -> Self {
        self.bool_encoding = encoding;
        self
    }

    /// Encode parameters as `a=1&b%5B%5D=x`, keys in sorted order
    pub fn query(&self, parameters: &Parameters) -> String {
        let mut components = Vec::new();
        for (key, value) in parameters {
            self.components(key, value, &mut components);
        }
        components
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn components(&self, key: &str, value: &JsonValue, out: &mut Vec<(String, String)>) {
        match value {
            JsonValue::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (nested_key, nested_value) in entries {
                    self.components(&format!("{}[{}]", key, nested_key), nested_value, out);
                }
            }
            JsonValue::Array(items) => {
                let array_key = match self.array_encoding {
                    ArrayEncoding::Brackets => format!("{}[]", key),
                    ArrayEncoding::NoBrackets => key.to_string(),
                };
                for item in items {
                    self.components(&array_key, item, out);
                }
            }
            JsonValue::Bool(flag) => {
                let text = match (self.bool_encoding, flag) {
                    (BoolEncoding::Numeric, true) => "1",
                    (BoolEncoding::Numeric, false) => "0",
                    (BoolEncoding::Literal, true) => "true",
                    (BoolEncoding::Literal, false) => "false",
                };
                out.push((escape(key), text.to_string()));
            }
            JsonValue::Number(number) => out.push((escape(key), escape(&number.to_string()))),
            JsonValue::String(text) => out.push((escape(key), escape(text))),
            JsonValue::Null => out.push((escape(key), String::new())),
        }
    }

    fn uses_query(&self, request: &WireRequest) -> bool {
        match self.destination {
            Destination::QueryString => true,
            Destination::HttpBody => false,
            Destination::MethodDependent => request.method.encodes_parameters_in_url(),
        }
    }
}

fn escape(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

impl ParameterEncoding for UrlEncoding {
    fn encode(&self, request: &mut WireRequest, parameters: &Parameters) -> Result<(), BoxError> {
        if parameters.is_empty() {
            return Ok(());
        }
        let query = self.query(parameters);

        if self.uses_query(request) {
            let combined = match request.url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
                _ => query,
            };
            request.url.set_query(Some(&combined));
        } else {
            if !request.headers.contains_key(CONTENT_TYPE) {
                request
                    .headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
            }
            request.body = Some(Bytes::from(query));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use serde_json::json;
    use url::Url;

    fn params(value: JsonValue) -> Parameters {
        serde_json::from_value(value).unwrap()
    }

    fn request(method: HttpMethod, url: &str) -> WireRequest {
        WireRequest::new(method, Url::parse(url).unwrap())
    }

    #[test]
    fn test_query_is_sorted_and_bracket_encoded() {
        let encoding = UrlEncoding::query_string();
        let query = encoding.query(&params(json!({
            "tags": ["a", "b c"],
            "filter": {"state": "open", "author": "me"},
            "page": 2,
        })));
        assert_eq!(
            query,
            "filter%5Bauthor%5D=me&filter%5Bstate%5D=open&page=2&tags%5B%5D=a&tags%5B%5D=b%20c"
        );
    }

    #[test]
    fn test_array_and_bool_options() {
        let encoding = UrlEncoding::query_string()
            .with_array_encoding(ArrayEncoding::NoBrackets)
            .with_bool_encoding(BoolEncoding::Literal);
        let query = encoding.query(&params(json!({"ids": [1, 2], "flag": true, "none": null})));
        assert_eq!(query, "flag=true&ids=1&ids=2&none=");

        let numeric = UrlEncoding::query_string().query(&params(json!({"flag": false})));
        assert_eq!(numeric, "flag=0");
    }

    #[test]
    fn test_query_appends_to_existing_query() {
        let mut wire = request(HttpMethod::Get, "https://api.test/items?limit=5");
        UrlEncoding::query_string()
            .encode(&mut wire, &params(json!({"q": "rust"})))
            .unwrap();
        assert_eq!(wire.url.as_str(), "https://api.test/items?limit=5&q=rust");
        assert!(wire.body.is_none());
    }

    #[test]
    fn test_form_body_sets_content_type_when_absent() {
        let mut wire = request(HttpMethod::Post, "https://api.test/login");
        UrlEncoding::method_dependent()
            .encode(&mut wire, &params(json!({"user": "a@b.c", "remember": true})))
            .unwrap();
        assert_eq!(wire.body.as_deref(), Some(&b"remember=1&user=a%40b.c"[..]));
        assert_eq!(wire.header("content-type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(wire.url.query(), None);

        let mut custom = request(HttpMethod::Post, "https://api.test/login");
        custom
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        UrlEncoding::http_body()
            .encode(&mut custom, &params(json!({"a": 1})))
            .unwrap();
        assert_eq!(custom.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_method_dependent_uses_query_for_get() {
        let mut wire = request(HttpMethod::Delete, "https://api.test/items");
        UrlEncoding::method_dependent()
            .encode(&mut wire, &params(json!({"force": true})))
            .unwrap();
        assert_eq!(wire.url.query(), Some("force=1"));
    }

    #[test]
    fn test_empty_parameters_are_a_no_op() {
        let mut wire = request(HttpMethod::Post, "https://api.test/items");
        UrlEncoding::http_body().encode(&mut wire, &Parameters::new()).unwrap();
        assert!(wire.body.is_none());
        assert!(wire.headers.is_empty());
    }
}
