//! Request body encoding

use super::codec::{JsonEncoderConfig, PropertyListEncoderConfig};
use super::request::BodyPart;
use crate::error::{BoxError, DockerError, DockerResult};
use crate::transport::TransportError;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
const PLIST_CONTENT_TYPE: &str = "application/x-plist";

/// How a request body is turned into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    /// The body must already be raw bytes
    #[default]
    None,
    Json(JsonEncoderConfig),
    PropertyList(PropertyListEncoderConfig),
}

impl BodyEncoding {
    pub fn json() -> Self {
        Self::Json(JsonEncoderConfig::default())
    }

    pub fn property_list() -> Self {
        Self::PropertyList(PropertyListEncoderConfig::default())
    }

    fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Json(_) => Some(JSON_CONTENT_TYPE),
            Self::PropertyList(_) => Some(PLIST_CONTENT_TYPE),
        }
    }
}

type EncodeFn = dyn Fn(&BodyEncoding) -> Result<Vec<u8>, BoxError> + Send + Sync;

/// Body attached to a request
#[derive(Clone)]
pub enum RequestBody {
    /// Bytes sent as they are
    Data(Bytes),
    /// A serializable value, encoded at dispatch time with the request's [`BodyEncoding`]
    Encodable(Arc<EncodeFn>),
}

impl RequestBody {
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self::Data(data.into())
    }

    pub fn encodable<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::Encodable(Arc::new(
            move |encoding: &BodyEncoding| -> Result<Vec<u8>, BoxError> {
                match encoding {
                    BodyEncoding::None => {
                        Err("a typed body needs a JSON or property list body encoding".into())
                    }
                    BodyEncoding::Json(config) => Ok(config.encode(&value)?),
                    BodyEncoding::PropertyList(config) => Ok(config.encode(&value)?),
                }
            },
        ))
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            Self::Encodable(_) => f.write_str("Encodable"),
        }
    }
}

pub struct BodyBuilder;

impl BodyBuilder {
    /// Encode `body` and set the matching `Content-Type`, unless the caller
    /// already provided one
    pub fn encode(
        body: &RequestBody,
        encoding: &BodyEncoding,
        headers: &mut HeaderMap,
    ) -> DockerResult<Bytes> {
        let bytes = match body {
            RequestBody::Data(data) => data.clone(),
            RequestBody::Encodable(encode) => {
                Bytes::from(encode(encoding).map_err(DockerError::Encoding)?)
            }
        };

        if let Some(content_type) = encoding.content_type() {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        Ok(bytes)
    }

    /// Assemble a multipart form from the request's body parts
    pub fn multipart_form(parts: &[BodyPart]) -> Result<Form, TransportError> {
        let mut form = Form::new();
        for body_part in parts {
            let mut part = Part::bytes(body_part.data.to_vec());
            if let Some(file_name) = &body_part.file_name {
                part = part.file_name(file_name.clone());
            }
            if let Some(mime_type) = &body_part.mime_type {
                part = part.mime_str(mime_type).map_err(|e| {
                    TransportError::Multipart(format!(
                        "invalid MIME type '{}' for part '{}': {}",
                        mime_type, body_part.name, e
                    ))
                })?;
            }
            form = form.part(body_part.name.clone(), part);
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    #[test]
    fn test_json_body_sets_content_type() {
        let mut headers = HeaderMap::new();
        let body = RequestBody::encodable(json!({"name": "widget"}));
        let bytes = BodyBuilder::encode(&body, &BodyEncoding::json(), &mut headers).unwrap();

        let value: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"name": "widget"}));
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), JSON_CONTENT_TYPE);
    }

    #[test]
    fn test_existing_content_type_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.api+json"));
        let body = RequestBody::encodable(json!([1, 2, 3]));
        BodyBuilder::encode(&body, &BodyEncoding::json(), &mut headers).unwrap();
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/vnd.api+json");
    }

    #[test]
    fn test_property_list_body() {
        let mut headers = HeaderMap::new();
        let body = RequestBody::encodable(json!({"enabled": true}));
        let bytes =
            BodyBuilder::encode(&body, &BodyEncoding::property_list(), &mut headers).unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains("<key>enabled</key>"));
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), PLIST_CONTENT_TYPE);
    }

    #[test]
    fn test_raw_data_passes_through() {
        let mut headers = HeaderMap::new();
        let body = RequestBody::data(&b"\x00\x01raw"[..]);
        let bytes = BodyBuilder::encode(&body, &BodyEncoding::None, &mut headers).unwrap();
        assert_eq!(&bytes[..], b"\x00\x01raw");
        assert!(headers.is_empty());

        let bytes = BodyBuilder::encode(&body, &BodyEncoding::json(), &mut headers).unwrap();
        assert_eq!(&bytes[..], b"\x00\x01raw");
    }

    #[test]
    fn test_typed_body_without_encoding_fails() {
        let mut headers = HeaderMap::new();
        let body = RequestBody::encodable(json!({"a": 1}));
        let err = BodyBuilder::encode(&body, &BodyEncoding::None, &mut headers).unwrap_err();
        assert!(matches!(err, DockerError::Encoding(_)));
    }

    #[test]
    fn test_multipart_form_rejects_bad_mime_type() {
        let parts = vec![BodyPart::new("file", Bytes::from_static(b"abc")).with_mime_type("not a mime")];
        let err = BodyBuilder::multipart_form(&parts).unwrap_err();
        assert!(matches!(err, TransportError::Multipart(_)));

        let parts = vec![BodyPart::new("file", Bytes::from_static(b"abc"))
            .with_file_name("a.txt")
            .with_mime_type("text/plain")];
        assert!(BodyBuilder::multipart_form(&parts).is_ok());
    }
}
