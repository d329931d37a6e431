//! Response descriptor and decoders

use super::codec::{decode_property_list, JsonDecoderConfig};
use super::request::Request;
use super::wire::ResponseHead;
use crate::error::{BoxError, DockerError};
use crate::LOG_TARGET;
use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};
use url::Url;

/// Decoded outcome of a call
#[derive(Debug)]
pub enum ResponseResult<V, E> {
    Success(V),
    /// Optional decoded error body alongside the error that caused the failure
    Failure(Option<E>, DockerError),
}

impl<V, E> ResponseResult<V, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(..) => None,
        }
    }

    pub fn error(&self) -> Option<&DockerError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(_, error) => Some(error),
        }
    }

    pub fn error_value(&self) -> Option<&E> {
        match self {
            Self::Failure(Some(value), _) => Some(value),
            _ => None,
        }
    }
}

/// Raw material handed to a decoder
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    pub data: &'a Bytes,
    pub local_path: Option<&'a Path>,
    pub head: Option<&'a ResponseHead>,
}

/// Turns response bytes into typed success and error values
pub trait ResponseDecoder: Send + Sync + 'static {
    type Value: Send + 'static;
    type ErrorValue: Send + 'static;

    fn decode_value(&self, payload: &Payload<'_>) -> Result<Self::Value, BoxError>;

    fn decode_error_value(&self, payload: &Payload<'_>) -> Result<Self::ErrorValue, BoxError>;
}

/// JSON decoder for success type `V` and error body type `E`
pub struct JsonDecoder<V, E = JsonValue> {
    pub config: JsonDecoderConfig,
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<V, E> JsonDecoder<V, E> {
    pub fn new() -> Self {
        Self::with_config(JsonDecoderConfig::default())
    }

    pub fn with_config(config: JsonDecoderConfig) -> Self {
        Self {
            config,
            _marker: PhantomData,
        }
    }
}

impl<V, E> Default for JsonDecoder<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> Clone for JsonDecoder<V, E> {
    fn clone(&self) -> Self {
        Self::with_config(self.config)
    }
}

impl<V, E> fmt::Debug for JsonDecoder<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonDecoder").field("config", &self.config).finish()
    }
}

impl<V, E> ResponseDecoder for JsonDecoder<V, E>
where
    V: DeserializeOwned + Send + 'static,
    E: DeserializeOwned + Send + 'static,
{
    type Value = V;
    type ErrorValue = E;

    fn decode_value(&self, payload: &Payload<'_>) -> Result<V, BoxError> {
        Ok(self.config.decode(payload.data)?)
    }

    fn decode_error_value(&self, payload: &Payload<'_>) -> Result<E, BoxError> {
        Ok(self.config.decode(payload.data)?)
    }
}

/// Property list decoder, XML or binary
pub struct PropertyListDecoder<V, E = plist::Value> {
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<V, E> PropertyListDecoder<V, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V, E> Default for PropertyListDecoder<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for PropertyListDecoder<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PropertyListDecoder")
    }
}

impl<V, E> ResponseDecoder for PropertyListDecoder<V, E>
where
    V: DeserializeOwned + Send + 'static,
    E: DeserializeOwned + Send + 'static,
{
    type Value = V;
    type ErrorValue = E;

    fn decode_value(&self, payload: &Payload<'_>) -> Result<V, BoxError> {
        Ok(decode_property_list(payload.data)?)
    }

    fn decode_error_value(&self, payload: &Payload<'_>) -> Result<E, BoxError> {
        Ok(decode_property_list(payload.data)?)
    }
}

/// Passes the body bytes through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDecoder;

impl ResponseDecoder for DataDecoder {
    type Value = Bytes;
    type ErrorValue = Bytes;

    fn decode_value(&self, payload: &Payload<'_>) -> Result<Bytes, BoxError> {
        Ok(payload.data.clone())
    }

    fn decode_error_value(&self, payload: &Payload<'_>) -> Result<Bytes, BoxError> {
        Ok(payload.data.clone())
    }
}

/// Result of a download, refined by [`Response::decode_image`] and [`Response::decode_text`]
#[derive(Debug, Clone)]
pub enum DownloadedFile {
    Path(PathBuf),
    Image(image::DynamicImage),
    Text(String),
}

/// Decoder for download requests
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl ResponseDecoder for FileDecoder {
    type Value = DownloadedFile;
    type ErrorValue = Bytes;

    fn decode_value(&self, payload: &Payload<'_>) -> Result<DownloadedFile, BoxError> {
        payload
            .local_path
            .map(|path| DownloadedFile::Path(path.to_path_buf()))
            .ok_or_else(|| "the download produced no local file".into())
    }

    fn decode_error_value(&self, payload: &Payload<'_>) -> Result<Bytes, BoxError> {
        Ok(payload.data.clone())
    }
}

/// A completed (or simulated) call and its decoded result
pub struct Response<D: ResponseDecoder> {
    pub request: Arc<Request>,
    pub status_code: u16,
    pub head: Option<ResponseHead>,
    pub data: Bytes,
    /// Set for downloads once the body is on disk
    pub local_path: Option<PathBuf>,
    /// URL of the wire request that was sent
    pub request_url: Option<Url>,
    pub sent_in_demo_mode: bool,
    /// `None` until [`Response::decode`] or [`Response::decode_error`] runs
    pub result: Option<ResponseResult<D::Value, D::ErrorValue>>,
    decoder: Arc<D>,
}

impl<D: ResponseDecoder> Response<D> {
    pub fn new(request: Arc<Request>, decoder: Arc<D>, status_code: u16, data: Bytes) -> Self {
        Self {
            request,
            status_code,
            head: None,
            data,
            local_path: None,
            request_url: None,
            sent_in_demo_mode: false,
            result: None,
            decoder,
        }
    }

    pub fn with_head(mut self, head: Option<ResponseHead>) -> Self {
        self.head = head;
        self
    }

    pub fn with_local_path(mut self, local_path: Option<PathBuf>) -> Self {
        self.local_path = local_path;
        self
    }

    pub fn with_request_url(mut self, url: Option<Url>) -> Self {
        self.request_url = url;
        self
    }

    pub fn in_demo_mode(mut self) -> Self {
        self.sent_in_demo_mode = true;
        self
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.head.as_ref().map(|head| &head.headers)
    }

    /// Final URL reported by the transport
    pub fn url(&self) -> Option<&Url> {
        self.head.as_ref().and_then(|head| head.url.as_ref())
    }

    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(ResponseResult::is_success)
    }

    fn payload(&self) -> Payload<'_> {
        Payload {
            data: &self.data,
            local_path: self.local_path.as_deref(),
            head: self.head.as_ref(),
        }
    }

    /// Decode the body as the success type
    pub fn decode(&mut self) {
        let result = match self.decoder.decode_value(&self.payload()) {
            Ok(value) => ResponseResult::Success(value),
            Err(e) => ResponseResult::Failure(None, DockerError::Decoding(e)),
        };
        self.result = Some(result);
    }

    /// Record `error`. Transport failures also try to decode the body as the error type.
    pub fn decode_error(&mut self, error: DockerError) {
        let result = if error.is_underlying() {
            match self.decoder.decode_error_value(&self.payload()) {
                Ok(value) => ResponseResult::Failure(Some(value), error),
                Err(e) => ResponseResult::Failure(None, DockerError::Decoding(e)),
            }
        } else {
            ResponseResult::Failure(None, error)
        };
        self.result = Some(result);
    }

    fn url_description(&self) -> String {
        match &self.request_url {
            Some(url) => url.to_string(),
            None => self.request.url_description(),
        }
    }

    fn received(&self) -> bool {
        self.head.is_some() || self.sent_in_demo_mode
    }

    pub fn short_description(&self) -> String {
        if self.received() {
            let url = self
                .url()
                .map(|url| url.to_string())
                .unwrap_or_else(|| self.url_description());
            format!("RESPONSE RECEIVED - URL= {} STATUS CODE:{}", url, self.status_code)
        } else {
            format!("RESPONSE NOT RECEIVED - URL= {}", self.url_description())
        }
    }
}

impl Response<FileDecoder> {
    /// Read the downloaded file as an image
    pub fn decode_image(&mut self) {
        let Some(path) = self.local_path.clone() else {
            warn!(target: LOG_TARGET, "Local path of the download is not set");
            return;
        };
        self.result = Some(match image::open(&path) {
            Ok(image) => ResponseResult::Success(DownloadedFile::Image(image)),
            Err(e) => {
                error!(target: LOG_TARGET, path = %path.display(), "Failed to decode image: {}", e);
                ResponseResult::Failure(None, DockerError::decoding(e))
            }
        });
    }

    /// Read the downloaded file as UTF-8 text
    pub fn decode_text(&mut self) {
        let Some(path) = self.local_path.clone() else {
            warn!(target: LOG_TARGET, "Local path of the download is not set");
            return;
        };
        self.result = Some(match std::fs::read_to_string(&path) {
            Ok(text) => ResponseResult::Success(DownloadedFile::Text(text)),
            Err(e) => {
                error!(target: LOG_TARGET, path = %path.display(), "Failed to read text: {}", e);
                ResponseResult::Failure(None, DockerError::decoding(e))
            }
        });
    }
}

impl<D: ResponseDecoder> fmt::Display for Response<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.received() {
            return write!(f, "RESPONSE NOT RECEIVED - URL= {}", self.url_description());
        }
        write!(f, "RESPONSE RECEIVED - URL= {}", self.url_description())?;
        if let Some(head) = &self.head {
            write!(f, "\nSTATUS CODE: {}\nHEADERS: {:?}", head.status, head.headers)?;
        } else {
            write!(f, "\nSTATUS CODE: {}", self.status_code)?;
        }
        if !self.data.is_empty() {
            if let Ok(body) = std::str::from_utf8(&self.data) {
                write!(f, "\nBODY=\n{}", body)?;
            }
        }
        Ok(())
    }
}

impl<D: ResponseDecoder> fmt::Debug for Response<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match &self.result {
            None => "pending",
            Some(ResponseResult::Success(_)) => "success",
            Some(ResponseResult::Failure(..)) => "failure",
        };
        f.debug_struct("Response")
            .field("status_code", &self.status_code)
            .field("url", &self.request_url)
            .field("data_len", &self.data.len())
            .field("local_path", &self.local_path)
            .field("sent_in_demo_mode", &self.sent_in_demo_mode)
            .field("result", &result)
            .finish()
    }
}
