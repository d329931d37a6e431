//! Default transport backed by `reqwest`

use super::{Transport, TransportContext, TransportError, TransportOutcome};
use crate::config::TransportConfig;
use crate::http::{BodyBuilder, BodyPart, DownloadDestination, ResponseHead, WireRequest};
use crate::LOG_TARGET;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// [`Transport`] that performs real HTTP calls with a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    default_headers: HeaderMap,
    validate_status: bool,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::from_config(&TransportConfig::default())
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms));
        if config.request_timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(config.request_timeout_ms));
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                TransportError::InvalidConfig(format!("Invalid proxy URL '{}': {}", proxy_url, e))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                TransportError::InvalidConfig(format!("Invalid default header name '{}'", name))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                TransportError::InvalidConfig(format!("Invalid value for default header '{}'", name))
            })?;
            default_headers.insert(header_name, header_value);
        }

        Ok(Self {
            client,
            default_headers,
            validate_status: config.validate_status,
        })
    }

    /// Use an existing client, with status validation on
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            default_headers: HeaderMap::new(),
            validate_status: true,
        }
    }

    fn builder(&self, request: WireRequest) -> RequestBuilder {
        debug!(target: LOG_TARGET, "Sending {}", request);
        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        builder
    }

    async fn receive(
        &self,
        builder: RequestBuilder,
        ctx: &TransportContext,
    ) -> Result<(ResponseHead, reqwest::Response), TransportError> {
        if !ctx.control.wait_while_suspended().await {
            return Err(TransportError::Cancelled);
        }
        let response = builder.send().await?;
        let head = ResponseHead {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            url: Some(response.url().clone()),
        };
        Ok((head, response))
    }

    /// Pull the next body chunk, pausing while the call is suspended
    async fn next_chunk(
        response: &mut reqwest::Response,
        ctx: &TransportContext,
        completed: &mut u64,
        total: Option<u64>,
    ) -> Result<Option<Bytes>, TransportError> {
        if !ctx.control.wait_while_suspended().await {
            return Err(TransportError::Cancelled);
        }
        let chunk = response.chunk().await?;
        if let Some(chunk) = &chunk {
            *completed += chunk.len() as u64;
            ctx.report_progress(*completed, total);
        }
        Ok(chunk)
    }

    async fn collect(&self, builder: RequestBuilder, ctx: &TransportContext) -> TransportOutcome {
        let (head, mut response) = match self.receive(builder, ctx).await {
            Ok(received) => received,
            Err(e) => return TransportOutcome::failure(e),
        };

        let total = response.content_length();
        let mut completed = 0;
        let mut data = BytesMut::new();
        loop {
            match Self::next_chunk(&mut response, ctx, &mut completed, total).await {
                Ok(Some(chunk)) => data.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return TransportOutcome::response(head, data.freeze()).with_error(e),
            }
        }
        self.validate(TransportOutcome::response(head, data.freeze()))
    }

    fn validate(&self, outcome: TransportOutcome) -> TransportOutcome {
        match &outcome.head {
            Some(head) if self.validate_status && !(200..300).contains(&head.status) => {
                let status = head.status;
                outcome.with_error(TransportError::UnacceptableStatusCode(status))
            }
            _ => outcome,
        }
    }

    /// Body that reports upload progress as reqwest pulls each chunk
    fn progress_body(data: Bytes, ctx: &TransportContext) -> reqwest::Body {
        let total = data.len() as u64;
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
            .collect();
        let ctx = ctx.clone();
        let mut sent = 0u64;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            ctx.report_progress(sent, Some(total));
            Ok::<Bytes, std::io::Error>(chunk)
        }));
        reqwest::Body::wrap_stream(stream)
    }

    async fn prepare_destination(
        path: &Path,
        destination: &DownloadDestination,
    ) -> Result<tokio::fs::File, TransportError> {
        let write_error = |source: std::io::Error| TransportError::FileWrite {
            path: path.to_path_buf(),
            source,
        };
        if destination.create_intermediate_directories {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
            }
        }
        if destination.remove_previous_file {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(e)),
            }
            tokio::fs::File::create(path).await.map_err(write_error)
        } else {
            tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
                .map_err(write_error)
        }
    }

    async fn write_body(
        response: &mut reqwest::Response,
        file: &mut tokio::fs::File,
        path: &Path,
        ctx: &TransportContext,
    ) -> Result<(), TransportError> {
        let total = response.content_length();
        let mut completed = 0;
        while let Some(chunk) = Self::next_chunk(response, ctx, &mut completed, total).await? {
            file.write_all(&chunk)
                .await
                .map_err(|source| TransportError::FileWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.flush().await.map_err(|source| TransportError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn default_headers(&self) -> HeaderMap {
        self.default_headers.clone()
    }

    async fn send(&self, request: WireRequest, ctx: &TransportContext) -> TransportOutcome {
        let builder = self.builder(request);
        self.collect(builder, ctx).await
    }

    async fn upload_file(
        &self,
        mut request: WireRequest,
        file: &Path,
        ctx: &TransportContext,
    ) -> TransportOutcome {
        let data = match tokio::fs::read(file).await {
            Ok(data) => Bytes::from(data),
            Err(source) => {
                return TransportOutcome::failure(TransportError::FileRead {
                    path: file.to_path_buf(),
                    source,
                })
            }
        };
        request.body = None;
        let builder = self.builder(request).body(Self::progress_body(data, ctx));
        self.collect(builder, ctx).await
    }

    async fn upload_multipart(
        &self,
        mut request: WireRequest,
        parts: &[BodyPart],
        ctx: &TransportContext,
    ) -> TransportOutcome {
        let form = match BodyBuilder::multipart_form(parts) {
            Ok(form) => form,
            Err(e) => return TransportOutcome::failure(e),
        };
        request.body = None;
        // reqwest sets the boundary-carrying content type itself.
        request.headers.remove(CONTENT_TYPE);
        let builder = self.builder(request).multipart(form);
        self.collect(builder, ctx).await
    }

    async fn download(
        &self,
        request: WireRequest,
        destination: &DownloadDestination,
        ctx: &TransportContext,
    ) -> TransportOutcome {
        let path: PathBuf = destination.resolve(&request.url);
        let builder = self.builder(request);
        let (head, mut response) = match self.receive(builder, ctx).await {
            Ok(received) => received,
            Err(e) => return TransportOutcome::failure(e),
        };

        let mut file = match Self::prepare_destination(&path, destination).await {
            Ok(file) => file,
            Err(e) => return TransportOutcome::response(head, Bytes::new()).with_error(e),
        };
        if let Err(e) = Self::write_body(&mut response, &mut file, &path, ctx).await {
            return TransportOutcome::response(head, Bytes::new())
                .with_local_path(path)
                .with_error(e);
        }

        debug!(target: LOG_TARGET, path = %path.display(), "Download written");
        self.validate(TransportOutcome::response(head, Bytes::new()).with_local_path(path))
    }
}
