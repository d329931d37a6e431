//! The seam between the dispatcher and the HTTP engine that moves bytes.

mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use crate::http::{BodyPart, DownloadDestination, ResponseHead, WireRequest};
use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

/// Failures reported by a transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("Response status code was unacceptable: {0}")]
    UnacceptableStatusCode(u16),

    #[error("Failed to read file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build multipart body: {0}")]
    Multipart(String),

    #[error("Invalid transport configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown network error")]
    Unknown,
}

impl TransportError {
    /// Errors raised while talking to the network, as opposed to local
    /// file, form or cancellation failures
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Timeout(_) | Self::Request(_) | Self::Body(_) | Self::Unknown
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else if let Some(status) = err.status() {
            Self::UnacceptableStatusCode(status.as_u16())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Raw result of one transport attempt
#[derive(Debug, Default)]
pub struct TransportOutcome {
    /// `None` when no response was received at all
    pub head: Option<ResponseHead>,
    pub data: Bytes,
    pub local_path: Option<PathBuf>,
    pub error: Option<TransportError>,
}

impl TransportOutcome {
    pub fn response(head: ResponseHead, data: impl Into<Bytes>) -> Self {
        Self {
            head: Some(head),
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn failure(error: TransportError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: TransportError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_local_path(mut self, path: PathBuf) -> Self {
        self.local_path = Some(path);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Running,
    Suspended,
    Cancelled,
}

/// Suspend / resume / cancel switch shared by a call handle and its transport
#[derive(Debug, Clone)]
pub struct CallControl {
    state: Arc<watch::Sender<CallState>>,
}

impl Default for CallControl {
    fn default() -> Self {
        Self::new()
    }
}

impl CallControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CallState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> CallState {
        *self.state.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == CallState::Cancelled
    }

    pub fn suspend(&self) {
        self.transition(CallState::Running, CallState::Suspended);
    }

    pub fn resume(&self) {
        self.transition(CallState::Suspended, CallState::Running);
    }

    /// Cancelling is final
    pub fn cancel(&self) {
        self.state.send_if_modified(|state| {
            if *state == CallState::Cancelled {
                false
            } else {
                *state = CallState::Cancelled;
                true
            }
        });
    }

    fn transition(&self, from: CallState, to: CallState) {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
    }

    /// Resolves once the call is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == CallState::Cancelled).await;
    }

    /// Waits while the call is suspended. Returns `false` if it was cancelled.
    pub async fn wait_while_suspended(&self) -> bool {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| *state != CallState::Suspended)
            .await
            .map(|state| *state != CallState::Cancelled)
            .unwrap_or(false)
    }
}

/// Bytes transferred so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Completed fraction in `[0, 1]`, `0` while the total is unknown
    pub fn fraction(&self) -> f64 {
        match self.total {
            Some(0) => 1.0,
            Some(total) => (self.completed as f64 / total as f64).min(1.0),
            None => 0.0,
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Per-attempt state handed to the transport
#[derive(Clone, Default)]
pub struct TransportContext {
    pub control: CallControl,
    progress: Option<ProgressCallback>,
}

impl TransportContext {
    pub fn new(control: CallControl) -> Self {
        Self {
            control,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn report_progress(&self, completed: u64, total: Option<u64>) {
        if let Some(progress) = &self.progress {
            progress(Progress { completed, total });
        }
    }
}

impl fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportContext")
            .field("control", &self.control)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Sends wire requests and reports what came back
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Headers merged under every request's own headers
    fn default_headers(&self) -> HeaderMap {
        HeaderMap::new()
    }

    async fn send(&self, request: WireRequest, ctx: &TransportContext) -> TransportOutcome;

    async fn upload_file(
        &self,
        request: WireRequest,
        file: &Path,
        ctx: &TransportContext,
    ) -> TransportOutcome;

    async fn upload_multipart(
        &self,
        request: WireRequest,
        parts: &[BodyPart],
        ctx: &TransportContext,
    ) -> TransportOutcome;

    async fn download(
        &self,
        request: WireRequest,
        destination: &DownloadDestination,
        ctx: &TransportContext,
    ) -> TransportOutcome;
}
