#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use docker_service::{
    BodyPart, DownloadDestination, ResponseHead, Transport, TransportContext, TransportError,
    TransportOutcome, WireRequest,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Transport that replays queued outcomes and records every wire request it sees
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<TransportOutcome>>,
    requests: Mutex<Vec<WireRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every attempt for `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn then(self, outcome: TransportOutcome) -> Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    pub fn then_status(self, status: u16, body: &'static str) -> Self {
        self.then(TransportOutcome::response(
            ResponseHead::new(status),
            Bytes::from_static(body.as_bytes()),
        ))
    }

    pub fn then_connect_error(self) -> Self {
        self.then(TransportOutcome::failure(TransportError::Connect(
            "connection refused".to_string(),
        )))
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().clone()
    }

    async fn answer(&self, request: WireRequest) -> TransportOutcome {
        self.requests.lock().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| TransportOutcome::failure(TransportError::Unknown))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: WireRequest, _ctx: &TransportContext) -> TransportOutcome {
        self.answer(request).await
    }

    async fn upload_file(
        &self,
        request: WireRequest,
        _file: &Path,
        _ctx: &TransportContext,
    ) -> TransportOutcome {
        self.answer(request).await
    }

    async fn upload_multipart(
        &self,
        request: WireRequest,
        _parts: &[BodyPart],
        _ctx: &TransportContext,
    ) -> TransportOutcome {
        self.answer(request).await
    }

    async fn download(
        &self,
        request: WireRequest,
        _destination: &DownloadDestination,
        _ctx: &TransportContext,
    ) -> TransportOutcome {
        self.answer(request).await
    }
}
