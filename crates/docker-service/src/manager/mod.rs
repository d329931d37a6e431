//! Dispatcher: turns service calls into transport attempts (or demo
//! simulations) and delivers typed responses to their callers.

mod call;
mod registry;
mod retry;

pub use call::{
    CallHandle, CallId, Completion, CompletionQueue, Delivery, DeliveryContext, ServiceCall,
};
pub use registry::PendingCall;
pub use retry::{AutomaticRetry, ErrorClassification, RetryDecision};

use crate::config::{ServiceManagerConfig, TransportConfig};
use crate::demo::DemoPlan;
use crate::error::{DockerError, DockerResult};
use crate::http::{Request, RequestKind, Response, ResponseDecoder, WireRequest};
use crate::service::Service;
use crate::transport::{
    CallControl, ReqwestTransport, Transport, TransportContext, TransportError, TransportOutcome,
};
use crate::LOG_TARGET;
use bytes::Bytes;
use call::InFlightCall;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use registry::{CallEntry, CallRegistry};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

const DEFAULT_TIME_BEFORE_RETRY: Duration = Duration::from_secs(3);

struct Inner {
    default_transport: Arc<dyn Transport>,
    use_demo_mode: AtomicBool,
    time_before_retry: Duration,
    delivery: DeliveryContext,
    registry: CallRegistry,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

/// Shared dispatcher for service calls. Cloning is cheap and clones share
/// the registry, the default transport and the demo mode flag.
#[derive(Clone)]
pub struct ServiceManager {
    inner: Arc<Inner>,
}

enum Dispatch {
    Demo(DemoPlan),
    Network {
        wire: WireRequest,
        transport: Arc<dyn Transport>,
    },
}

pub struct ServiceManagerBuilder {
    transport: Option<Arc<dyn Transport>>,
    transport_config: TransportConfig,
    use_demo_mode: bool,
    time_before_retry: Duration,
    delivery: DeliveryContext,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl Default for ServiceManagerBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            transport_config: TransportConfig::default(),
            use_demo_mode: false,
            time_before_retry: DEFAULT_TIME_BEFORE_RETRY,
            delivery: DeliveryContext::Inline,
            rng: None,
        }
    }
}

impl ServiceManagerBuilder {
    /// Transport used by services that do not bring their own
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Settings for the default reqwest transport, ignored when a transport is set
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    pub fn demo_mode(mut self, enabled: bool) -> Self {
        self.use_demo_mode = enabled;
        self
    }

    pub fn time_before_retry(mut self, delay: Duration) -> Self {
        self.time_before_retry = delay;
        self
    }

    pub fn delivery(mut self, delivery: DeliveryContext) -> Self {
        self.delivery = delivery;
        self
    }

    /// Random source for demo mode outcomes and delays
    pub fn rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn build(self) -> DockerResult<ServiceManager> {
        let default_transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::from_config(&self.transport_config).map_err(DockerError::generic)?,
            ),
        };
        let rng = self
            .rng
            .unwrap_or_else(|| Box::new(StdRng::from_entropy()));

        Ok(ServiceManager {
            inner: Arc::new(Inner {
                default_transport,
                use_demo_mode: AtomicBool::new(self.use_demo_mode),
                time_before_retry: self.time_before_retry,
                delivery: self.delivery,
                registry: CallRegistry::default(),
                rng: Mutex::new(rng),
            }),
        })
    }
}

impl ServiceManager {
    /// Manager with a default reqwest transport
    pub fn new() -> DockerResult<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ServiceManagerBuilder {
        ServiceManagerBuilder::default()
    }

    pub fn from_config(config: &ServiceManagerConfig) -> DockerResult<Self> {
        Self::builder()
            .transport_config(config.transport.clone())
            .demo_mode(config.use_demo_mode)
            .time_before_retry(config.time_before_retry())
            .build()
    }

    /// Validate, register and dispatch a call.
    ///
    /// Errors raised while building the request (URL, path parameters, body or
    /// parameter encoding, headers, multipart checks, demo fixtures) are returned
    /// here and nothing is sent. Everything else reaches the completion and the
    /// returned handle. Must be called from within a Tokio runtime.
    pub fn call<D: ResponseDecoder>(&self, call: ServiceCall<D>) -> DockerResult<CallHandle<D>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            DockerError::generic(format!("ServiceManager::call needs a Tokio runtime: {}", e))
        })?;

        let ServiceCall {
            request,
            service,
            decoder,
            remaining_automatic_retries,
            completion,
            progress,
        } = call;

        let demo = self.is_demo_mode() || request.demo.enabled;
        let dispatch = if demo {
            let mut rng = self.inner.rng.lock();
            let plan = request
                .demo
                .plan(&mut **rng, &request.service.service_ref())?;
            Dispatch::Demo(plan)
        } else {
            let transport = service
                .transport()
                .cloned()
                .unwrap_or_else(|| self.inner.default_transport.clone());
            request.validate_multipart()?;
            let wire = request.build_wire_request(&transport.default_headers())?;
            Dispatch::Network { wire, transport }
        };

        let id = self.inner.registry.next_id();
        let control = CallControl::new();
        self.inner.registry.register(
            id,
            CallEntry {
                service: service.service_ref(),
                description: request.short_description(),
                is_processing: true,
                remaining_automatic_retries,
                control: control.clone(),
                demo,
            },
        );

        let (sender, receiver) = oneshot::channel();
        let in_flight = InFlightCall {
            id,
            request,
            decoder: Arc::new(decoder),
            completion,
            sender,
        };

        let manager = self.clone();
        match dispatch {
            Dispatch::Demo(plan) => {
                info!(
                    target: LOG_TARGET,
                    call = %id,
                    "Service Manager: start demo {}",
                    in_flight.request.short_description()
                );
                runtime.spawn(manager.run_demo(in_flight, plan, control.clone()));
            }
            Dispatch::Network { wire, transport } => {
                let operation = match in_flight.request.kind {
                    RequestKind::Data => "",
                    RequestKind::UploadFile(_) => "upload ",
                    RequestKind::UploadMultipart => "upload multipart ",
                    RequestKind::Download(_) => "download ",
                };
                info!(
                    target: LOG_TARGET,
                    call = %id,
                    "Service Manager: start {}{}",
                    operation,
                    in_flight.request.short_description()
                );
                let ctx = TransportContext::new(control.clone()).with_progress(progress);
                runtime.spawn(manager.run_network(in_flight, wire, transport, ctx));
            }
        }

        Ok(CallHandle::new(id, control, receiver))
    }

    async fn run_network<D: ResponseDecoder>(
        self,
        call: InFlightCall<D>,
        wire: WireRequest,
        transport: Arc<dyn Transport>,
        ctx: TransportContext,
    ) {
        let retry = AutomaticRetry::new(self.inner.time_before_retry);
        let url = wire.url.clone();

        let outcome = loop {
            self.inner.registry.set_processing(call.id, true);
            let outcome = tokio::select! {
                biased;
                _ = ctx.control.cancelled() => TransportOutcome::failure(TransportError::Cancelled),
                outcome = Self::attempt(transport.as_ref(), &call.request, wire.clone(), &ctx) => outcome,
            };
            self.inner.registry.set_processing(call.id, false);

            let remaining = self.inner.registry.remaining_retries(call.id);
            match retry.should_retry(&outcome, remaining, ctx.control.is_cancelled()) {
                RetryDecision::Retry { delay } => match self.inner.registry.begin_retry(call.id) {
                    Ok(left) => {
                        warn!(
                            target: LOG_TARGET,
                            call = %call.id,
                            remaining = left,
                            "Retrying {} in {:?}: {}",
                            call.request.short_description(),
                            delay,
                            outcome
                                .error
                                .as_ref()
                                .map(|e| e.to_string())
                                .unwrap_or_else(|| TransportError::Unknown.to_string())
                        );
                        tokio::select! {
                            biased;
                            _ = ctx.control.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    Err(refusal) => {
                        debug!(target: LOG_TARGET, call = %call.id, "Automatic retry refused: {:?}", refusal);
                        break outcome;
                    }
                },
                RetryDecision::Stop { reason } => {
                    if outcome.error.is_some() {
                        debug!(target: LOG_TARGET, call = %call.id, "Not retrying: {}", reason);
                    }
                    break outcome;
                }
            }
        };

        let (response, error) = Self::response_from_outcome(&call, outcome, url);
        self.complete_service_call(call, response, error);
    }

    async fn attempt(
        transport: &dyn Transport,
        request: &Request,
        wire: WireRequest,
        ctx: &TransportContext,
    ) -> TransportOutcome {
        match &request.kind {
            RequestKind::Data => transport.send(wire, ctx).await,
            RequestKind::UploadFile(path) => transport.upload_file(wire, path, ctx).await,
            RequestKind::UploadMultipart => {
                let parts = request.multipart_parts.as_deref().unwrap_or(&[]);
                transport.upload_multipart(wire, parts, ctx).await
            }
            RequestKind::Download(destination) => transport.download(wire, destination, ctx).await,
        }
    }

    /// Map a raw attempt onto a response and the error that goes with it
    fn response_from_outcome<D: ResponseDecoder>(
        call: &InFlightCall<D>,
        outcome: TransportOutcome,
        url: Url,
    ) -> (Response<D>, Option<DockerError>) {
        let TransportOutcome {
            head,
            data,
            local_path,
            error,
        } = outcome;
        let status_code = head.as_ref().map(|head| head.status).unwrap_or(0);

        let error = match (&head, error) {
            (Some(_), None) => None,
            (Some(received), Some(cause)) => Some(DockerError::Underlying {
                cause,
                response: Some(received.clone()),
                status_code,
            }),
            (None, Some(cause)) => Some(DockerError::Underlying {
                cause,
                response: None,
                status_code: 0,
            }),
            (None, None) => Some(DockerError::Underlying {
                cause: TransportError::Unknown,
                response: None,
                status_code: 0,
            }),
        };
        let data = if head.is_some() { data } else { Bytes::new() };

        let response = Response::new(call.request.clone(), call.decoder.clone(), status_code, data)
            .with_head(head)
            .with_local_path(local_path)
            .with_request_url(Some(url));
        (response, error)
    }

    async fn run_demo<D: ResponseDecoder>(
        self,
        call: InFlightCall<D>,
        plan: DemoPlan,
        control: CallControl,
    ) {
        let cancelled = tokio::select! {
            biased;
            _ = control.cancelled() => true,
            _ = tokio::time::sleep(plan.delay) => false,
        };
        self.inner.registry.set_processing(call.id, false);

        let (response, error) = if cancelled {
            let response = Response::new(call.request.clone(), call.decoder.clone(), 0, Bytes::new());
            let error = DockerError::Underlying {
                cause: TransportError::Cancelled,
                response: None,
                status_code: 0,
            };
            (response, Some(error))
        } else {
            let error = (!plan.success).then(|| DockerError::Underlying {
                cause: TransportError::UnacceptableStatusCode(plan.status_code),
                response: None,
                status_code: plan.status_code,
            });
            let response =
                Response::new(call.request.clone(), call.decoder.clone(), plan.status_code, plan.data);
            (response, error)
        };

        let response = response
            .with_request_url(call.request.url().ok())
            .in_demo_mode();
        self.complete_service_call(call, response, error);
    }

    /// Decode the response, run the completion once, unregister the call and
    /// resolve its handle.
    ///
    /// Error decoding is used when `error` is set, or when the request routes
    /// statuses inside its error range to the error type.
    pub(crate) fn complete_service_call<D: ResponseDecoder>(
        &self,
        call: InFlightCall<D>,
        mut response: Response<D>,
        error: Option<DockerError>,
    ) {
        let request = &call.request;
        let error_status = request.use_different_response_for_errors
            && request.error_status_range.contains(&response.status_code);

        match error {
            Some(error) => {
                warn!(target: LOG_TARGET, call = %call.id, "Service completed with error: {}", error);
                response.decode_error(error);
            }
            None if error_status => {
                let status_code = response.status_code;
                warn!(target: LOG_TARGET, call = %call.id, "Service completed with error status {}", status_code);
                response.decode_error(DockerError::Underlying {
                    cause: TransportError::UnacceptableStatusCode(status_code),
                    response: response.head.clone(),
                    status_code,
                });
            }
            None => response.decode(),
        }

        info!(target: LOG_TARGET, call = %call.id, "Service completed with response {}", response.short_description());
        debug!(target: LOG_TARGET, call = %call.id, "\n{}\n{}", request, response);

        self.deliver(call, response);
    }

    fn deliver<D: ResponseDecoder>(&self, call: InFlightCall<D>, response: Response<D>) {
        let inner = self.inner.clone();
        let InFlightCall {
            id,
            completion,
            sender,
            ..
        } = call;
        self.inner.delivery.deliver(Box::new(move || {
            if let Some(completion) = completion {
                completion(&response);
            }
            inner.registry.remove(id);
            // The caller may have dropped its handle.
            let _ = sender.send(response);
        }));
    }

    /// Calls registered and not yet completed, oldest first
    pub fn pending_calls(&self) -> Vec<PendingCall> {
        self.inner.registry.snapshot()
    }

    pub fn has_pending_calls(&self) -> bool {
        self.pending_call_count() > 0
    }

    pub fn pending_call_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Cancel a pending call. Returns `false` when it already completed.
    pub fn cancel(&self, id: CallId) -> bool {
        match self.inner.registry.control(id) {
            Some(control) => {
                control.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending call made against the same base URL and path
    pub fn cancel_all_for_service(&self, service: &Service) -> usize {
        let controls = self.inner.registry.controls_for(&service.service_ref());
        for control in &controls {
            control.cancel();
        }
        if !controls.is_empty() {
            info!(target: LOG_TARGET, count = controls.len(), "Cancelled calls for {}", service.service_ref());
        }
        controls.len()
    }

    pub fn set_demo_mode(&self, enabled: bool) {
        self.inner.use_demo_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn is_demo_mode(&self) -> bool {
        self.inner.use_demo_mode.load(Ordering::Relaxed)
    }

    pub fn time_before_retry(&self) -> Duration {
        self.inner.time_before_retry
    }

    pub fn default_transport(&self) -> &Arc<dyn Transport> {
        &self.inner.default_transport
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("use_demo_mode", &self.is_demo_mode())
            .field("time_before_retry", &self.inner.time_before_retry)
            .field("delivery", &self.inner.delivery)
            .field("pending_calls", &self.pending_call_count())
            .finish()
    }
}
