//! Service calls, their handles and completion delivery

use crate::error::{DockerError, DockerResult};
use crate::http::{Request, Response, ResponseDecoder};
use crate::service::Service;
use crate::transport::{CallControl, Progress, ProgressCallback};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Identifier assigned to a call when it is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub(crate) u64);

impl CallId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Completion<D> = Box<dyn FnOnce(&Response<D>) + Send>;

/// A request paired with its decoder, completion and retry budget
pub struct ServiceCall<D: ResponseDecoder> {
    pub request: Arc<Request>,
    /// Service whose transport carries the call, the request's own service by default
    pub service: Service,
    pub decoder: D,
    pub remaining_automatic_retries: u32,
    pub(crate) completion: Option<Completion<D>>,
    pub(crate) progress: Option<ProgressCallback>,
}

impl<D: ResponseDecoder> ServiceCall<D> {
    pub fn new(request: Request, decoder: D) -> Self {
        let service = request.service.clone();
        Self {
            request: Arc::new(request),
            service,
            decoder,
            remaining_automatic_retries: 0,
            completion: None,
            progress: None,
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.service = service;
        self
    }

    /// Called exactly once with the decoded response
    pub fn with_completion<F>(mut self, completion: F) -> Self
    where
        F: FnOnce(&Response<D>) + Send + 'static,
    {
        self.completion = Some(Box::new(completion));
        self
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Resubmit up to `retries` times when an attempt gets no response
    pub fn with_automatic_retries(mut self, retries: u32) -> Self {
        self.remaining_automatic_retries = retries;
        self
    }
}

impl<D: ResponseDecoder> fmt::Debug for ServiceCall<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCall")
            .field("request", &self.request.short_description())
            .field("service", &self.service)
            .field("remaining_automatic_retries", &self.remaining_automatic_retries)
            .finish()
    }
}

/// Dispatched call waiting for its completion to be delivered
pub(crate) struct InFlightCall<D: ResponseDecoder> {
    pub id: CallId,
    pub request: Arc<Request>,
    pub decoder: Arc<D>,
    pub completion: Option<Completion<D>>,
    pub sender: oneshot::Sender<Response<D>>,
}

/// Caller's side of a dispatched call
pub struct CallHandle<D: ResponseDecoder> {
    id: CallId,
    control: CallControl,
    receiver: oneshot::Receiver<Response<D>>,
}

impl<D: ResponseDecoder> CallHandle<D> {
    pub(crate) fn new(
        id: CallId,
        control: CallControl,
        receiver: oneshot::Receiver<Response<D>>,
    ) -> Self {
        Self {
            id,
            control,
            receiver,
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn control(&self) -> &CallControl {
        &self.control
    }

    pub fn suspend(&self) {
        self.control.suspend();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    /// No effect once the call has completed
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Wait for the decoded response. Resolves after the completion has run.
    pub async fn response(self) -> DockerResult<Response<D>> {
        self.receiver
            .await
            .map_err(|_| DockerError::generic(format!("call {} ended without a response", self.id)))
    }
}

impl<D: ResponseDecoder> fmt::Debug for CallHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("id", &self.id)
            .field("state", &self.control.state())
            .finish()
    }
}

pub type Delivery = Box<dyn FnOnce() + Send>;

/// Where completions run
#[derive(Clone, Default)]
pub enum DeliveryContext {
    /// On the task that finished the call
    #[default]
    Inline,
    /// Handed to a [`CompletionQueue`]
    Queue(mpsc::UnboundedSender<Delivery>),
}

impl DeliveryContext {
    /// Run `delivery` here or hand it to the queue. Falls back to running it
    /// inline once the queue is gone.
    pub(crate) fn deliver(&self, delivery: Delivery) {
        match self {
            Self::Inline => delivery(),
            Self::Queue(sender) => {
                if let Err(mpsc::error::SendError(delivery)) = sender.send(delivery) {
                    delivery();
                }
            }
        }
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Queue(_) => f.write_str("Queue"),
        }
    }
}

/// Runs completions on whatever task drains it, e.g. an application's main loop
pub struct CompletionQueue {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl CompletionQueue {
    pub fn channel() -> (DeliveryContext, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (DeliveryContext::Queue(sender), Self { receiver })
    }

    /// Run the next completion. Returns `false` once every sender is gone.
    pub async fn next(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(delivery) => {
                delivery();
                true
            }
            None => false,
        }
    }

    /// Run every completion already queued, without waiting
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(delivery) = self.receiver.try_recv() {
            delivery();
            count += 1;
        }
        count
    }

    /// Run completions until every sender is dropped
    pub async fn run(mut self) {
        while self.next().await {}
    }
}

impl fmt::Debug for CompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionQueue").finish_non_exhaustive()
    }
}
