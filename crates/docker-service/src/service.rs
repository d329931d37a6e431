use crate::error::ServiceRef;
use crate::http::UrlBuilder;
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;

/// An endpoint: base URL, path template and optionally the transport that serves it.
///
/// Without a transport the dispatcher's default transport is used.
#[derive(Clone, Default)]
pub struct Service {
    pub base_url: String,
    pub path: String,
    pub transport: Option<Arc<dyn Transport>>,
}

impl Service {
    pub fn new(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: path.into(),
            transport: None,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn service_ref(&self) -> ServiceRef {
        ServiceRef::new(self.base_url.clone(), self.path.clone())
    }

    /// Base URL and path template joined, placeholders left in place
    pub fn composed_url(&self) -> String {
        UrlBuilder::compose(&self.base_url, &self.path)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("base_url", &self.base_url)
            .field("path", &self.path)
            .field("transport", &self.transport)
            .finish()
    }
}
