//! The interceptor: entry point for every outbound request.

use crate::config::{MockTransportConfig, TransportSettings};
use crate::context::{ResolveContext, TransportOptions};
use crate::error::{Result, TransportError};
use crate::node::ResponseNode;
use crate::request::{OutboundRequest, RequestLog};
use crate::response::MockResponse;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Records every request it sees and answers it from a response graph.
///
/// One instance can be shared between any number of tasks sending requests
/// concurrently.
pub struct Interceptor {
    root: ArcSwap<ResponseNode>,
    options: Arc<TransportOptions>,
    requests: RequestLog,
    /// Parent of every per-request cancellation token; canceled on dispose
    lifetime: CancellationToken,
    disposed: AtomicBool,
    /// Total requests whose resolution failed.
    requests_failed: AtomicU64,
    log_requests: bool,
    log_failures: bool,
}

impl Interceptor {
    /// Create an interceptor with default settings.
    pub fn new(root: ResponseNode) -> Self {
        Self::with_settings(root, &TransportSettings::default())
    }

    pub fn with_settings(root: ResponseNode, settings: &TransportSettings) -> Self {
        let mut interceptor = Self::with_options(root, settings.options());
        interceptor.log_requests = settings.log_requests;
        interceptor.log_failures = settings.log_failures;
        interceptor
    }

    /// Create an interceptor with explicit options, e.g. a custom serializer.
    pub fn with_options(root: ResponseNode, options: TransportOptions) -> Self {
        info!(root = root.kind(), "Mock transport initialized");

        Self {
            root: ArcSwap::from_pointee(root),
            options: Arc::new(options),
            requests: RequestLog::new(),
            lifetime: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            requests_failed: AtomicU64::new(0),
            log_requests: true,
            log_failures: true,
        }
    }

    /// Build the response graph described by `config`.
    pub fn from_config(config: &MockTransportConfig) -> anyhow::Result<Self> {
        let root = config.build()?;
        info!(routes = config.routes.len(), "Loaded route table");
        Ok(Self::with_settings(root, &config.settings))
    }

    /// Create from a YAML configuration string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Self::from_config(&MockTransportConfig::from_yaml(yaml)?)
    }

    /// Replace the response graph. Requests already resolving finish
    /// against the graph they started with.
    pub fn configure(&self, root: ResponseNode) {
        debug!(root = root.kind(), "Replacing response graph");
        self.root.store(Arc::new(root));
    }

    /// Every request sent so far.
    pub fn requests(&self) -> &RequestLog {
        &self.requests
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> usize {
        self.requests.count()
    }

    /// Get total requests that failed to resolve.
    pub fn total_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop accepting requests and cancel in-flight waits. Safe to call any
    /// number of times.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.lifetime.cancel();
            info!(
                requests = self.total_requests(),
                "Mock transport disposed"
            );
        }
    }

    /// Record `request` and resolve a response for it.
    pub async fn send(&self, request: OutboundRequest) -> Result<Arc<MockResponse>> {
        self.send_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send), aborting with [`TransportError::Canceled`]
    /// once `cancel` fires. The request is recorded either way.
    pub async fn send_with_cancellation(
        &self,
        request: OutboundRequest,
        cancel: &CancellationToken,
    ) -> Result<Arc<MockResponse>> {
        if self.is_disposed() {
            return Err(TransportError::Disposed);
        }

        let record = self.requests.append(request);
        if self.log_requests {
            debug!(
                sequence = record.sequence(),
                method = %record.method(),
                uri = ?record.uri(),
                "Request recorded"
            );
        }

        let root = self.root.load_full();
        let ctx = ResolveContext::new(
            Arc::clone(&record),
            Arc::clone(&self.options),
            self.lifetime.child_token(),
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            result = root.resolve(&ctx) => result,
        };

        match result {
            Ok(response) => {
                // A node may already have attached a request; it is kept.
                response.set_request(record);
                Ok(response)
            }
            Err(e) => {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
                if self.log_failures {
                    warn!(
                        sequence = record.sequence(),
                        method = %record.method(),
                        uri = ?record.uri(),
                        error = %e,
                        "Request failed"
                    );
                }
                Err(e)
            }
        }
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("root", &self.root.load().kind())
            .field("requests", &self.total_requests())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
