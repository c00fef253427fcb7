//! Per-request resolution context and the ambient options it carries.

use crate::error::Result;
use crate::matcher::UriPatternMatchingOptions;
use crate::request::RequestRecord;
use crate::response::MockResponse;
use crate::template::TemplateEngine;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Serializes JSON payloads into response bodies.
pub trait JsonSerializer: Send + Sync + fmt::Debug {
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>>;

    fn content_type(&self) -> &str {
        "application/json"
    }
}

/// `serde_json` backed serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonSerializer {
    pub pretty: bool,
}

impl JsonSerializer for SerdeJsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }
}

/// Immutable options shared by every resolution of one interceptor.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub matching: UriPatternMatchingOptions,
    pub serializer: Arc<dyn JsonSerializer>,
    pub templates: Arc<TemplateEngine>,
    /// Content type for binary template bodies
    pub default_content_type: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            matching: UriPatternMatchingOptions::default(),
            serializer: Arc::new(SerdeJsonSerializer::default()),
            templates: Arc::new(TemplateEngine::new()),
            default_content_type: "application/octet-stream".to_string(),
        }
    }
}

/// Everything a response node sees while producing a response.
pub struct ResolveContext {
    request: Arc<RequestRecord>,
    skeleton: Mutex<MockResponse>,
    options: Arc<TransportOptions>,
    cancellation: CancellationToken,
}

impl ResolveContext {
    /// Fresh context with a 200 OK skeleton that does not reference the
    /// request.
    pub fn new(
        request: Arc<RequestRecord>,
        options: Arc<TransportOptions>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            request,
            skeleton: Mutex::new(MockResponse::default()),
            options,
            cancellation,
        }
    }

    pub fn request(&self) -> &Arc<RequestRecord> {
        &self.request
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Cancellation signal for this resolution. Nodes may trigger it
    /// themselves to simulate a client-side timeout.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Copy of the current response skeleton; leaf nodes build on it.
    pub fn skeleton(&self) -> MockResponse {
        self.skeleton.lock().clone()
    }

    /// Modify the skeleton used by nodes resolved after this call.
    pub fn update_skeleton(&self, f: impl FnOnce(&mut MockResponse)) {
        let mut skeleton = self.skeleton.lock();
        f(&mut *skeleton);
    }
}

impl fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContext")
            .field("request", &self.request.sequence())
            .field("canceled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
