//! Response messages produced by response nodes.

use crate::request::RequestRecord;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, Version};
use std::sync::{Arc, OnceLock};

/// A response handed back to the caller.
///
/// The back-reference to the originating request can be written once; the
/// first writer wins and later writes are ignored.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
    request: OnceLock<Arc<RequestRecord>>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl MockResponse {
    /// Empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            request: OnceLock::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a header, replacing previous values. Invalid values are ignored.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    pub(crate) fn set_header(&mut self, name: &'static str, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    /// The request this response answers, if one has been attached.
    pub fn request(&self) -> Option<&Arc<RequestRecord>> {
        self.request.get()
    }

    /// Attach the originating request. Returns false when one was already
    /// attached, in which case the existing one is kept.
    pub fn set_request(&self, record: Arc<RequestRecord>) -> bool {
        self.request.set(record).is_ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Convert into an `http::Response`, dropping the request back-reference.
    pub fn into_http(self) -> http::Response<Bytes> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        response
    }
}
