//! Captured requests.
//!
//! Every request passing through the interceptor is frozen into a
//! [`RequestRecord`] and appended to the [`RequestLog`] before any response
//! is produced.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri, Version};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// An outbound request as handed to the interceptor.
#[derive(Debug, Clone, Default)]
pub struct OutboundRequest {
    pub method: Method,
    /// Requests built by hand may not carry a URI at all
    pub uri: Option<Uri>,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    /// Create a request with an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri: Some(uri),
            ..Default::default()
        }
    }

    /// Shorthand for a GET request. An invalid URI is logged and produces a
    /// request without a URI, which only a router fallback answers.
    pub fn get(uri: &str) -> Self {
        Self {
            uri: parse_uri(uri),
            ..Default::default()
        }
    }

    /// Shorthand for a POST request with a body.
    pub fn post(uri: &str, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            uri: parse_uri(uri),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}

fn parse_uri(uri: &str) -> Option<Uri> {
    match uri.parse() {
        Ok(uri) => Some(uri),
        Err(e) => {
            warn!(uri, error = %e, "Invalid request URI, sending without one");
            None
        }
    }
}

impl From<http::Request<Bytes>> for OutboundRequest {
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            uri: Some(parts.uri),
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }
}

/// Immutable capture of one outbound request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    method: Method,
    uri: Option<Uri>,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    sequence: usize,
    received_at: DateTime<Utc>,
}

impl RequestRecord {
    fn capture(request: OutboundRequest, sequence: usize) -> Self {
        Self {
            method: request.method,
            uri: request.uri,
            version: request.version,
            headers: request.headers,
            body: request.body,
            sequence,
            received_at: Utc::now(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> Option<&Uri> {
        self.uri.as_ref()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Position in the request log, starting at 0.
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// First value of a header, if it is valid text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw query string, empty when the request has none.
    pub fn query(&self) -> &str {
        self.uri.as_ref().and_then(Uri::query).unwrap_or("")
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Append-only, ordered store of captured requests.
///
/// Safe to share between any number of writers and readers. Entries are
/// never removed or reordered, and readers only ever see fully written
/// records.
#[derive(Debug, Default)]
pub struct RequestLog {
    entries: RwLock<Vec<Arc<RequestRecord>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a request and append it. The record's sequence number is its
    /// position in the log, so append order is the order in which callers
    /// reached this point.
    pub(crate) fn append(&self, request: OutboundRequest) -> Arc<RequestRecord> {
        let mut entries = self.entries.write();
        let record = Arc::new(RequestRecord::capture(request, entries.len()));
        entries.push(Arc::clone(&record));
        record
    }

    /// Number of captured requests.
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Captured requests satisfying `predicate`, in append order.
    pub fn filtered_view<F>(&self, predicate: F) -> Vec<Arc<RequestRecord>>
    where
        F: Fn(&RequestRecord) -> bool,
    {
        self.entries
            .read()
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    /// All captured requests, in append order.
    pub fn snapshot(&self) -> Vec<Arc<RequestRecord>> {
        self.entries.read().clone()
    }

    pub fn get(&self, index: usize) -> Option<Arc<RequestRecord>> {
        self.entries.read().get(index).cloned()
    }

    pub fn last(&self) -> Option<Arc<RequestRecord>> {
        self.entries.read().last().cloned()
    }
}
