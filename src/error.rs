//! Errors surfaced by the mock transport.

use thiserror::Error;

/// Errors returned while configuring the transport or resolving a response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A required input was missing or empty
    #[error("invalid argument `{param}`: {reason}")]
    InvalidArgument { param: &'static str, reason: String },

    /// The caller canceled the request, or the transport was disposed
    /// while the request was in flight
    #[error("request was canceled")]
    Canceled,

    /// A timeout-simulating response fired
    #[error("request timed out (simulated)")]
    TimedOut,

    /// The transport was disposed before the request was sent
    #[error("transport has been disposed")]
    Disposed,

    #[error("failed to serialize response body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to render response template: {0}")]
    Template(#[from] handlebars::RenderError),

    #[error("invalid response body: {0}")]
    Body(String),
}

impl TransportError {
    pub(crate) fn invalid_argument(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }

    /// True for both caller cancellation and simulated timeouts.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::TimedOut)
    }
}

pub type Result<T, E = TransportError> = std::result::Result<T, E>;
