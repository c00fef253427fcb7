//! Zentinel Mock Transport
//!
//! An in-process stand-in for an HTTP client transport. Tests configure
//! canned responses, send requests through an [`Interceptor`], and then
//! inspect what was sent. Nothing touches the network.
//!
//! # Features
//!
//! - **Request Recording**: Every request is captured before it is answered
//! - **Wildcard Matching**: Route on URI patterns like `*/users/*`
//! - **Static and Dynamic Responses**: Fixed, JSON, text, and Handlebars templates
//! - **Sequences**: Step through responses, repeating the last one
//! - **Latency Simulation**: Add fixed or random delays
//! - **Failure Injection**: Error responses and simulated client timeouts
//!
//! # Example Configuration
//!
//! ```yaml
//! routes:
//!   - uri: "*/hello"
//!     responses:
//!       - status: 200
//!         body:
//!           type: json
//!           content:
//!             message: "Hello, World!"
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod matcher;
pub mod node;
pub mod pattern;
pub mod request;
pub mod response;
pub mod routing;
pub mod sequence;
pub mod template;

pub use config::{MockTransportConfig, TransportSettings};
pub use context::{JsonSerializer, ResolveContext, TransportOptions};
pub use error::{Result, TransportError};
pub use interceptor::Interceptor;
pub use matcher::{matches_query, matches_uri, UriPattern, UriPatternMatchingOptions};
pub use node::ResponseNode;
pub use pattern::{matches, CaseSensitivity, MatchOptions};
pub use request::{OutboundRequest, RequestLog, RequestRecord};
pub use response::MockResponse;
pub use routing::Router;
pub use tokio_util::sync::CancellationToken;
