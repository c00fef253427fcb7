//! Configuration for the mock transport.
//!
//! Defines transport settings and a declarative route table that is turned
//! into a [`ResponseNode`] graph.

use crate::context::{SerdeJsonSerializer, TransportOptions};
use crate::matcher::UriPatternMatchingOptions;
use crate::node::ResponseNode;
use crate::pattern::CaseSensitivity;
use crate::routing::Router;
use crate::template::{ResponseTemplate, TemplateBody};
use anyhow::Context;
use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main configuration for the mock transport.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockTransportConfig {
    /// Routes, tried in order
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: TransportSettings,

    /// Response when no route matches
    #[serde(default)]
    pub fallback: Option<ResponseDefinition>,
}

impl MockTransportConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, route) in self.routes.iter().enumerate() {
            route
                .validate()
                .map_err(|e| anyhow::anyhow!("Route {}: {}", i, e))?;
        }
        if let Some(fallback) = &self.fallback {
            fallback
                .validate()
                .map_err(|e| anyhow::anyhow!("Fallback: {}", e))?;
        }
        Ok(())
    }

    /// Build the response graph described by this configuration.
    pub fn build(&self) -> anyhow::Result<ResponseNode> {
        let fallback = match &self.fallback {
            Some(definition) => definition.build()?,
            None => default_fallback()?,
        };

        let mut router = Router::new(fallback);
        for (i, route) in self.routes.iter().enumerate() {
            let node = route.build().with_context(|| format!("Route {}", i))?;
            router = router.route(route.uri.as_str(), node);
        }
        Ok(ResponseNode::routing(router))
    }
}

fn default_fallback() -> anyhow::Result<ResponseNode> {
    Ok(ResponseNode::json(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "not_found",
            "message": "No matching route found"
        }),
    )?)
}

/// A URI pattern and the responses served for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Wildcard pattern matched against the full request URI
    pub uri: String,

    /// Responses served in order; the last one repeats forever
    pub responses: Vec<ResponseDefinition>,
}

impl RouteDefinition {
    /// Validate the route definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.uri.is_empty() {
            anyhow::bail!("Route uri cannot be empty");
        }
        if self.responses.is_empty() {
            anyhow::bail!("Route {} has no responses", self.uri);
        }
        for response in &self.responses {
            response.validate()?;
        }
        Ok(())
    }

    fn build(&self) -> anyhow::Result<ResponseNode> {
        let mut nodes = self
            .responses
            .iter()
            .map(ResponseDefinition::build)
            .collect::<anyhow::Result<Vec<_>>>()?;

        if nodes.len() == 1 {
            if let Some(node) = nodes.pop() {
                return Ok(node);
            }
        }
        Ok(ResponseNode::sequenced(nodes)?)
    }
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Render the body as a template against the request
    #[serde(default)]
    pub template: bool,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,

    /// Failure simulation
    #[serde(default)]
    pub fault: Option<FaultConfig>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: BTreeMap::new(),
            body: None,
            template: false,
            delay: None,
            fault: None,
        }
    }
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        status_code(self.status)?;
        if let Some(fault) = &self.fault {
            if let FaultConfig::Error { status, .. } = fault {
                status_code(*status)?;
            }
            if self.body.is_some() || self.template {
                anyhow::bail!("A '{}' fault cannot also set body or template", fault.name());
            }
            if matches!(fault, FaultConfig::Timeout { .. }) && !self.headers.is_empty() {
                anyhow::bail!("A 'timeout' fault produces no response to carry headers");
            }
        }
        Ok(())
    }

    /// Build the node for this response, wrapped in a delay if one is set.
    pub fn build(&self) -> anyhow::Result<ResponseNode> {
        let node = match &self.fault {
            Some(FaultConfig::Timeout { after_ms }) => {
                ResponseNode::timeout_after(Duration::from_millis(*after_ms))
            }
            Some(FaultConfig::Error { status, message }) => {
                let message = message.clone().unwrap_or_else(|| "Error".to_string());
                self.with_headers(
                    status_code(*status)?,
                    Some(ResponseBody::Text { content: message }),
                )?
            }
            Some(FaultConfig::Empty) => self.with_headers(status_code(self.status)?, None)?,
            None => self.with_headers(status_code(self.status)?, self.body.clone())?,
        };

        Ok(match &self.delay {
            Some(delay) if !delay.is_zero() => ResponseNode::Delayed {
                delay: delay.clone(),
                inner: Box::new(node),
            },
            _ => node,
        })
    }

    /// Build a leaf node for `status` and `body` carrying this definition's
    /// headers and template flag.
    fn with_headers(
        &self,
        status: StatusCode,
        body: Option<ResponseBody>,
    ) -> anyhow::Result<ResponseNode> {
        if self.headers.is_empty() && !self.template {
            match &body {
                None => return Ok(ResponseNode::status(status)),
                Some(ResponseBody::Text { content }) => {
                    return Ok(ResponseNode::text(status, content.clone()))
                }
                Some(ResponseBody::Json { content }) => {
                    return Ok(ResponseNode::json(status, content)?)
                }
                Some(_) => {}
            }
        }

        let mut template = ResponseTemplate::new(status);
        for (name, value) in &self.headers {
            template = template.header(name, value)?;
        }
        if let Some(body) = &body {
            template = template.body(body.to_template_body()?);
        }
        template.render = self.template;
        Ok(ResponseNode::templated(template))
    }
}

fn status_code(status: u16) -> anyhow::Result<StatusCode> {
    if !(100..=599).contains(&status) {
        anyhow::bail!("Invalid status code: {}", status);
    }
    Ok(StatusCode::from_u16(status)?)
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    fn to_template_body(&self) -> anyhow::Result<TemplateBody> {
        Ok(match self {
            ResponseBody::Text { content } => TemplateBody::Text(content.clone()),
            ResponseBody::Json { content } => TemplateBody::Json(content.clone()),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))?;
                TemplateBody::Binary(Bytes::from(bytes))
            }
            ResponseBody::File { path } => {
                let bytes = std::fs::read(path)
                    .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path, e))?;
                TemplateBody::Binary(Bytes::from(bytes))
            }
        })
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            fixed_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            ..Default::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.fixed_ms == 0 && self.min_ms == 0 && self.max_ms == 0
    }

    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> Duration {
        if self.fixed_ms > 0 {
            return Duration::from_millis(self.fixed_ms);
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms));
        }
        Duration::from_millis(self.min_ms)
    }
}

/// Fault injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultConfig {
    /// Fail the request as a client-side timeout
    Timeout {
        /// Wait before timing out, in milliseconds
        #[serde(default)]
        after_ms: u64,
    },
    /// Return an error response
    Error {
        /// HTTP status code
        status: u16,
        /// Error message
        #[serde(default)]
        message: Option<String>,
    },
    /// Return an empty response with the definition's status
    Empty,
}

impl FaultConfig {
    fn name(&self) -> &'static str {
        match self {
            FaultConfig::Timeout { .. } => "timeout",
            FaultConfig::Error { .. } => "error",
            FaultConfig::Empty => "empty",
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSettings {
    /// Match URIs with exact case
    #[serde(default)]
    pub case_sensitive: bool,

    /// Only URIs with a scheme can match a route
    #[serde(default)]
    pub require_scheme: bool,

    /// Only URIs with a host can match a route
    #[serde(default)]
    pub require_host: bool,

    /// Pretty-print JSON response bodies
    #[serde(default)]
    pub pretty_json: bool,

    /// Content type for binary (`base64`/`file`) bodies
    #[serde(default = "default_content_type")]
    pub default_content_type: String,

    /// Log every request
    #[serde(default = "default_true")]
    pub log_requests: bool,

    /// Log failed resolutions
    #[serde(default = "default_true")]
    pub log_failures: bool,
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            require_scheme: false,
            require_host: false,
            pretty_json: false,
            default_content_type: default_content_type(),
            log_requests: true,
            log_failures: true,
        }
    }
}

impl TransportSettings {
    pub fn matching(&self) -> UriPatternMatchingOptions {
        UriPatternMatchingOptions {
            case: if self.case_sensitive {
                CaseSensitivity::Sensitive
            } else {
                CaseSensitivity::Insensitive
            },
            require_scheme: self.require_scheme,
            require_host: self.require_host,
        }
    }

    /// Options threaded through every resolution.
    pub fn options(&self) -> TransportOptions {
        TransportOptions {
            matching: self.matching(),
            serializer: Arc::new(SerdeJsonSerializer {
                pretty: self.pretty_json,
            }),
            default_content_type: self.default_content_type.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResolveContext;
    use crate::request::{OutboundRequest, RequestLog};
    use std::io::Write;
    use tokio_util::sync::CancellationToken;

    async fn resolve(node: &ResponseNode, uri: &str) -> crate::Result<Arc<crate::MockResponse>> {
        resolve_with(node, uri, TransportOptions::default()).await
    }

    async fn resolve_with(
        node: &ResponseNode,
        uri: &str,
        options: TransportOptions,
    ) -> crate::Result<Arc<crate::MockResponse>> {
        let ctx = ResolveContext::new(
            RequestLog::new().append(OutboundRequest::get(uri)),
            Arc::new(options),
            CancellationToken::new(),
        );
        node.resolve(&ctx).await
    }

    #[test]
    fn test_parse_simple_route() {
        let yaml = r#"
routes:
  - name: hello-world
    uri: "*/hello"
    responses:
      - status: 200
        body:
          type: text
          content: "Hello, World!"
"#;
        let config = MockTransportConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].name.as_deref(), Some("hello-world"));
    }

    #[test]
    fn test_parse_settings() {
        let yaml = r#"
settings:
  case_sensitive: true
  require_host: true
  pretty_json: true
"#;
        let config = MockTransportConfig::from_yaml(yaml).unwrap();
        let matching = config.settings.matching();
        assert_eq!(matching.case, CaseSensitivity::Sensitive);
        assert!(matching.require_host);
        assert!(!matching.require_scheme);
        assert!(config.settings.log_requests);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
settings:
  verbose: true
"#;
        assert!(MockTransportConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_parse_fault_config() {
        let yaml = r#"
routes:
  - uri: "*/error"
    responses:
      - fault:
          type: error
          status: 500
          message: "Internal Server Error"
      - fault:
          type: timeout
          after_ms: 250
"#;
        let config = MockTransportConfig::from_yaml(yaml).unwrap();
        match &config.routes[0].responses[0].fault {
            Some(FaultConfig::Error { status, message }) => {
                assert_eq!(*status, 500);
                assert_eq!(message.as_deref(), Some("Internal Server Error"));
            }
            _ => panic!("Expected Error fault"),
        }
        assert!(matches!(
            config.routes[0].responses[1].fault,
            Some(FaultConfig::Timeout { after_ms: 250 })
        ));
    }

    #[test]
    fn test_validation_errors() {
        let empty_uri = r#"
routes:
  - uri: ""
    responses:
      - status: 200
"#;
        assert!(MockTransportConfig::from_yaml(empty_uri).is_err());

        let no_responses = r#"
routes:
  - uri: "*"
    responses: []
"#;
        assert!(MockTransportConfig::from_yaml(no_responses).is_err());

        let bad_status = r#"
routes:
  - uri: "*"
    responses:
      - status: 999
"#;
        let err = MockTransportConfig::from_yaml(bad_status).unwrap_err();
        assert!(err.to_string().contains("Route 0"));
    }

    #[test]
    fn test_delay_calculation() {
        let fixed = DelayConfig {
            fixed_ms: 100,
            ..Default::default()
        };
        assert_eq!(fixed.calculate(), Duration::from_millis(100));

        let range = DelayConfig {
            fixed_ms: 0,
            min_ms: 50,
            max_ms: 150,
        };
        let delay = range.calculate();
        assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(150));

        assert!(DelayConfig::default().is_zero());
        assert_eq!(
            DelayConfig::fixed(Duration::from_secs(2)).calculate(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_build_picks_node_kinds() {
        let plain = ResponseDefinition::default();
        assert_eq!(plain.build().unwrap().kind(), "status");

        let text = ResponseDefinition {
            body: Some(ResponseBody::Text {
                content: "hi".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(text.build().unwrap().kind(), "text");

        let with_headers = ResponseDefinition {
            headers: BTreeMap::from([("x-mock".to_string(), "1".to_string())]),
            ..text.clone()
        };
        assert_eq!(with_headers.build().unwrap().kind(), "templated");

        let delayed = ResponseDefinition {
            delay: Some(DelayConfig {
                fixed_ms: 5,
                ..Default::default()
            }),
            ..text
        };
        assert_eq!(delayed.build().unwrap().kind(), "delayed");

        let timeout = ResponseDefinition {
            fault: Some(FaultConfig::Timeout { after_ms: 0 }),
            ..Default::default()
        };
        assert_eq!(timeout.build().unwrap().kind(), "timeout");
    }

    #[tokio::test]
    async fn test_build_graph_resolves() {
        let yaml = r#"
routes:
  - uri: "*/users*"
    responses:
      - status: 201
        body:
          type: json
          content:
            id: 1
      - status: 200
        headers:
          x-mock: "yes"
        template: true
        body:
          type: text
          content: "{{method}} {{path}}"
fallback:
  status: 418
"#;
        let node = MockTransportConfig::from_yaml(yaml).unwrap().build().unwrap();

        let first = resolve(&node, "http://localhost/users").await.unwrap();
        assert_eq!(first.status, StatusCode::CREATED);
        assert_eq!(first.body_text(), r#"{"id":1}"#);

        let second = resolve(&node, "http://localhost/users").await.unwrap();
        assert_eq!(second.body_text(), "GET /users");
        assert_eq!(second.headers.get("x-mock").unwrap(), "yes");

        let other = resolve(&node, "http://localhost/other").await.unwrap();
        assert_eq!(other.status, StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_pretty_json_applies_with_headers() {
        let yaml = r#"
settings:
  pretty_json: true
routes:
  - uri: "*/plain"
    responses:
      - body:
          type: json
          content:
            id: 1
  - uri: "*/headers"
    responses:
      - headers:
          x-mock: "yes"
        body:
          type: json
          content:
            id: 1
"#;
        let config = MockTransportConfig::from_yaml(yaml).unwrap();
        let node = config.build().unwrap();

        let plain = resolve_with(&node, "http://localhost/plain", config.settings.options())
            .await
            .unwrap();
        let with_headers =
            resolve_with(&node, "http://localhost/headers", config.settings.options())
                .await
                .unwrap();
        assert_eq!(plain.body_text(), "{\n  \"id\": 1\n}");
        assert_eq!(with_headers.body_text(), plain.body_text());
        assert_eq!(with_headers.content_type(), Some("application/json"));
        assert_eq!(with_headers.headers.get("x-mock").unwrap(), "yes");
    }

    #[tokio::test]
    async fn test_fault_keeps_headers_and_status() {
        let yaml = r#"
routes:
  - uri: "*/unavailable"
    responses:
      - headers:
          retry-after: "5"
        fault:
          type: error
          status: 503
          message: "Service Unavailable"
  - uri: "*/empty"
    responses:
      - status: 204
        headers:
          x-mock: "yes"
        fault:
          type: empty
"#;
        let node = MockTransportConfig::from_yaml(yaml).unwrap().build().unwrap();

        let unavailable = resolve(&node, "http://localhost/unavailable").await.unwrap();
        assert_eq!(unavailable.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.headers.get("retry-after").unwrap(), "5");
        assert_eq!(unavailable.body_text(), "Service Unavailable");
        assert_eq!(unavailable.content_type(), Some("text/plain"));

        let empty = resolve(&node, "http://localhost/empty").await.unwrap();
        assert_eq!(empty.status, StatusCode::NO_CONTENT);
        assert_eq!(empty.headers.get("x-mock").unwrap(), "yes");
        assert!(empty.body.is_empty());
    }

    #[test]
    fn test_fault_rejects_conflicting_fields() {
        let error_with_body = r#"
routes:
  - uri: "*"
    responses:
      - body:
          type: text
          content: "ignored"
        fault:
          type: error
          status: 500
"#;
        let err = MockTransportConfig::from_yaml(error_with_body).unwrap_err();
        assert!(err.to_string().contains("'error' fault"));

        let timeout_with_headers = r#"
routes:
  - uri: "*"
    responses:
      - headers:
          retry-after: "5"
        fault:
          type: timeout
"#;
        assert!(MockTransportConfig::from_yaml(timeout_with_headers).is_err());

        let templated_empty = r#"
fallback:
  template: true
  fault:
    type: empty
"#;
        let err = MockTransportConfig::from_yaml(templated_empty).unwrap_err();
        assert!(err.to_string().contains("Fallback"));
    }

    #[tokio::test]
    async fn test_default_fallback() {
        let node = MockTransportConfig::default().build().unwrap();
        let response = resolve(&node, "http://localhost/anything").await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body_text().contains("not_found"));
    }

    #[tokio::test]
    async fn test_base64_and_file_bodies() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from disk").unwrap();

        let yaml = format!(
            r#"
routes:
  - uri: "*/b64"
    responses:
      - body:
          type: base64
          content: aGVsbG8=
  - uri: "*/file"
    responses:
      - body:
          type: file
          path: "{}"
"#,
            file.path().display()
        );
        let node = MockTransportConfig::from_yaml(&yaml).unwrap().build().unwrap();

        let b64 = resolve(&node, "http://localhost/b64").await.unwrap();
        assert_eq!(b64.body_text(), "hello");
        assert_eq!(b64.content_type(), Some("application/octet-stream"));

        let disk = resolve(&node, "http://localhost/file").await.unwrap();
        assert_eq!(disk.body_text(), "from disk");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "routes:\n  - uri: \"*\"\n    responses:\n      - status: 204").unwrap();

        let config = MockTransportConfig::from_file(file.path()).unwrap();
        assert_eq!(config.routes[0].responses[0].status, 204);
        assert!(MockTransportConfig::from_file(Path::new("/nonexistent/mock.yaml")).is_err());
    }

    #[test]
    fn test_settings_options() {
        let settings = TransportSettings {
            pretty_json: true,
            default_content_type: "text/plain".to_string(),
            ..Default::default()
        };
        let options = settings.options();
        assert_eq!(options.default_content_type, "text/plain");
        let body = options
            .serializer
            .serialize(&serde_json::json!({"a": 1}))
            .unwrap();
        assert!(body.contains(&b'\n'));
    }
}
