//! Response templates.
//!
//! A [`ResponseTemplate`] is instantiated into a fresh [`MockResponse`] for
//! every request. Template bodies may use Handlebars syntax rendered against
//! the captured request.

use crate::context::TransportOptions;
use crate::error::{Result, TransportError};
use crate::request::RequestRecord;
use crate::response::MockResponse;
use bytes::Bytes;
use handlebars::Handlebars;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use std::collections::HashMap;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Request method
    pub method: String,
    /// Full request URI
    pub uri: String,
    /// Request path
    pub path: String,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request headers (first value of each)
    pub headers: HashMap<String, String>,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Request body as JSON (if parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<serde_json::Value>,
}

impl TemplateContext {
    pub fn from_request(request: &RequestRecord) -> Self {
        let body = std::str::from_utf8(request.body())
            .ok()
            .filter(|s| !s.is_empty())
            .map(String::from);
        let json = body.as_ref().and_then(|s| serde_json::from_str(s).ok());

        let mut headers = HashMap::new();
        for (name, value) in request.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        Self {
            method: request.method().to_string(),
            uri: request.uri().map(ToString::to_string).unwrap_or_default(),
            path: request
                .uri()
                .map(|u| u.path().to_string())
                .unwrap_or_default(),
            query: parse_query_string(request.query()),
            headers,
            body,
            json,
        }
    }
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("uuid", Box::new(uuid_helper));
        handlebars.register_helper("now", Box::new(now_helper));
        handlebars.register_helper("random", Box::new(random_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Response bodies are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against a captured request.
    pub fn render(
        &self,
        template: &str,
        request: &RequestRecord,
    ) -> Result<String, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.handlebars.render_template(template, &ctx)
    }

    /// Render every string inside a JSON value.
    pub fn render_json(
        &self,
        json: &serde_json::Value,
        request: &RequestRecord,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        let ctx = TemplateContext::from_request(request);
        self.render_json_value(json, &ctx)
    }

    fn render_json_value(
        &self,
        value: &serde_json::Value,
        ctx: &TemplateContext,
    ) -> Result<serde_json::Value, handlebars::RenderError> {
        match value {
            serde_json::Value::String(s) if s.contains("{{") => Ok(serde_json::Value::String(
                self.handlebars.render_template(s, ctx)?,
            )),
            serde_json::Value::Array(arr) => arr
                .iter()
                .map(|v| self.render_json_value(v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            serde_json::Value::Object(obj) => {
                let mut rendered = serde_json::Map::new();
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.render_json_value(v, ctx)?);
                }
                Ok(serde_json::Value::Object(rendered))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of a [`ResponseTemplate`].
#[derive(Debug, Clone)]
pub enum TemplateBody {
    Text(String),
    Json(serde_json::Value),
    Binary(Bytes),
}

/// Blueprint for building a fresh response per request.
#[derive(Debug, Clone)]
pub struct ResponseTemplate {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<TemplateBody>,
    /// Render text and JSON bodies with the template engine
    pub render: bool,
}

impl ResponseTemplate {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
            render: false,
        }
    }

    /// Add a header, rejecting invalid names or values.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::invalid_argument("name", e.to_string()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::invalid_argument("value", e.to_string()))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn body(mut self, body: TemplateBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn rendered(mut self) -> Self {
        self.render = true;
        self
    }

    /// Build a response from `skeleton` for the given request.
    ///
    /// JSON bodies go through the ambient serializer. Binary bodies carry
    /// the configured default content type. A template without a body adds
    /// no content type of its own.
    pub fn instantiate(
        &self,
        mut skeleton: MockResponse,
        request: &RequestRecord,
        options: &TransportOptions,
    ) -> Result<MockResponse> {
        skeleton.status = self.status;

        if let Some(body) = &self.body {
            let (bytes, content_type) = match body {
                TemplateBody::Text(text) if self.render => (
                    Bytes::from(options.templates.render(text, request)?),
                    "text/plain",
                ),
                TemplateBody::Text(text) => (Bytes::from(text.clone()), "text/plain"),
                TemplateBody::Json(value) => {
                    let serializer = options.serializer.as_ref();
                    let bytes = if self.render {
                        serializer.serialize(&options.templates.render_json(value, request)?)?
                    } else {
                        serializer.serialize(value)?
                    };
                    (Bytes::from(bytes), serializer.content_type())
                }
                TemplateBody::Binary(bytes) => {
                    (bytes.clone(), options.default_content_type.as_str())
                }
            };
            skeleton.body = bytes;
            skeleton.set_header("content-type", content_type);
        }

        for name in self.headers.keys() {
            skeleton.headers.remove(name);
        }
        for (name, value) in &self.headers {
            skeleton.headers.append(name.clone(), value.clone());
        }

        Ok(skeleton)
    }
}

/// Parse a query string into key-value pairs.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(
            crate::matcher::percent_decode(key).into_owned(),
            crate::matcher::percent_decode(value).into_owned(),
        );
    }

    params
}

// Custom Handlebars helpers

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    match h.param(0).map(|v| v.value()) {
        Some(serde_json::Value::String(s)) => out.write(s)?,
        Some(value) => out.write(&value.to_string())?,
        None => {}
    }
    Ok(())
}

fn uuid_helper(
    _: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let uuid = format!(
        "{:08x}-{:04x}-4{:03x}-{:04x}-{:012x}",
        rng.gen::<u32>(),
        rng.gen::<u16>(),
        rng.gen::<u16>() & 0x0fff,
        (rng.gen::<u16>() & 0x3fff) | 0x8000,
        rng.gen::<u64>() & 0xffff_ffff_ffff,
    );
    out.write(&uuid)?;
    Ok(())
}

fn now_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let format = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");

    out.write(&chrono::Utc::now().format(format).to_string())?;
    Ok(())
}

fn random_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    use rand::Rng;

    let min = h.param(0).and_then(|v| v.value().as_i64()).unwrap_or(0);
    let max = h.param(1).and_then(|v| v.value().as_i64()).unwrap_or(100);

    let value = if max > min {
        rand::thread_rng().gen_range(min..=max)
    } else {
        min
    };
    out.write(&value.to_string())?;
    Ok(())
}

fn default_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).map(|v| v.value());
    let default = h.param(1).and_then(|v| v.value().as_str()).unwrap_or("");

    match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => out.write(s)?,
        Some(v) if !v.is_null() && !v.is_string() => out.write(&v.to_string())?,
        _ => out.write(default)?,
    }
    Ok(())
}

fn upper_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_uppercase())?;
    Ok(())
}

fn lower_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let value = h.param(0).and_then(|v| v.value().as_str()).unwrap_or("");
    out.write(&value.to_lowercase())?;
    Ok(())
}
