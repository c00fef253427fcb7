//! Response nodes.
//!
//! A [`ResponseNode`] describes how to produce a response for a request.
//! Leaf nodes build the response themselves; decorators own exactly one
//! inner node and delegate to it; dispatch nodes pick another node per
//! request. Graphs are trees: every node is owned by exactly one parent.

use crate::config::DelayConfig;
use crate::context::{JsonSerializer, ResolveContext};
use crate::error::{Result, TransportError};
use crate::response::MockResponse;
use crate::routing::Router;
use crate::sequence::Sequence;
use crate::template::ResponseTemplate;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::StatusCode;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Picks the node to resolve for a request. Called on every resolution.
pub type Selector = Arc<dyn Fn(&ResolveContext) -> Arc<ResponseNode> + Send + Sync>;

/// Mutates a resolved response.
pub type Configure = Box<dyn Fn(&mut MockResponse) + Send + Sync>;

/// How to produce a response.
pub enum ResponseNode {
    /// Returns the same response instance on every call
    Fixed(Arc<MockResponse>),
    /// Builds a fresh response from a template on every call
    Templated(ResponseTemplate),
    /// Serializes a captured payload on every call
    Json {
        status: StatusCode,
        payload: serde_json::Value,
        /// Overrides the ambient serializer
        serializer: Option<Arc<dyn JsonSerializer>>,
    },
    /// Empty response with a status code
    StatusOnly(StatusCode),
    /// Text response
    TextBody {
        status: StatusCode,
        text: String,
        content_type: String,
    },
    /// Waits, then delegates. The wait observes cancellation.
    Delayed {
        delay: DelayConfig,
        inner: Box<ResponseNode>,
    },
    /// Never produces a response: fires the cancellation signal itself and
    /// fails, optionally after waiting
    TimeoutSimulating { after: Duration },
    /// Delegates, then applies `configure` to the result once
    Configured {
        inner: Box<ResponseNode>,
        configure: Configure,
    },
    /// Steps through a list, holding on the last entry
    Sequenced(Sequence),
    /// Dispatches on the request URI
    Routing(Router),
    /// Dispatches through a user-supplied selector
    Selectable(Selector),
}

impl ResponseNode {
    pub fn fixed(response: MockResponse) -> Self {
        Self::Fixed(Arc::new(response))
    }

    pub fn templated(template: ResponseTemplate) -> Self {
        Self::Templated(template)
    }

    /// JSON response using the ambient serializer.
    pub fn json<T: Serialize>(status: StatusCode, payload: &T) -> Result<Self> {
        Ok(Self::Json {
            status,
            payload: serde_json::to_value(payload)?,
            serializer: None,
        })
    }

    /// JSON response with its own serializer.
    pub fn json_with<T: Serialize>(
        status: StatusCode,
        payload: &T,
        serializer: Arc<dyn JsonSerializer>,
    ) -> Result<Self> {
        Ok(Self::Json {
            status,
            payload: serde_json::to_value(payload)?,
            serializer: Some(serializer),
        })
    }

    pub fn status(status: StatusCode) -> Self {
        Self::StatusOnly(status)
    }

    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::TextBody {
            status,
            text: text.into(),
            content_type: "text/plain".to_string(),
        }
    }

    pub fn delayed(delay: Duration, inner: ResponseNode) -> Self {
        Self::Delayed {
            delay: DelayConfig::fixed(delay),
            inner: Box::new(inner),
        }
    }

    pub fn timeout() -> Self {
        Self::TimeoutSimulating {
            after: Duration::ZERO,
        }
    }

    pub fn timeout_after(after: Duration) -> Self {
        Self::TimeoutSimulating { after }
    }

    pub fn configured<F>(inner: ResponseNode, configure: F) -> Self
    where
        F: Fn(&mut MockResponse) + Send + Sync + 'static,
    {
        Self::Configured {
            inner: Box::new(inner),
            configure: Box::new(configure),
        }
    }

    /// Fails with an argument error when `nodes` is empty.
    pub fn sequenced(nodes: Vec<ResponseNode>) -> Result<Self> {
        Sequence::new(nodes).map(Self::Sequenced)
    }

    pub fn routing(router: Router) -> Self {
        Self::Routing(router)
    }

    pub fn selectable<F>(selector: F) -> Self
    where
        F: Fn(&ResolveContext) -> Arc<ResponseNode> + Send + Sync + 'static,
    {
        Self::Selectable(Arc::new(selector))
    }

    /// Variant name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fixed(_) => "fixed",
            Self::Templated(_) => "templated",
            Self::Json { .. } => "json",
            Self::StatusOnly(_) => "status",
            Self::TextBody { .. } => "text",
            Self::Delayed { .. } => "delayed",
            Self::TimeoutSimulating { .. } => "timeout",
            Self::Configured { .. } => "configured",
            Self::Sequenced(_) => "sequenced",
            Self::Routing(_) => "routing",
            Self::Selectable(_) => "selectable",
        }
    }

    /// Produce a response for the request in `ctx`.
    ///
    /// Any failure aborts the whole resolution. Cancellation surfaces as
    /// [`TransportError::Canceled`], a simulated timeout as
    /// [`TransportError::TimedOut`].
    pub fn resolve<'a>(
        &'a self,
        ctx: &'a ResolveContext,
    ) -> BoxFuture<'a, Result<Arc<MockResponse>>> {
        Box::pin(async move {
            match self {
                Self::Fixed(response) => Ok(Arc::clone(response)),

                Self::Templated(template) => template
                    .instantiate(ctx.skeleton(), ctx.request(), ctx.options())
                    .map(Arc::new),

                Self::Json {
                    status,
                    payload,
                    serializer,
                } => {
                    let serializer = serializer
                        .as_deref()
                        .unwrap_or_else(|| ctx.options().serializer.as_ref());
                    let mut response = ctx.skeleton();
                    response.status = *status;
                    response.body = Bytes::from(serializer.serialize(payload)?);
                    response.set_header("content-type", serializer.content_type());
                    Ok(Arc::new(response))
                }

                Self::StatusOnly(status) => {
                    let mut response = ctx.skeleton();
                    response.status = *status;
                    Ok(Arc::new(response))
                }

                Self::TextBody {
                    status,
                    text,
                    content_type,
                } => {
                    let mut response = ctx.skeleton();
                    response.status = *status;
                    response.body = Bytes::from(text.clone());
                    response.set_header("content-type", content_type);
                    Ok(Arc::new(response))
                }

                Self::Delayed { delay, inner } => {
                    let duration = delay.calculate();
                    debug!(
                        request = ctx.request().sequence(),
                        delay_ms = duration.as_millis() as u64,
                        "Delaying response"
                    );
                    wait(ctx, duration).await?;
                    inner.resolve(ctx).await
                }

                Self::TimeoutSimulating { after } => {
                    if !after.is_zero() {
                        wait(ctx, *after).await?;
                    }
                    debug!(
                        request = ctx.request().sequence(),
                        "Simulating client timeout"
                    );
                    ctx.cancellation().cancel();
                    Err(TransportError::TimedOut)
                }

                Self::Configured { inner, configure } => {
                    let mut response = inner.resolve(ctx).await?;
                    configure(Arc::make_mut(&mut response));
                    Ok(response)
                }

                Self::Sequenced(sequence) => {
                    let node = sequence.advance();
                    node.resolve(ctx).await
                }

                Self::Routing(router) => {
                    router
                        .select(ctx.request(), &ctx.options().matching)
                        .resolve(ctx)
                        .await
                }

                Self::Selectable(selector) => {
                    let node = selector(ctx);
                    node.resolve(ctx).await
                }
            }
        })
    }
}

/// Sleep unless the resolution is canceled first.
async fn wait(ctx: &ResolveContext, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return if ctx.cancellation().is_cancelled() {
            Err(TransportError::Canceled)
        } else {
            Ok(())
        };
    }

    tokio::select! {
        biased;
        _ = ctx.cancellation().cancelled() => Err(TransportError::Canceled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

impl fmt::Debug for ResponseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(response) => f.debug_tuple("Fixed").field(&response.status).finish(),
            Self::StatusOnly(status) => f.debug_tuple("StatusOnly").field(status).finish(),
            Self::Delayed { delay, inner } => f
                .debug_struct("Delayed")
                .field("delay", delay)
                .field("inner", inner)
                .finish(),
            Self::Configured { inner, .. } => f
                .debug_struct("Configured")
                .field("inner", inner)
                .finish_non_exhaustive(),
            Self::Sequenced(sequence) => f.debug_tuple("Sequenced").field(sequence).finish(),
            Self::Routing(router) => f.debug_tuple("Routing").field(router).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SerdeJsonSerializer, TransportOptions};
    use crate::request::{OutboundRequest, RequestLog};
    use tokio_test::{assert_err, assert_ok};
    use tokio_util::sync::CancellationToken;

    fn context_for(request: OutboundRequest) -> ResolveContext {
        let record = RequestLog::new().append(request);
        ResolveContext::new(
            record,
            Arc::new(TransportOptions::default()),
            CancellationToken::new(),
        )
    }

    fn context() -> ResolveContext {
        context_for(OutboundRequest::get("http://localhost/"))
    }

    #[tokio::test]
    async fn test_fixed_returns_same_instance() {
        let node = ResponseNode::fixed(MockResponse::new(StatusCode::OK).with_body("same"));
        let ctx = context();

        let first = node.resolve(&ctx).await.unwrap();
        for _ in 0..10 {
            let next = node.resolve(&ctx).await.unwrap();
            assert!(Arc::ptr_eq(&first, &next));
        }
    }

    #[tokio::test]
    async fn test_leaf_nodes_build_fresh_responses() {
        let node = ResponseNode::text(StatusCode::OK, "hello");
        let ctx = context();

        let first = node.resolve(&ctx).await.unwrap();
        let second = node.resolve(&ctx).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.body_text(), "hello");
        assert_eq!(first.content_type(), Some("text/plain"));
        assert!(first.request().is_none());
    }

    #[tokio::test]
    async fn test_status_only() {
        let response = ResponseNode::status(StatusCode::NOT_FOUND)
            .resolve(&context())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_json_uses_ambient_serializer() {
        let node = ResponseNode::json(StatusCode::CREATED, &serde_json::json!({"id": 7})).unwrap();
        let response = node.resolve(&context()).await.unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body_text(), r#"{"id":7}"#);
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_json_serializer_override() {
        let node = ResponseNode::json_with(
            StatusCode::OK,
            &serde_json::json!({"id": 7}),
            Arc::new(SerdeJsonSerializer { pretty: true }),
        )
        .unwrap();
        let response = node.resolve(&context()).await.unwrap();
        assert!(response.body_text().contains('\n'));
    }

    #[tokio::test]
    async fn test_leaf_builds_on_skeleton() {
        let ctx = context();
        ctx.update_skeleton(|r| r.set_header("x-skeleton", "1"));

        let response = ResponseNode::status(StatusCode::OK)
            .resolve(&ctx)
            .await
            .unwrap();
        assert_eq!(response.headers.get("x-skeleton").unwrap(), "1");
    }

    #[tokio::test]
    async fn test_delayed_delegates() {
        let node = ResponseNode::delayed(
            Duration::from_millis(10),
            ResponseNode::text(StatusCode::OK, "late"),
        );
        let started = std::time::Instant::now();
        let response = node.resolve(&context()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(response.body_text(), "late");
    }

    #[tokio::test]
    async fn test_delayed_observes_cancellation() {
        let node = ResponseNode::delayed(
            Duration::from_secs(30),
            ResponseNode::status(StatusCode::OK),
        );
        let ctx = context();
        let token = ctx.cancellation().clone();

        let canceler = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = assert_err!(node.resolve(&ctx).await);
        assert!(matches!(err, TransportError::Canceled));
        canceler.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_fires_cancellation() {
        let node = ResponseNode::timeout();
        let ctx = context();

        for _ in 0..3 {
            let err = assert_err!(node.resolve(&ctx).await);
            assert!(matches!(err, TransportError::TimedOut));
            assert!(err.is_cancellation());
        }
        assert!(ctx.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_after_wait() {
        let node = ResponseNode::timeout_after(Duration::from_millis(10));
        let ctx = context();
        let started = std::time::Instant::now();

        let err = assert_err!(node.resolve(&ctx).await);
        assert!(matches!(err, TransportError::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_timeout_inside_delay_is_never_delegated_past() {
        let node = ResponseNode::delayed(Duration::from_millis(1), ResponseNode::timeout());
        let err = assert_err!(node.resolve(&context()).await);
        assert!(matches!(err, TransportError::TimedOut));
    }

    #[tokio::test]
    async fn test_configured_applies_once() {
        let node = ResponseNode::configured(ResponseNode::text(StatusCode::OK, "a"), |r| {
            let mut body = r.body.to_vec();
            body.push(b'!');
            r.body = Bytes::from(body);
        });

        let response = node.resolve(&context()).await.unwrap();
        assert_eq!(response.body_text(), "a!");
        let response = node.resolve(&context()).await.unwrap();
        assert_eq!(response.body_text(), "a!");
    }

    #[tokio::test]
    async fn test_configured_can_attach_request() {
        let other = RequestLog::new().append(OutboundRequest::get("http://localhost/other"));
        let node = ResponseNode::configured(ResponseNode::status(StatusCode::OK), move |r| {
            r.set_request(Arc::clone(&other));
        });

        let response = node.resolve(&context()).await.unwrap();
        assert_eq!(
            response.request().unwrap().uri().unwrap().path(),
            "/other"
        );
    }

    #[tokio::test]
    async fn test_selectable_reevaluates_every_call() {
        let ok = Arc::new(ResponseNode::status(StatusCode::OK));
        let teapot = Arc::new(ResponseNode::status(StatusCode::IM_A_TEAPOT));
        let node = ResponseNode::selectable(move |ctx| {
            if ctx.request().header("x-brew").is_some() {
                Arc::clone(&teapot)
            } else {
                Arc::clone(&ok)
            }
        });

        let plain = context();
        let brew = context_for(OutboundRequest::get("http://localhost/").with_header("x-brew", "1"));

        assert_eq!(node.resolve(&plain).await.unwrap().status, StatusCode::OK);
        assert_eq!(
            node.resolve(&brew).await.unwrap().status,
            StatusCode::IM_A_TEAPOT
        );
        assert_eq!(node.resolve(&plain).await.unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sequenced_node() {
        let node = ResponseNode::sequenced(vec![
            ResponseNode::status(StatusCode::ACCEPTED),
            ResponseNode::status(StatusCode::OK),
        ])
        .unwrap();
        let ctx = context();

        let statuses: Vec<_> = futures::future::join_all((0..4).map(|_| node.resolve(&ctx)))
            .await
            .into_iter()
            .map(|r| r.unwrap().status)
            .collect();
        assert_eq!(statuses.iter().filter(|s| **s == StatusCode::ACCEPTED).count(), 1);
        assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 3);
    }

    #[tokio::test]
    async fn test_empty_sequence_rejected() {
        let err = assert_err!(ResponseNode::sequenced(Vec::new()));
        assert!(matches!(
            err,
            TransportError::InvalidArgument {
                param: "responses",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fault_in_inner_node_aborts_resolution() {
        let node = ResponseNode::configured(ResponseNode::timeout(), |r| {
            r.status = StatusCode::OK;
        });
        assert_err!(node.resolve(&context()).await);

        let node = ResponseNode::configured(ResponseNode::status(StatusCode::OK), |_| {});
        assert_ok!(node.resolve(&context()).await);
    }
}
