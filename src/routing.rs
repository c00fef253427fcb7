//! URI-based routing between response nodes.

use crate::matcher::{UriPattern, UriPatternMatchingOptions};
use crate::node::ResponseNode;
use crate::request::RequestRecord;
use std::fmt;

/// Ordered map from URI pattern to node, plus a fallback.
///
/// Routes are tried in insertion order and the first match wins; patterns
/// may overlap. The fallback handles requests without a URI and requests no
/// route matches.
pub struct Router {
    routes: Vec<(UriPattern, ResponseNode)>,
    fallback: Box<ResponseNode>,
}

impl Router {
    pub fn new(fallback: ResponseNode) -> Self {
        Self {
            routes: Vec::new(),
            fallback: Box::new(fallback),
        }
    }

    /// Append a route.
    pub fn route(mut self, pattern: impl Into<UriPattern>, node: ResponseNode) -> Self {
        self.routes.push((pattern.into(), node));
        self
    }

    /// Node responsible for `request`.
    pub fn select(
        &self,
        request: &RequestRecord,
        options: &UriPatternMatchingOptions,
    ) -> &ResponseNode {
        let Some(uri) = request.uri() else {
            return &self.fallback;
        };

        self.routes
            .iter()
            .find(|(pattern, _)| pattern.is_match(uri, options))
            .map(|(_, node)| node)
            .unwrap_or(&self.fallback)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route patterns in match order.
    pub fn patterns(&self) -> impl Iterator<Item = &UriPattern> {
        self.routes.iter().map(|(pattern, _)| pattern)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field(
                "routes",
                &self.routes.iter().map(|(p, n)| (p.as_str(), n)).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback)
            .finish()
    }
}
