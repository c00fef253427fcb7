//! Sequenced responses.

use crate::error::{Result, TransportError};
use crate::node::ResponseNode;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Ordered list of nodes consumed one per resolution. Once only the final
/// node remains it is used for every later resolution.
pub struct Sequence {
    pending: Mutex<VecDeque<ResponseNode>>,
    last: Arc<ResponseNode>,
}

impl Sequence {
    /// Fails when `nodes` is empty.
    pub fn new(mut nodes: Vec<ResponseNode>) -> Result<Self> {
        let last = nodes
            .pop()
            .ok_or_else(|| TransportError::invalid_argument("responses", "sequence is empty"))?;

        Ok(Self {
            pending: Mutex::new(nodes.into()),
            last: Arc::new(last),
        })
    }

    /// Take the next node, or the final one once the rest are used up.
    ///
    /// The dequeue happens under a single lock, so concurrent callers never
    /// receive the same non-final node twice and never skip one.
    pub(crate) fn advance(&self) -> Arc<ResponseNode> {
        let next = self.pending.lock().pop_front();
        match next {
            Some(node) => {
                debug!(remaining = self.remaining(), "Advancing response sequence");
                Arc::new(node)
            }
            None => Arc::clone(&self.last),
        }
    }

    /// Nodes still queued ahead of the final one.
    pub fn remaining(&self) -> usize {
        self.pending.lock().len()
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("remaining", &self.remaining())
            .field("last", &self.last)
            .finish()
    }
}
