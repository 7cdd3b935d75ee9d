//! Membership Registry
//!
//! The set of storage nodes currently connected to the controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::network::{ConnId, MessageSink};
use crate::protocol::Message;
use super::NodeId;

/// A live node and the control connection it joined on
#[derive(Clone)]
pub struct NodeLink {
    pub node: NodeId,
    pub conn: ConnId,
    pub sink: Arc<dyn MessageSink>,
}

/// Connected storage nodes, keyed by listening port
pub struct Membership {
    nodes: RwLock<BTreeMap<NodeId, NodeLink>>,
}

impl Membership {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a node. Refused if another connection already owns the port.
    pub fn join(&self, node: NodeId, conn: ConnId, sink: Arc<dyn MessageSink>) -> bool {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node) {
            return false;
        }
        nodes.insert(node, NodeLink { node, conn, sink });
        true
    }

    /// Unregister a node, but only if `conn` is the connection it joined on
    pub fn leave(&self, node: NodeId, conn: ConnId) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get(&node) {
            Some(link) if link.conn == conn => {
                nodes.remove(&node);
                true
            }
            _ => false,
        }
    }

    /// Live nodes in ascending port order
    pub fn live_nodes(&self) -> Vec<NodeId> {
        self.nodes.read().keys().copied().collect()
    }

    pub fn live_count(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.read().contains_key(&node)
    }

    /// Whether `node` is live and joined on `conn`
    pub fn is_member(&self, node: NodeId, conn: ConnId) -> bool {
        self.nodes
            .read()
            .get(&node)
            .map_or(false, |link| link.conn == conn)
    }

    /// Send a control line to a live node
    pub fn send(&self, node: NodeId, message: &Message) -> Result<()> {
        let sink = match self.nodes.read().get(&node) {
            Some(link) => Arc::clone(&link.sink),
            None => return Err(StoreError::NodeUnavailable(node.to_string())),
        };
        // Lock released before blocking on the socket
        sink.send(message)
    }
}

impl Default for Membership {
    fn default() -> Self {
        Self::new()
    }
}
