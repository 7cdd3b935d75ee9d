//! Cluster Module
//!
//! Who is connected, and which acknowledgements are still owed.
//!
//! ## Responsibilities
//! - Track live storage nodes by their client-facing port
//! - Route control lines to a node's connection
//! - Deliver node acks to the barrier waiting on them, with deadlines

mod membership;
mod acks;

pub use membership::{Membership, NodeLink};
pub use acks::{AckKind, AckRegistry, AckWaiter};

/// A storage node's identity: the port it serves clients on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u16);

impl NodeId {
    pub fn port(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
