//! Controller Module
//!
//! The coordinating process: owns the catalog and drives the store,
//! load, remove and list protocols.
//!
//! ## Architecture
//! ```text
//!   conn thread ─┐
//!   conn thread ─┼──▶ inbound queue ──▶ dispatch thread ──▶ ProtocolEngine
//!   conn thread ─┘                                            │
//!        │ STORE_ACK / REMOVE_ACK                              ▼
//!        └──────────────────────▶ AckRegistry ◀──── barrier tasks (OperationPool)
//! ```

mod engine;
mod placement;
mod quorum;
mod server;
mod state;
mod tasks;

pub use engine::{LoadCursor, ProtocolEngine};
pub use placement::select_candidates;
pub use quorum::await_all;
pub use server::ControllerServer;
pub use state::{ClientRef, ClusterState};
pub use tasks::OperationPool;

use std::sync::Arc;

use crate::cluster::NodeId;
use crate::network::{ConnId, MessageSink};
use crate::protocol::Message;

/// An event for the dispatch thread
pub enum Inbound {
    /// A control line from a client connection
    Request { client: ClientRef, message: Message },

    /// A connection introduced itself with `JOIN <port>`
    NodeJoined {
        port: u16,
        conn: ConnId,
        sink: Arc<dyn MessageSink>,
    },

    /// A node's control connection closed or failed
    NodeLeft { node: NodeId, conn: ConnId },

    /// A client connection closed
    ClientLeft { conn: ConnId },
}
