//! Network Module
//!
//! TCP plumbing shared by the controller, storage nodes and clients.
//!
//! ## Architecture
//! - Single acceptor thread per listening socket
//! - One thread per connection
//! - Outbound messages go through a `MessageSink`, so protocol logic
//!   can be driven without sockets

mod server;
mod connection;

pub use server::{Acceptor, ShutdownHandle};
pub use connection::{ConnId, Connection, MessageReader, Peer};

use crate::error::Result;
use crate::protocol::Message;

/// Anything a control line can be sent to
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &Message) -> Result<()>;

    /// Close the underlying transport, if there is one
    fn close(&self) {}

    /// Whether the transport was closed; further sends are pointless
    fn is_closed(&self) -> bool {
        false
    }
}
