//! Dstore Module
//!
//! A storage node: holds replicas on local disk and executes the
//! node side of the replication protocol.
//!
//! ## Connections
//! - one long-lived control connection to the controller (JOIN, REMOVE,
//!   STORE_ACK, REMOVE_ACK)
//! - short data connections from clients, one STORE or LOAD each

mod agent;
mod server;

pub use agent::StorageAgent;
pub use server::DstoreServer;
