//! Cluster state
//!
//! Everything the controller owns, in one value shared by handle between
//! the dispatch thread, connection readers and barrier tasks.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::cluster::{AckRegistry, Membership};
use crate::config::ControllerConfig;
use crate::network::{ConnId, MessageSink};
use crate::protocol::Message;

pub struct ClusterState {
    pub config: ControllerConfig,
    pub catalog: Catalog,
    pub membership: Membership,
    pub acks: AckRegistry,
}

impl ClusterState {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            catalog: Catalog::new(),
            membership: Membership::new(),
            acks: AckRegistry::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    pub fn replication_factor(&self) -> usize {
        self.config.replication_factor
    }
}

/// The client end of a request
#[derive(Clone)]
pub struct ClientRef {
    pub conn: ConnId,
    pub sink: Arc<dyn MessageSink>,
}

impl ClientRef {
    pub fn new(conn: ConnId, sink: Arc<dyn MessageSink>) -> Self {
        Self { conn, sink }
    }

    /// Send a reply; a client that went away just loses it
    pub fn reply(&self, message: &Message) {
        if let Err(e) = self.sink.send(message) {
            tracing::debug!(
                "Dropped {} for client {}: {}",
                message.token().as_str(),
                self.conn,
                e
            );
        }
    }
}
