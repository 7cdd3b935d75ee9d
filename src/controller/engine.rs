//! Protocol Engine
//!
//! Applies client requests and membership events to the cluster state.
//!
//! ## Responsibilities
//! - Enforce preconditions and answer violations with their error token
//! - Place new files and run the store barrier
//! - Run the remove barrier over the current replica set
//! - Hand out load candidates and fail over on RELOAD
//! - Keep membership and replica lists in step with node churn

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::catalog::OpId;
use crate::cluster::{AckKind, AckWaiter, NodeId};
use crate::config::ControllerConfig;
use crate::error::{Result, StoreError};
use crate::network::{ConnId, MessageSink};
use crate::protocol::{validate_name, Message};

use super::placement::select_candidates;
use super::quorum::await_all;
use super::state::{ClientRef, ClusterState};
use super::tasks::OperationPool;
use super::Inbound;

/// Failover position of one client's load of one file
///
/// Records which replicas were already offered, so each is offered at
/// most once even if the replica list shrinks between attempts.
#[derive(Debug, Default, Clone)]
pub struct LoadCursor {
    tried: Vec<NodeId>,
}

impl LoadCursor {
    /// The first replica, in list order, not offered yet
    pub fn next(&self, replicas: &[NodeId]) -> Option<NodeId> {
        replicas.iter().copied().find(|node| !self.tried.contains(node))
    }

    pub fn advance(&mut self, node: NodeId) {
        self.tried.push(node);
    }

    pub fn attempts(&self) -> usize {
        self.tried.len()
    }
}

/// The controller's protocol engine
///
/// ## Concurrency Model
/// - `handle` is called by a single dispatch thread, one event at a time
/// - node acks arrive on connection threads through `node_message`
/// - store/remove barriers run on the operation pool and touch the
///   catalog only through its atomic, `OpId`-checked transitions
pub struct ProtocolEngine {
    state: Arc<ClusterState>,

    /// (client, file) → load failover position
    cursors: Mutex<HashMap<(ConnId, String), LoadCursor>>,

    pool: OperationPool,
}

impl ProtocolEngine {
    pub fn new(config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        let pool = OperationPool::new(config.operation_workers)?;
        Ok(Self {
            state: Arc::new(ClusterState::new(config)),
            cursors: Mutex::new(HashMap::new()),
            pool,
        })
    }

    /// Apply one inbound event
    pub fn handle(&self, event: Inbound) {
        match event {
            Inbound::Request { client, message } => self.handle_request(&client, message),
            Inbound::NodeJoined { port, conn, sink } => self.node_joined(NodeId(port), conn, sink),
            Inbound::NodeLeft { node, conn } => self.node_left(node, conn),
            Inbound::ClientLeft { conn } => self.client_left(conn),
        }
    }

    fn handle_request(&self, client: &ClientRef, message: Message) {
        let result = match message {
            Message::Store { name, size } => self.store(client, &name, size),
            Message::Load { name } => self.load(client, &name),
            Message::Reload { name } => self.reload(client, &name),
            Message::Remove { name } => self.remove(client, &name),
            Message::List { names } => {
                if !names.is_empty() {
                    tracing::debug!("Client {} sent LIST with arguments; ignoring them", client.conn);
                }
                self.list(client)
            }
            other => Err(StoreError::MalformedMessage(format!(
                "{} is not a client request",
                other.token().as_str()
            ))),
        };

        if let Err(e) = result {
            match e.reply() {
                Some(reply) => {
                    tracing::debug!("Request from client {} refused: {}", client.conn, e);
                    client.reply(&reply);
                }
                None => tracing::warn!("Could not handle message from client {}: {}", client.conn, e),
            }
        }
    }

    // =========================================================================
    // Store
    // =========================================================================

    fn store(&self, client: &ClientRef, name: &str, size: u64) -> Result<()> {
        validate_name(name)?;
        let state = &self.state;
        let r = state.replication_factor();

        let live = state.membership.live_nodes();
        if live.len() < r {
            return Err(StoreError::NotEnoughReplicas);
        }

        let op = state.catalog.next_op();
        let candidates = state
            .catalog
            .begin_store(name, size, op, |counts| select_candidates(&live, counts, r))?;

        // Registered before the client can reach any node
        let waiters: Vec<AckWaiter> = candidates
            .iter()
            .map(|node| state.acks.expect(*node, AckKind::Store, name))
            .collect();
        let deadline = Instant::now() + state.timeout();

        tracing::debug!("Store of {} ({} bytes) placed on {:?} as {}", name, size, candidates, op);
        client.reply(&Message::StoreTo {
            ports: candidates.iter().map(|n| n.port()).collect(),
        });

        let state = Arc::clone(state);
        let client = client.clone();
        let name = name.to_string();
        self.pool
            .spawn(move || run_store(&state, &client, &name, op, waiters, deadline));
        Ok(())
    }

    // =========================================================================
    // Remove
    // =========================================================================

    fn remove(&self, client: &ClientRef, name: &str) -> Result<()> {
        let state = &self.state;
        let op = state.catalog.next_op();
        let replicas = state.catalog.begin_remove(name, op)?;
        tracing::info!("Remove operation for file {} started", name);

        let waiters: Vec<AckWaiter> = replicas
            .iter()
            .map(|node| state.acks.expect(*node, AckKind::Remove, name))
            .collect();
        let deadline = Instant::now() + state.timeout();

        let command = Message::Remove { name: name.to_string() };
        for node in &replicas {
            if let Err(e) = state.membership.send(*node, &command) {
                tracing::warn!("Could not send REMOVE {} to node {}: {}", name, node, e);
            }
        }

        let state = Arc::clone(state);
        let client = client.clone();
        let name = name.to_string();
        self.pool
            .spawn(move || run_remove(&state, &client, &name, op, waiters, deadline));
        Ok(())
    }

    // =========================================================================
    // Load
    // =========================================================================

    fn load(&self, client: &ClientRef, name: &str) -> Result<()> {
        let (size, replicas) = self.state.catalog.load_target(name).map_err(|e| {
            tracing::info!("Load operation failed because file does not exist (filename: {})", name);
            e
        })?;

        // A fresh LOAD restarts failover from the first replica
        let key = (client.conn, name.to_string());
        self.cursors.lock().insert(key.clone(), LoadCursor::default());
        self.offer_next(client, key, size, &replicas)
    }

    fn reload(&self, client: &ClientRef, name: &str) -> Result<()> {
        let key = (client.conn, name.to_string());
        if !self.cursors.lock().contains_key(&key) {
            tracing::warn!("RELOAD {} from client {} without a prior LOAD", name, client.conn);
            return Err(StoreError::LoadFailed(name.to_string()));
        }

        match self.state.catalog.load_target(name) {
            Ok((size, replicas)) => self.offer_next(client, key, size, &replicas),
            Err(_) => {
                self.cursors.lock().remove(&key);
                tracing::warn!("File {} went away during load failover", name);
                Err(StoreError::LoadFailed(name.to_string()))
            }
        }
    }

    fn offer_next(
        &self,
        client: &ClientRef,
        key: (ConnId, String),
        size: u64,
        replicas: &[NodeId],
    ) -> Result<()> {
        let offer = {
            let mut cursors = self.cursors.lock();
            let next = cursors.get_mut(&key).and_then(|cursor| {
                let node = cursor.next(replicas)?;
                cursor.advance(node);
                Some(node)
            });
            if next.is_none() {
                if let Some(cursor) = cursors.remove(&key) {
                    tracing::warn!(
                        "Load operation for file {} failed after having contacted {} different nodes",
                        key.1,
                        cursor.attempts()
                    );
                }
            }
            next
        };

        match offer {
            Some(node) => {
                tracing::info!("Loading file {} from node {}", key.1, node);
                client.reply(&Message::LoadFrom {
                    port: node.port(),
                    size,
                });
                Ok(())
            }
            None => Err(StoreError::LoadFailed(key.1)),
        }
    }

    // =========================================================================
    // List
    // =========================================================================

    fn list(&self, client: &ClientRef) -> Result<()> {
        if self.state.membership.live_count() < self.state.replication_factor() {
            tracing::info!("List operation failed");
            return Err(StoreError::NotEnoughReplicas);
        }
        let names = self.state.catalog.list_complete();
        tracing::debug!("List operation completed with {} file(s)", names.len());
        client.reply(&Message::List { names });
        Ok(())
    }

    // =========================================================================
    // Membership
    // =========================================================================

    fn node_joined(&self, node: NodeId, conn: ConnId, sink: Arc<dyn MessageSink>) {
        if self.state.membership.join(node, conn, Arc::clone(&sink)) {
            tracing::info!(
                "Node {} joined ({} live)",
                node,
                self.state.membership.live_count()
            );
        } else {
            tracing::warn!("Refusing JOIN {} from connection {}: port already taken", node, conn);
            sink.close();
        }
    }

    fn node_left(&self, node: NodeId, conn: ConnId) {
        if !self.state.membership.leave(node, conn) {
            return;
        }
        let failed = self.state.acks.forget_node(node);
        let struck = self.state.catalog.strike_node(node);
        tracing::info!(
            "Node {} left: struck from {} file(s), {} pending ack(s) failed",
            node,
            struck,
            failed
        );
    }

    fn client_left(&self, conn: ConnId) {
        self.cursors.lock().retain(|(owner, _), _| *owner != conn);
    }

    /// A control line from a joined node, read on its connection thread
    ///
    /// Acks go straight to their waiters without passing through the
    /// dispatch queue.
    pub fn node_message(&self, node: NodeId, conn: ConnId, message: Message) {
        if !self.state.membership.is_member(node, conn) {
            tracing::warn!("Ignoring {:?} from non-member connection {}", message, conn);
            return;
        }

        let (kind, name) = match message {
            Message::StoreAck { name } => (AckKind::Store, name),
            Message::RemoveAck { name } => (AckKind::Remove, name),
            Message::ErrorFileDoesNotExist { name: Some(name) } => {
                // The replica is gone, which is what the remove wanted
                tracing::warn!("Node {} had no file {} to remove", node, name);
                (AckKind::Remove, name)
            }
            other => {
                tracing::warn!("Unexpected message from node {}: {:?}", node, other);
                return;
            }
        };

        if !self.state.acks.deliver(node, kind, &name) {
            tracing::debug!("Discarded unsolicited {:?} ack for {} from node {}", kind, name, node);
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn state(&self) -> &Arc<ClusterState> {
        &self.state
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.lock().len()
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.state.config
    }
}

// =============================================================================
// Barrier tasks
// =============================================================================

fn run_store(
    state: &ClusterState,
    client: &ClientRef,
    name: &str,
    op: OpId,
    waiters: Vec<AckWaiter>,
    deadline: Instant,
) {
    let outcome = await_all(waiters, deadline, |node| {
        tracing::info!("Store of file {} to node {} successfully completed", name, node);
    });

    match outcome {
        Ok(()) => {
            if state.catalog.commit_store(name, op) {
                tracing::info!("Store operation for file {} completed", name);
                client.reply(&Message::StoreComplete);
            } else {
                tracing::warn!("Store of {} finished but {} no longer owns the record", name, op);
            }
        }
        Err(e) => {
            tracing::warn!("Store of file {} failed: {}", name, e);
            if state.catalog.abort_store(name, op) {
                tracing::info!("Rolled back index entry for {}", name);
            }
            if state.config.notify_failures {
                client.reply(&Message::ErrorStoreFailed { name: name.to_string() });
            }
        }
    }
}

fn run_remove(
    state: &ClusterState,
    client: &ClientRef,
    name: &str,
    op: OpId,
    waiters: Vec<AckWaiter>,
    deadline: Instant,
) {
    let outcome = await_all(waiters, deadline, |node| {
        state.catalog.release_replica(name, op, node);
        tracing::info!("Remove of file {} from node {} successfully completed", name, node);
    });

    match outcome {
        Ok(()) => {
            if state.catalog.commit_remove(name, op) {
                tracing::info!("Remove operation for file {} successfully completed", name);
                client.reply(&Message::RemoveComplete);
            } else {
                tracing::warn!("Remove of {} finished but {} no longer owns the record", name, op);
            }
        }
        Err(e) => {
            state.catalog.fail_remove(name, op);
            tracing::error!("Remove operation for file {} not completed successfully: {}", name, e);
            if state.config.notify_failures {
                client.reply(&Message::ErrorRemoveFailed { name: name.to_string() });
            }
        }
    }
}
