//! Ack Registry
//!
//! Correlates STORE_ACK / REMOVE_ACK lines from nodes with the barrier
//! waiting for them.
//!
//! A waiter is registered *before* the message that triggers the ack is
//! sent, so an ack can never arrive ahead of its waiter. Each slot is a
//! one-shot channel: delivered at most once, consumed by exactly one wait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use super::NodeId;

/// Which acknowledgement a waiter expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    Store,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AckKey {
    node: NodeId,
    kind: AckKind,
    file: String,
}

struct Slot {
    id: u64,
    tx: Sender<()>,
}

type Slots = Arc<Mutex<HashMap<AckKey, Slot>>>;

/// Per-node pending acknowledgements
pub struct AckRegistry {
    slots: Slots,
    next_slot: AtomicU64,
}

impl AckRegistry {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_slot: AtomicU64::new(1),
        }
    }

    /// Register interest in one ack from `node` for `file`
    pub fn expect(&self, node: NodeId, kind: AckKind, file: &str) -> AckWaiter {
        let (tx, rx) = bounded(1);
        let id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let key = AckKey {
            node,
            kind,
            file: file.to_string(),
        };

        if self.slots.lock().insert(key.clone(), Slot { id, tx }).is_some() {
            tracing::warn!("Replaced a pending {:?} ack wait for {} on node {}", kind, file, node);
        }

        AckWaiter {
            key,
            slot: id,
            rx,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Hand an ack to its waiter. Returns false if nobody was waiting.
    pub fn deliver(&self, node: NodeId, kind: AckKind, file: &str) -> bool {
        let key = AckKey {
            node,
            kind,
            file: file.to_string(),
        };
        match self.slots.lock().remove(&key) {
            Some(slot) => slot.tx.try_send(()).is_ok(),
            None => false,
        }
    }

    /// Fail every wait on a departed node
    ///
    /// Dropping the senders disconnects the waiters, which then report
    /// `NodeUnavailable` without waiting for their deadline.
    pub fn forget_node(&self, node: NodeId) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|key, _| key.node != node);
        before - slots.len()
    }

    /// Number of registered, undelivered waits
    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Default for AckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One outstanding acknowledgement
///
/// Dropping the waiter unregisters it; a late ack is then discarded.
pub struct AckWaiter {
    key: AckKey,
    slot: u64,
    rx: Receiver<()>,
    slots: Slots,
}

impl AckWaiter {
    pub fn node(&self) -> NodeId {
        self.key.node
    }

    pub fn kind(&self) -> AckKind {
        self.key.kind
    }

    pub fn file(&self) -> &str {
        &self.key.file
    }

    /// Block until the ack arrives or `deadline` passes
    pub fn wait(&self, deadline: Instant) -> Result<()> {
        match self.rx.recv_deadline(deadline) {
            Ok(()) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(self.timeout_error()),
            Err(RecvTimeoutError::Disconnected) => Err(self.unavailable_error()),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    pub(crate) fn timeout_error(&self) -> StoreError {
        StoreError::OperationTimeout {
            file: self.key.file.clone(),
            node: self.key.node.to_string(),
        }
    }

    pub(crate) fn unavailable_error(&self) -> StoreError {
        StoreError::NodeUnavailable(format!(
            "node {} left before acknowledging {}",
            self.key.node, self.key.file
        ))
    }
}

impl Drop for AckWaiter {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        if slots.get(&self.key).map(|s| s.id) == Some(self.slot) {
            slots.remove(&self.key);
        }
    }
}
