//! Catalog Module
//!
//! The controller's authoritative filename → FileRecord index.
//!
//! ## Lifecycle of a record
//! ```text
//!   (absent) ──STORE──▶ StoreInProgress ──all acks──▶ StoreComplete
//!                          │                              │
//!                       timeout                         REMOVE
//!                          ▼                              ▼
//!                      (absent)                    RemoveInProgress ──all acks──▶ RemoveComplete ──▶ (absent)
//! ```
//!
//! A failed remove leaves the record in `RemoveInProgress`; a new REMOVE
//! may pick it up once the failed attempt has terminated.
//!
//! ## Concurrency
//! Every check-then-mutate sequence is a single `Catalog` method executed
//! under one lock. Barrier outcomes carry the `OpId` of the operation that
//! started them and only apply if the record still belongs to it.

mod index;

pub use index::Catalog;

use crate::cluster::NodeId;

/// Replication status of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    StoreInProgress,
    StoreComplete,
    RemoveInProgress,
    RemoveComplete,
}

/// Identifies one store or remove attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u64);

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Everything the controller knows about one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Declared byte length at store time
    pub size: u64,

    pub status: FileStatus,

    /// Nodes holding (or about to hold) a replica, in placement order
    pub replicas: Vec<NodeId>,

    /// Operation that last moved this record
    pub op: OpId,

    /// Whether that operation's barrier is still running
    pub in_flight: bool,
}

impl FileRecord {
    pub fn is_visible(&self) -> bool {
        self.status == FileStatus::StoreComplete
    }
}
