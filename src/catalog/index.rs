//! File index
//!
//! HashMap-based catalog behind a single mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cluster::NodeId;
use crate::error::{Result, StoreError};
use super::{FileRecord, FileStatus, OpId};

/// The controller's file index
///
/// ## Concurrency:
/// - `files`: one mutex; every public method is one atomic transition
/// - `next_op`: atomic counter (lock-free)
pub struct Catalog {
    files: Mutex<HashMap<String, FileRecord>>,
    next_op: AtomicU64,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            next_op: AtomicU64::new(1),
        }
    }

    /// Allocate an identifier for a new store/remove attempt
    pub fn next_op(&self) -> OpId {
        OpId(self.next_op.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Claim `name` for a new store and record its placement
    ///
    /// `select` receives the current per-node replica counts (in-flight
    /// stores included) and returns the chosen candidates. Check, placement
    /// and insert happen under one lock.
    pub fn begin_store<F>(&self, name: &str, size: u64, op: OpId, select: F) -> Result<Vec<NodeId>>
    where
        F: FnOnce(&HashMap<NodeId, usize>) -> Vec<NodeId>,
    {
        let mut files = self.files.lock();

        if let Some(existing) = files.get(name) {
            if existing.status != FileStatus::RemoveComplete {
                return Err(StoreError::FileAlreadyExists(name.to_string()));
            }
        }

        let counts = Self::count_replicas(&files);
        let candidates = select(&counts);

        files.insert(
            name.to_string(),
            FileRecord {
                size,
                status: FileStatus::StoreInProgress,
                replicas: candidates.clone(),
                op,
                in_flight: true,
            },
        );

        Ok(candidates)
    }

    /// Mark a store complete if `op` still owns the record
    pub fn commit_store(&self, name: &str, op: OpId) -> bool {
        let mut files = self.files.lock();
        match files.get_mut(name) {
            Some(record) if record.op == op && record.status == FileStatus::StoreInProgress => {
                record.status = FileStatus::StoreComplete;
                record.in_flight = false;
                true
            }
            _ => false,
        }
    }

    /// Roll back a failed store: the record is deleted
    pub fn abort_store(&self, name: &str, op: OpId) -> bool {
        let mut files = self.files.lock();
        let owned = matches!(
            files.get(name),
            Some(record) if record.op == op && record.status == FileStatus::StoreInProgress
        );
        if owned {
            files.remove(name);
        }
        owned
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Claim `name` for removal and return the replicas to contact
    ///
    /// Allowed from StoreComplete, or from RemoveInProgress once the
    /// previous remove attempt has terminated.
    pub fn begin_remove(&self, name: &str, op: OpId) -> Result<Vec<NodeId>> {
        let mut files = self.files.lock();
        let record = match files.get_mut(name) {
            Some(record) => record,
            None => return Err(StoreError::FileNotFound(name.to_string())),
        };

        let claimable = match record.status {
            FileStatus::StoreComplete => true,
            FileStatus::RemoveInProgress => !record.in_flight,
            FileStatus::StoreInProgress | FileStatus::RemoveComplete => false,
        };
        if !claimable {
            return Err(StoreError::FileNotFound(name.to_string()));
        }

        record.status = FileStatus::RemoveInProgress;
        record.op = op;
        record.in_flight = true;
        Ok(record.replicas.clone())
    }

    /// Drop one replica that confirmed deletion
    pub fn release_replica(&self, name: &str, op: OpId, node: NodeId) -> bool {
        let mut files = self.files.lock();
        match files.get_mut(name) {
            Some(record) if record.op == op && record.status == FileStatus::RemoveInProgress => {
                record.replicas.retain(|n| *n != node);
                true
            }
            _ => false,
        }
    }

    /// Finish a remove: RemoveComplete, then the record is erased
    pub fn commit_remove(&self, name: &str, op: OpId) -> bool {
        let mut files = self.files.lock();
        match files.get_mut(name) {
            Some(record) if record.op == op && record.status == FileStatus::RemoveInProgress => {
                record.status = FileStatus::RemoveComplete;
                record.in_flight = false;
                files.remove(name);
                true
            }
            _ => false,
        }
    }

    /// A remove barrier failed: status stays RemoveInProgress, no rollback
    pub fn fail_remove(&self, name: &str, op: OpId) -> bool {
        let mut files = self.files.lock();
        match files.get_mut(name) {
            Some(record) if record.op == op && record.status == FileStatus::RemoveInProgress => {
                record.in_flight = false;
                true
            }
            _ => false,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Size and replicas of a file that may be loaded
    pub fn load_target(&self, name: &str) -> Result<(u64, Vec<NodeId>)> {
        let files = self.files.lock();
        match files.get(name) {
            Some(record) if record.is_visible() => Ok((record.size, record.replicas.clone())),
            _ => Err(StoreError::FileNotFound(name.to_string())),
        }
    }

    /// Names of StoreComplete files, sorted
    pub fn list_complete(&self) -> Vec<String> {
        let files = self.files.lock();
        let mut names: Vec<String> = files
            .iter()
            .filter(|(_, record)| record.is_visible())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<FileRecord> {
        self.files.lock().get(name).cloned()
    }

    /// Replica assignments per node, in-flight stores included
    pub fn replica_counts(&self) -> HashMap<NodeId, usize> {
        Self::count_replicas(&self.files.lock())
    }

    fn count_replicas(files: &HashMap<String, FileRecord>) -> HashMap<NodeId, usize> {
        let mut counts = HashMap::new();
        for record in files.values() {
            for node in &record.replicas {
                *counts.entry(*node).or_insert(0) += 1;
            }
        }
        counts
    }

    // =========================================================================
    // Membership
    // =========================================================================

    /// Strike a departed node from every replica list
    ///
    /// Returns the number of records touched.
    pub fn strike_node(&self, node: NodeId) -> usize {
        let mut files = self.files.lock();
        let mut touched = 0;
        for record in files.values_mut() {
            let before = record.replicas.len();
            record.replicas.retain(|n| *n != node);
            if record.replicas.len() != before {
                touched += 1;
            }
        }
        touched
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
