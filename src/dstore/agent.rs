//! Storage Agent
//!
//! Local store/load/remove against the node's storage directory, with
//! outcomes reported to the controller.
//!
//! ## Per-file local states
//! ```text
//!   Absent ──STORE──▶ WriteInProgress ──bytes persisted──▶ Present ──REMOVE──▶ Absent
//! ```

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::network::{Connection, MessageSink};
use crate::protocol::{validate_name, Message};

pub struct StorageAgent {
    /// Directory holding this node's replicas
    dir: PathBuf,

    /// Control connection to the controller, for acks
    controller: Arc<dyn MessageSink>,

    /// Files currently in WriteInProgress
    writing: Mutex<HashSet<String>>,
}

impl StorageAgent {
    /// Open the storage directory, emptying anything left from a previous run
    pub fn open(dir: &Path, controller: Arc<dyn MessageSink>) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut cleared = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            cleared += 1;
        }
        if cleared > 0 {
            tracing::info!("Cleared {} stale entries from {}", cleared, dir.display());
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            controller,
            writing: Mutex::new(HashSet::new()),
        })
    }

    /// Path of a file inside the storage directory
    ///
    /// Names are single path components; anything that could escape the
    /// directory is rejected.
    pub fn file_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
            return Err(StoreError::MalformedMessage(format!(
                "file name {:?} is not a plain file name",
                name
            )));
        }
        Ok(self.dir.join(name))
    }

    /// Whether a fully written copy of `name` is present
    pub fn contains(&self, name: &str) -> bool {
        if self.writing.lock().contains(name) {
            return false;
        }
        self.file_path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Receive a file from a client
    ///
    /// Steps:
    /// 1. Claim the name; an existing or in-progress file drops the command
    /// 2. ACK the client
    /// 3. Read exactly `size` bytes and persist them
    /// 4. Report STORE_ACK to the controller
    pub fn handle_store(&self, conn: &mut Connection, name: &str, size: u64) -> Result<()> {
        let path = self.file_path(name)?;

        if !self.writing.lock().insert(name.to_string()) {
            tracing::warn!("Dropping STORE {}: a write is already in progress", name);
            return Ok(());
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.writing.lock().remove(name);
                tracing::warn!("Dropping STORE {}: file already present", name);
                return Ok(());
            }
            Err(e) => {
                self.writing.lock().remove(name);
                return Err(e.into());
            }
        };

        let received = Self::receive_into(conn, file, size);
        self.writing.lock().remove(name);

        if let Err(e) = received {
            // Leave the name free for a retry
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        tracing::info!("Stored {} ({} bytes)", name, size);
        self.controller.send(&Message::StoreAck {
            name: name.to_string(),
        })
    }

    fn receive_into(conn: &mut Connection, mut file: File, size: u64) -> Result<()> {
        conn.send(&Message::Ack)?;
        conn.copy_payload(size, &mut file)?;
        file.sync_all()?;
        Ok(())
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Send a file's bytes back on the requesting connection
    ///
    /// A missing file sends nothing; the caller then closes the connection
    /// so the client's read ends instead of stalling.
    pub fn handle_load(&self, conn: &mut Connection, name: &str) -> Result<()> {
        if !self.contains(name) {
            tracing::warn!("Load of {} failed: file not present", name);
            return Ok(());
        }

        let bytes = fs::read(self.file_path(name)?)?;
        conn.write_payload(&bytes)?;
        tracing::debug!("Served {} ({} bytes) to {}", name, bytes.len(), conn.peer_addr());
        Ok(())
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Delete a file and report the outcome to the controller
    pub fn handle_remove(&self, name: &str) -> Result<()> {
        let path = match self.file_path(name) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!("REMOVE {} rejected: {}", name, e);
                return self.report_missing(name);
            }
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed {}", name);
                self.controller.send(&Message::RemoveAck {
                    name: name.to_string(),
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Remove of {} failed: file not present", name);
                self.report_missing(name)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn report_missing(&self, name: &str) -> Result<()> {
        self.controller.send(&Message::ErrorFileDoesNotExist {
            name: Some(name.to_string()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
