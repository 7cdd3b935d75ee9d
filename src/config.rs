//! Configuration for replistore
//!
//! Centralized configuration with sensible defaults, one struct per
//! process kind.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// Configuration for the controller process
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for clients and storage nodes
    pub listen_addr: String,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// Number of storage nodes each file is written to (r)
    pub replication_factor: usize,

    /// How long to wait for a node acknowledgement (milliseconds)
    pub timeout_ms: u64,

    /// Period between rebalance passes (seconds). Carried, never acted on.
    pub rebalance_period_s: u64,

    // -------------------------------------------------------------------------
    // Execution Configuration
    // -------------------------------------------------------------------------
    /// Worker threads running store/remove barriers
    pub operation_workers: usize,

    /// Send ERROR_STORE_FAILED / ERROR_REMOVE_FAILED when a barrier fails
    pub notify_failures: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            replication_factor: 3,
            timeout_ms: 1000,
            rebalance_period_s: 10,
            operation_workers: 32,
            notify_failures: true,
        }
    }
}

impl ControllerConfig {
    /// Create a new config builder
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Reject values the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.replication_factor == 0 {
            return Err(StoreError::Config(
                "replication factor must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(StoreError::Config("timeout must be positive".to_string()));
        }
        if self.operation_workers == 0 {
            return Err(StoreError::Config(
                "at least one operation worker is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for ControllerConfig
#[derive(Default)]
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the replication factor
    pub fn replication_factor(mut self, r: usize) -> Self {
        self.config.replication_factor = r;
        self
    }

    /// Set the ack timeout (in milliseconds)
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set the rebalance period (in seconds)
    pub fn rebalance_period_s(mut self, secs: u64) -> Self {
        self.config.rebalance_period_s = secs;
        self
    }

    /// Set the number of operation worker threads
    pub fn operation_workers(mut self, count: usize) -> Self {
        self.config.operation_workers = count;
        self
    }

    /// Enable or disable explicit failure replies
    pub fn notify_failures(mut self, enabled: bool) -> Self {
        self.config.notify_failures = enabled;
        self
    }

    pub fn build(self) -> ControllerConfig {
        self.config
    }
}

/// Configuration for a storage node process
#[derive(Debug, Clone)]
pub struct DstoreConfig {
    /// TCP listen address clients connect to for data transfer
    pub listen_addr: String,

    /// Address of the controller
    pub controller_addr: String,

    /// Read/write timeout on client data connections (milliseconds)
    pub timeout_ms: u64,

    /// Directory holding this node's replicas.
    /// Emptied on start-up: the controller's index is not persisted.
    pub storage_dir: PathBuf,
}

impl Default for DstoreConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            controller_addr: "127.0.0.1:3000".to_string(),
            timeout_ms: 1000,
            storage_dir: PathBuf::from("./replistore_data"),
        }
    }
}

impl DstoreConfig {
    /// Create a new config builder
    pub fn builder() -> DstoreConfigBuilder {
        DstoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(StoreError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for DstoreConfig
#[derive(Default)]
pub struct DstoreConfigBuilder {
    config: DstoreConfig,
}

impl DstoreConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the controller address
    pub fn controller_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.controller_addr = addr.into();
        self
    }

    /// Set the data connection timeout (in milliseconds)
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set the storage directory
    pub fn storage_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = path.into();
        self
    }

    pub fn build(self) -> DstoreConfig {
        self.config
    }
}
