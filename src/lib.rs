//! # replistore
//!
//! A replicated file store with:
//! - One controller owning the file index
//! - Storage nodes holding r replicas of every file
//! - Quorum-acknowledged store and remove under per-node deadlines
//! - Client-driven load failover across replicas
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                               │
//! └──────┬───────────────────────────────────────────┬──────────┘
//!        │ STORE / LOAD / REMOVE / LIST              │ file bytes
//! ┌──────▼──────────────────────────────┐            │
//! │             Controller              │            │
//! │  inbound queue → ProtocolEngine     │            │
//! │  Catalog · Membership · AckRegistry │            │
//! └──────┬──────────────────────▲───────┘            │
//!        │ REMOVE               │ STORE_ACK          │
//!        │                      │ REMOVE_ACK         │
//! ┌──────▼──────────────────────┴───────────────────▼──────────┐
//! │              Storage nodes (StorageAgent)                    │
//! │                  local directory per node                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod network;
pub mod catalog;
pub mod cluster;
pub mod controller;
pub mod dstore;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StoreError, Result};
pub use config::{ControllerConfig, DstoreConfig};
pub use controller::{ControllerServer, ProtocolEngine};
pub use dstore::{DstoreServer, StorageAgent};
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of replistore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
