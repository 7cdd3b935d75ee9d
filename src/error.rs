//! Error types for replistore
//!
//! Provides a unified error type for controller, storage node and client.

use thiserror::Error;

use crate::protocol::Message;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for replistore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Precondition Errors (answered to the client with a matching token)
    // -------------------------------------------------------------------------
    #[error("Not enough storage nodes connected")]
    NotEnoughReplicas,

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // -------------------------------------------------------------------------
    // Replication Errors
    // -------------------------------------------------------------------------
    #[error("Timed out waiting for node {node} to acknowledge {file}")]
    OperationTimeout { file: String, node: String },

    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("Load failed, no replica left to try for {0}")]
    LoadFailed(String),

    #[error("Store failed: {0}")]
    StoreFailed(String),

    #[error("Remove failed: {0}")]
    RemoveFailed(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// The wire reply a client receives for this error, if it has one
    pub fn reply(&self) -> Option<Message> {
        match self {
            StoreError::NotEnoughReplicas => Some(Message::ErrorNotEnoughDstores),
            StoreError::FileAlreadyExists(_) => Some(Message::ErrorFileAlreadyExists),
            StoreError::FileNotFound(_) => Some(Message::ErrorFileDoesNotExist { name: None }),
            StoreError::LoadFailed(_) => Some(Message::ErrorLoad),
            _ => None,
        }
    }

    /// Whether this error means the peer went away (EOF, reset, timeout...)
    pub fn is_disconnect(&self) -> bool {
        match self {
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            StoreError::NodeUnavailable(_) => true,
            _ => false,
        }
    }
}
