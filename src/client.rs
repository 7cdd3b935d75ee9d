//! Client
//!
//! Blocking client for the controller protocol. Talks to the controller
//! for placement and to storage nodes directly for file bytes.

use std::io::{Cursor, Seek, SeekFrom, Write};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::network::Connection;
use crate::protocol::{validate_name, Message};

pub struct Client {
    controller: Connection,

    /// Storage nodes are addressed by port on the controller's host
    node_host: IpAddr,

    timeout: Duration,
}

impl Client {
    /// Connect to the controller
    ///
    /// `timeout` bounds every read: node transfers and controller replies.
    /// It should exceed the controller's ack timeout.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let addr: SocketAddr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| StoreError::Config("controller address resolved to nothing".to_string()))?;

        let mut controller = Connection::connect(addr, timeout)?;
        let ms = timeout.as_millis() as u64;
        controller.set_timeouts(ms, ms)?;

        Ok(Self {
            controller,
            node_host: addr.ip(),
            timeout,
        })
    }

    // =========================================================================
    // Store
    // =========================================================================

    /// Store `data` under `name` on every replica the controller picks
    pub fn store(&mut self, name: &str, data: &[u8]) -> Result<()> {
        validate_name(name)?;
        self.controller.send(&Message::Store {
            name: name.to_string(),
            size: data.len() as u64,
        })?;

        let ports = match self.controller.read_message()? {
            Message::StoreTo { ports } => ports,
            other => return Err(self.unexpected(name, other)),
        };

        for port in ports {
            if let Err(e) = self.upload(port, name, data) {
                // The controller's barrier times out on this replica
                tracing::warn!("Upload of {} to node {} failed: {}", name, port, e);
            }
        }

        match self.controller.read_message()? {
            Message::StoreComplete => Ok(()),
            other => Err(self.unexpected(name, other)),
        }
    }

    fn upload(&self, port: u16, name: &str, data: &[u8]) -> Result<()> {
        let mut node = self.open_node(port)?;
        node.send(&Message::Store {
            name: name.to_string(),
            size: data.len() as u64,
        })?;
        match node.read_message()? {
            Message::Ack => node.write_payload(data),
            other => Err(StoreError::Protocol(format!(
                "node {} answered STORE with {}",
                port,
                other.token().as_str()
            ))),
        }
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Load `name` into memory, failing over across replicas with RELOAD
    pub fn load(&mut self, name: &str) -> Result<Bytes> {
        let mut out = Cursor::new(Vec::new());
        self.load_to(name, &mut out)?;
        Ok(Bytes::from(out.into_inner()))
    }

    /// Stream `name` into `out`, failing over across replicas with RELOAD
    ///
    /// Bytes are written as they arrive from the storage node. A failed
    /// replica rewinds `out` to where it started before the next attempt.
    /// On error `out` may hold a partial copy.
    pub fn load_to<W: Write + Seek>(&mut self, name: &str, out: &mut W) -> Result<u64> {
        validate_name(name)?;
        let start = out.stream_position()?;
        self.controller.send(&Message::Load {
            name: name.to_string(),
        })?;

        loop {
            match self.controller.read_message()? {
                Message::LoadFrom { port, size } => match self.fetch(port, name, size, out) {
                    Ok(got) => return Ok(got),
                    Err(e) => {
                        tracing::warn!("Load of {} from node {} failed: {}", name, port, e);
                        out.seek(SeekFrom::Start(start))?;
                        self.controller.send(&Message::Reload {
                            name: name.to_string(),
                        })?;
                    }
                },
                other => return Err(self.unexpected(name, other)),
            }
        }
    }

    fn fetch<W: Write>(&self, port: u16, name: &str, size: u64, out: &mut W) -> Result<u64> {
        let mut node = self.open_node(port)?;
        node.send(&Message::Load {
            name: name.to_string(),
        })?;
        node.copy_payload(size, out)
    }

    // =========================================================================
    // Remove / List
    // =========================================================================

    pub fn remove(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.controller.send(&Message::Remove {
            name: name.to_string(),
        })?;
        match self.controller.read_message()? {
            Message::RemoveComplete => Ok(()),
            other => Err(self.unexpected(name, other)),
        }
    }

    /// Names of the files that are fully stored
    pub fn list(&mut self) -> Result<Vec<String>> {
        self.controller.send(&Message::List { names: Vec::new() })?;
        match self.controller.read_message()? {
            Message::List { names } => Ok(names),
            other => Err(self.unexpected("", other)),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn open_node(&self, port: u16) -> Result<Connection> {
        let mut node = Connection::connect(SocketAddr::new(self.node_host, port), self.timeout)?;
        let ms = self.timeout.as_millis() as u64;
        node.set_timeouts(ms, ms)?;
        Ok(node)
    }

    /// Map an error reply (or anything out of place) to an error
    fn unexpected(&self, name: &str, reply: Message) -> StoreError {
        match reply {
            Message::ErrorNotEnoughDstores => StoreError::NotEnoughReplicas,
            Message::ErrorFileAlreadyExists => StoreError::FileAlreadyExists(name.to_string()),
            Message::ErrorFileDoesNotExist { .. } => StoreError::FileNotFound(name.to_string()),
            Message::ErrorLoad => StoreError::LoadFailed(name.to_string()),
            Message::ErrorStoreFailed { name } => StoreError::StoreFailed(name),
            Message::ErrorRemoveFailed { name } => StoreError::RemoveFailed(name),
            other => StoreError::Protocol(format!(
                "unexpected {} from controller",
                other.token().as_str()
            )),
        }
    }
}
