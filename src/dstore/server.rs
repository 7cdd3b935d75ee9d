//! Storage Node Server
//!
//! Joins the controller, serves data connections from clients, and
//! executes removals ordered by the controller.

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::DstoreConfig;
use crate::error::{Result, StoreError};
use crate::network::{Acceptor, Connection, MessageReader, MessageSink, ShutdownHandle};
use crate::protocol::Message;

use super::StorageAgent;

pub struct DstoreServer {
    acceptor: Acceptor,
    config: DstoreConfig,
}

impl DstoreServer {
    /// Bind the client-facing socket. Failure here is fatal for the process.
    pub fn bind(config: DstoreConfig) -> Result<Self> {
        config.validate()?;
        let acceptor = Acceptor::bind(&config.listen_addr)?;
        Ok(Self { acceptor, config })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.acceptor.shutdown_handle()
    }

    /// Join the controller and serve until shut down or the controller goes away
    ///
    /// On start-up:
    /// 1. Connect to the controller
    /// 2. Empty the storage directory
    /// 3. Announce the listening port with JOIN
    /// 4. Serve clients; removals arrive on the controller connection
    pub fn run(self) -> Result<()> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let port = self.acceptor.local_addr().port();

        let controller = Connection::connect(self.config.controller_addr.as_str(), timeout)?;
        let (reader, peer) = controller.into_split();
        let controller: Arc<dyn MessageSink> = Arc::new(peer);

        let agent = Arc::new(StorageAgent::open(
            &self.config.storage_dir,
            Arc::clone(&controller),
        )?);

        controller.send(&Message::Join { port })?;
        tracing::info!(
            "Node {} joined controller at {}, storing in {}",
            port,
            self.config.controller_addr,
            self.config.storage_dir.display()
        );

        let controller_lost = Arc::new(AtomicBool::new(false));
        {
            let agent = Arc::clone(&agent);
            let lost = Arc::clone(&controller_lost);
            let shutdown = self.acceptor.shutdown_handle();
            thread::Builder::new()
                .name("controller-link".to_string())
                .spawn(move || {
                    controller_loop(reader, &agent);
                    lost.store(true, Ordering::SeqCst);
                    shutdown.shutdown();
                })?;
        }

        let timeout_ms = self.config.timeout_ms;
        let result = self.acceptor.run("dstore", move |stream| {
            serve_client(stream, &agent, timeout_ms);
        });

        // Make sure the controller sees us leave
        controller.close();

        if controller_lost.load(Ordering::SeqCst) {
            tracing::error!("Lost connection to the controller");
            return Err(StoreError::NodeUnavailable("controller connection lost".to_string()));
        }
        result
    }

    /// Run on a background thread
    pub fn spawn(self) -> Result<thread::JoinHandle<Result<()>>> {
        Ok(thread::Builder::new()
            .name("dstore".to_string())
            .spawn(move || self.run())?)
    }
}

/// Execute controller commands until the connection drops
fn controller_loop(mut reader: MessageReader, agent: &StorageAgent) {
    loop {
        match reader.read_message() {
            Ok(Message::Remove { name }) => {
                if let Err(e) = agent.handle_remove(&name) {
                    tracing::warn!("Remove of {} failed: {}", name, e);
                }
            }
            Ok(other) => tracing::warn!("Unexpected message from controller: {:?}", other),
            Err(StoreError::MalformedMessage(m)) => {
                tracing::warn!("Malformed message from controller: {}", m);
            }
            Err(e) => {
                tracing::debug!("Controller connection ended: {}", e);
                return;
            }
        }
    }
}

/// One data connection carries one STORE or LOAD, then closes
fn serve_client(stream: TcpStream, agent: &StorageAgent, timeout_ms: u64) {
    let mut conn = match Connection::new(stream) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Could not set up client connection: {}", e);
            return;
        }
    };
    if let Err(e) = conn.set_timeouts(timeout_ms, timeout_ms) {
        tracing::warn!("Could not set timeouts for {}: {}", conn.peer_addr(), e);
        return;
    }

    let result = match conn.read_message() {
        Ok(Message::Store { name, size }) => agent.handle_store(&mut conn, &name, size),
        Ok(Message::Load { name }) => agent.handle_load(&mut conn, &name),
        Ok(other) => Err(StoreError::MalformedMessage(format!(
            "{} is not a data request",
            other.token().as_str()
        ))),
        Err(e) if e.is_disconnect() => Ok(()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::warn!("Client request from {} failed: {}", conn.peer_addr(), e);
    }
}
