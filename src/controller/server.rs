//! Controller TCP Server
//!
//! Accepts client and node connections, decodes their lines on one thread
//! each, and funnels everything into the single dispatch thread.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::cluster::NodeId;
use crate::config::ControllerConfig;
use crate::error::{Result, StoreError};
use crate::network::{Acceptor, ConnId, Connection, MessageReader, MessageSink, ShutdownHandle};
use crate::protocol::Message;

use super::{ClientRef, Inbound, ProtocolEngine};

/// TCP front end of the controller
pub struct ControllerServer {
    acceptor: Acceptor,
    engine: Arc<ProtocolEngine>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
}

impl ControllerServer {
    /// Bind the listening socket and build the engine
    pub fn bind(config: ControllerConfig) -> Result<Self> {
        let acceptor = Acceptor::bind(&config.listen_addr)?;
        let engine = Arc::new(ProtocolEngine::new(config)?);
        let (inbound_tx, inbound_rx) = unbounded();

        Ok(Self {
            acceptor,
            engine,
            inbound_tx,
            inbound_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.acceptor.shutdown_handle()
    }

    pub fn engine(&self) -> Arc<ProtocolEngine> {
        Arc::clone(&self.engine)
    }

    /// Serve until shut down (blocking)
    pub fn run(self) -> Result<()> {
        let config = self.engine.config();
        tracing::info!(
            "Controller listening on {} (r={}, timeout={}ms, rebalance period={}s)",
            self.acceptor.local_addr(),
            config.replication_factor,
            config.timeout_ms,
            config.rebalance_period_s
        );

        let dispatcher = {
            let engine = Arc::clone(&self.engine);
            let inbound = self.inbound_rx;
            thread::Builder::new()
                .name("dispatch".to_string())
                .spawn(move || {
                    for event in inbound.iter() {
                        engine.handle(event);
                    }
                })?
        };

        let engine = self.engine;
        let inbound_tx = self.inbound_tx;
        let result = self.acceptor.run("controller", move |stream| {
            serve_connection(stream, &engine, &inbound_tx);
        });

        // Live connection threads still hold queue senders; the dispatcher
        // keeps running for them and exits with the process.
        drop(dispatcher);
        result
    }

    /// Run on a background thread
    pub fn spawn(self) -> Result<thread::JoinHandle<Result<()>>> {
        Ok(thread::Builder::new()
            .name("controller".to_string())
            .spawn(move || self.run())?)
    }
}

/// Every connection is a client until it says JOIN
fn serve_connection(stream: TcpStream, engine: &Arc<ProtocolEngine>, inbound: &Sender<Inbound>) {
    let mut connection = match Connection::new(stream) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Could not set up connection: {}", e);
            return;
        }
    };

    // Replies are written from the dispatch thread; a peer that stops
    // reading must not stall it past one ack timeout
    if let Err(e) = connection.set_timeouts(0, engine.config().timeout_ms) {
        tracing::warn!("Could not set timeouts for {}: {}", connection.peer_addr(), e);
        return;
    }
    let conn = connection.id();
    let peer_addr = connection.peer_addr().to_string();
    let (mut reader, peer) = connection.into_split();
    let sink: Arc<dyn MessageSink> = Arc::new(peer);

    tracing::debug!("Connection {} established from {}", conn, peer_addr);

    match reader.read_message() {
        Ok(Message::Join { port }) => {
            serve_node(NodeId(port), conn, reader, sink, engine, inbound);
        }
        Ok(first) => {
            let client = ClientRef::new(conn, sink);
            serve_client(client, first, reader, inbound);
        }
        Err(e) if e.is_disconnect() => {
            tracing::debug!("Connection {} closed before saying anything", conn);
        }
        Err(e) => {
            // Treat as a client that opened with garbage
            tracing::warn!("Could not handle message from {}: {}", peer_addr, e);
            let client = ClientRef::new(conn, sink);
            client_loop(&client, reader, inbound);
        }
    }
}

fn serve_node(
    node: NodeId,
    conn: ConnId,
    mut reader: MessageReader,
    sink: Arc<dyn MessageSink>,
    engine: &ProtocolEngine,
    inbound: &Sender<Inbound>,
) {
    if inbound.send(Inbound::NodeJoined { port: node.port(), conn, sink }).is_err() {
        return;
    }

    loop {
        match reader.read_message() {
            Ok(message) => engine.node_message(node, conn, message),
            Err(StoreError::MalformedMessage(m)) => {
                tracing::warn!("Malformed message from node {}: {}", node, m);
            }
            Err(e) => {
                if e.is_disconnect() {
                    tracing::debug!("Node {} disconnected", node);
                } else {
                    tracing::warn!("Could not read message from node {}: {}", node, e);
                }
                break;
            }
        }
    }

    let _ = inbound.send(Inbound::NodeLeft { node, conn });
}

fn serve_client(client: ClientRef, first: Message, reader: MessageReader, inbound: &Sender<Inbound>) {
    if inbound
        .send(Inbound::Request {
            client: client.clone(),
            message: first,
        })
        .is_err()
    {
        return;
    }
    client_loop(&client, reader, inbound);
}

fn client_loop(client: &ClientRef, mut reader: MessageReader, inbound: &Sender<Inbound>) {
    loop {
        if client.sink.is_closed() {
            tracing::debug!("Client {} stopped reading replies", client.conn);
            break;
        }
        match reader.read_message() {
            Ok(message) => {
                let event = Inbound::Request {
                    client: client.clone(),
                    message,
                };
                if inbound.send(event).is_err() {
                    return;
                }
            }
            Err(StoreError::MalformedMessage(m)) => {
                tracing::warn!("Malformed message from client {}: {}", client.conn, m);
            }
            Err(e) => {
                if !e.is_disconnect() {
                    tracing::warn!("Could not read message from client {}: {}", client.conn, e);
                }
                break;
            }
        }
    }

    tracing::debug!("Client {} disconnected", client.conn);
    let _ = inbound.send(Inbound::ClientLeft { conn: client.conn });
}
