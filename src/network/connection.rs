//! Connection Handler
//!
//! Buffered line + payload I/O over a single TCP stream, and the split
//! reader/writer halves used by long-lived controller connections.

use std::io::{BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::protocol::{copy_payload, read_message, write_message, write_payload, Message};
use super::MessageSink;

/// Process-unique connection identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl ConnId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ConnId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single duplex connection
pub struct Connection {
    id: ConnId,

    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Wrap an accepted or connected stream
    ///
    /// Sets up buffered I/O and disables Nagle's algorithm
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            id: ConnId::next(),
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            peer_addr,
        })
    }

    /// Connect to `addr`, giving up after `timeout`
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for candidate in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::new(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => StoreError::Io(e),
            None => StoreError::NodeUnavailable("address resolved to nothing".to_string()),
        })
    }

    /// Configure connection timeouts (zero leaves blocking I/O)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Read the next control line
    pub fn read_message(&mut self) -> Result<Message> {
        let message = read_message(&mut self.reader)?;
        tracing::trace!("Received from {}: {:?}", self.peer_addr, message);
        Ok(message)
    }

    /// Send a control line
    pub fn send(&mut self, message: &Message) -> Result<()> {
        tracing::trace!("Sending to {}: {:?}", self.peer_addr, message);
        write_message(&mut self.writer, message)
    }

    /// Stream exactly `size` raw bytes following a control line into `out`
    pub fn copy_payload<W: Write>(&mut self, size: u64, out: &mut W) -> Result<u64> {
        copy_payload(&mut self.reader, size, out)
    }

    /// Write raw bytes
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        write_payload(&mut self.writer, payload)
    }

    /// Split into a reading half and a shareable sending half
    pub fn into_split(self) -> (MessageReader, Peer) {
        let reader = MessageReader {
            reader: self.reader,
            peer_addr: self.peer_addr.clone(),
        };
        let peer = Peer {
            id: self.id,
            writer: Arc::new(Mutex::new(self.writer)),
            closed: Arc::new(AtomicBool::new(false)),
            peer_addr: self.peer_addr,
        };
        (reader, peer)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Local address of the underlying socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.reader.get_ref().local_addr()?)
    }
}

/// Reading half of a split connection
pub struct MessageReader {
    reader: BufReader<TcpStream>,
    peer_addr: String,
}

impl MessageReader {
    pub fn read_message(&mut self) -> Result<Message> {
        let message = read_message(&mut self.reader)?;
        tracing::trace!("Received from {}: {:?}", self.peer_addr, message);
        Ok(message)
    }
}

/// Sending half of a split connection
///
/// Cloneable; concurrent senders are serialized by the writer lock so
/// lines never interleave.
///
/// A failed write (a timed-out one included) closes the connection: a
/// partly written line cannot be resumed, and the reading half then sees
/// the peer as gone.
#[derive(Clone)]
pub struct Peer {
    id: ConnId,
    writer: Arc<Mutex<BufWriter<TcpStream>>>,
    closed: Arc<AtomicBool>,
    peer_addr: String,
}

impl Peer {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

impl MessageSink for Peer {
    fn send(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed",
            )));
        }

        tracing::trace!("Sending to {}: {:?}", self.peer_addr, message);
        let mut writer = self.writer.lock();
        let result = write_message(&mut *writer, message);
        if let Err(e) = &result {
            tracing::debug!("Write to {} failed, closing: {}", self.peer_addr, e);
            self.closed.store(true, Ordering::SeqCst);
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
        result
    }

    fn close(&self) {
        let mut writer = self.writer.lock();
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = writer.flush();
        }
        let _ = writer.get_ref().shutdown(Shutdown::Both);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
