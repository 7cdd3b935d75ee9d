//! TCP Acceptor
//!
//! Accepts connections and hands each one to its own thread.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::Result;

/// Listening socket plus the shutdown flag of its accept loop
pub struct Acceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
}

impl Acceptor {
    /// Bind the listening socket. Failure here is fatal for the process.
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                addr: local_addr,
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept until shut down, spawning one named thread per connection
    pub fn run<F>(self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(TcpStream) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        for stream in self.listener.incoming() {
            if self.shutdown.is_shutdown() {
                break;
            }

            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("Accept failed on {}: {}", self.local_addr, e);
                    continue;
                }
            };

            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("{}-conn", name))
                .spawn(move || handler(stream));
            if let Err(e) = spawned {
                tracing::warn!("Could not spawn connection thread: {}", e);
            }
        }

        tracing::debug!("Acceptor on {} stopped", self.local_addr);
        Ok(())
    }
}

/// Stops an accept loop from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            // Wake the blocking accept
            let _ = TcpStream::connect(self.addr);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
