//! TCP Server
//!
//! Accepts connections and hands each to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::Connection;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::error::Result;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Decrements the live-connection count when a client thread ends
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// TCP server for a mapkv store
pub struct Server {
    config: ServerConfig,
    engine: Arc<Mutex<Engine>>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind the listen address and take ownership of the engine
    pub fn bind(config: ServerConfig, engine: Engine) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        tracing::info!(addr = %listener.local_addr()?, "Listening");

        Ok(Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops [`run`](Self::run) once set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Shared handle to the engine
    pub fn engine(&self) -> Arc<Mutex<Engine>> {
        Arc::clone(&self.engine)
    }

    /// Number of clients currently connected
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Accept clients until shutdown is signalled
    ///
    /// Clients beyond `max_connections` are dropped on accept. Client
    /// threads already running are left to finish on their own.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::Acquire) {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
            };

            if self.active.load(Ordering::Acquire) >= self.config.max_connections {
                tracing::warn!(
                    peer = %peer,
                    max = self.config.max_connections,
                    "Connection limit reached, dropping client"
                );
                continue;
            }

            if let Err(e) = self.spawn_connection(stream) {
                tracing::warn!(peer = %peer, error = %e, "Failed to set up connection");
            }
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    fn spawn_connection(&self, stream: std::net::TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;

        let mut connection = Connection::new(
            stream,
            Arc::clone(&self.engine),
            self.config.max_value_size,
        )?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;

        self.active.fetch_add(1, Ordering::AcqRel);
        let guard = ConnectionGuard(Arc::clone(&self.active));

        thread::Builder::new()
            .name(format!("mapkv-conn-{}", connection.peer_addr()))
            .spawn(move || {
                let _guard = guard;
                // Errors are logged by the connection itself
                let _ = connection.handle();
            })?;

        Ok(())
    }
}
