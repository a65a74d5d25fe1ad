//! Connection Handler
//!
//! Owns one client socket and its read/write buffers.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::error::{KvError, Result};
use crate::protocol::{decode_command, encode_response, Command, Response};

const READ_CHUNK: usize = 16 * 1024;

/// Whether an I/O error just means the peer went away
fn is_disconnect(err: &KvError) -> bool {
    match err {
        KvError::Io(e) => matches!(
            e.kind(),
            ErrorKind::UnexpectedEof
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::BrokenPipe
                | ErrorKind::WouldBlock
                | ErrorKind::TimedOut
        ),
        _ => false,
    }
}

/// Handles a single client connection
pub struct Connection {
    stream: TcpStream,

    /// Bytes received but not yet decoded
    read_buf: BytesMut,

    /// Encoded replies not yet written
    write_buf: BytesMut,

    engine: Arc<Mutex<Engine>>,

    max_value_size: usize,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream, engine: Arc<Mutex<Engine>>, max_value_size: usize) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
            engine,
            max_value_size,
            peer_addr,
        })
    }

    /// Configure socket timeouts; zero leaves a direction unbounded
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.stream
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.stream
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Serve requests until the client disconnects or misbehaves
    ///
    /// A disconnect or timeout ends the connection with `Ok`. Protocol and
    /// engine errors are returned after whatever reply was due was sent.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!(peer = %self.peer_addr, "Connection established");

        match self.serve() {
            Err(ref e) if is_disconnect(e) => {
                tracing::debug!(peer = %self.peer_addr, "Client disconnected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(peer = %self.peer_addr, error = %e, "Closing connection");
                Err(e)
            }
            Ok(()) => {
                tracing::debug!(peer = %self.peer_addr, "Client disconnected");
                Ok(())
            }
        }
    }

    fn serve(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            while let Some(command) = decode_command(&mut self.read_buf, self.max_value_size)? {
                tracing::trace!(
                    peer = %self.peer_addr,
                    command = command.name(),
                    key_len = command.key().len(),
                    "Received command"
                );

                if let Err(e) = self.execute(command) {
                    self.write_response(&Response::Error);
                    self.flush()?;
                    return Err(e);
                }
            }
            self.flush()?;

            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Run one command under the engine lock and queue its reply
    fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Set { key, value } => {
                self.engine.lock().put(&key, &value)?;
                self.write_response(&Response::Stored);
            }
            Command::Get { key } => {
                let value = self.engine.lock().get(&key)?;
                if let Some(data) = value {
                    self.write_response(&Response::Value {
                        key,
                        data: Bytes::from(data),
                    });
                }
                self.write_response(&Response::End);
            }
            Command::Delete { key } => {
                let deleted = {
                    let mut engine = self.engine.lock();
                    if engine.contains(&key)? {
                        engine.del(&key)?;
                        true
                    } else {
                        false
                    }
                };
                self.write_response(if deleted {
                    &Response::Deleted
                } else {
                    &Response::NotFound
                });
            }
        }
        Ok(())
    }

    fn write_response(&mut self, response: &Response) {
        encode_response(response, &mut self.write_buf);
    }

    fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;
        self.write_buf.clear();
        Ok(())
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
