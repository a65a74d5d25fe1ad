//! Network Module
//!
//! TCP front-end for an [`Engine`](crate::engine::Engine).
//!
//! ## Architecture
//! - One acceptor loop polling a non-blocking listener
//! - One thread per client; buffers live in its `Connection`
//! - The engine sits behind a mutex held for exactly one command

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
