//! # mapkv
//!
//! An embeddable, memory-mapped key-value store with:
//! - A hash index of independently resizing open-addressed tables
//! - An append-only data log, never rewritten in place
//! - One combined file, or a split pair of index and data files
//! - A memcached-style TCP front-end
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               TCP Server / CLI / embedding code             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Engine                               │
//! │          put / get / del / iterate / stat                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Hash Index  │          │  Data Log   │
//!   │  (tables)   │─────────▶│  (append)   │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────────────────────────────┐
//!   │         Memory-mapped file(s)       │
//!   └─────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod hash;

pub mod engine;
pub mod iter;
pub mod network;
pub mod protocol;
pub mod storage;
pub mod transfer;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Options, ServerConfig};
pub use engine::{Engine, Stat};
pub use error::{KvError, Result};
pub use iter::{Cursor, Entries, EntryLen};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
