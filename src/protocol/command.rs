//! Command definitions
//!
//! Requests parsed from a client.

use bytes::Bytes;

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a value
    Set { key: Bytes, value: Bytes },

    /// Fetch a value
    Get { key: Bytes },

    /// Delete a key
    Delete { key: Bytes },
}

impl Command {
    /// The key the command operates on
    pub fn key(&self) -> &Bytes {
        match self {
            Command::Set { key, .. } | Command::Get { key } | Command::Delete { key } => key,
        }
    }

    /// Protocol verb, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "set",
            Command::Get { .. } => "get",
            Command::Delete { .. } => "delete",
        }
    }
}
