//! Response definitions

use bytes::Bytes;

/// A reply line (plus data block for `Value`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `set` succeeded
    Stored,

    /// The request could not be carried out
    Error,

    /// One hit of a `get`; always followed by `End`
    Value { key: Bytes, data: Bytes },

    /// Terminates a `get` reply
    End,

    /// `delete` removed a live key
    Deleted,

    /// `delete` found nothing to remove
    NotFound,
}
