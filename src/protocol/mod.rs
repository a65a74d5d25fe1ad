//! Protocol Module
//!
//! The line-oriented text protocol spoken by `mapkv-server`. It is the
//! storage subset of the memcached text protocol.
//!
//! ## Requests
//! ```text
//! set <key> <flags> <exptime> <bytes>\r\n<data>\r\n
//! set <key> <flags> <bytes>\r\n<data>\r\n
//! get <key>\r\n
//! delete <key>\r\n
//! ```
//!
//! `<flags>` and `<exptime>` are accepted and ignored.
//!
//! ## Replies
//! - `STORED`, `ERROR` for `set`
//! - `VALUE <key> 0 <bytes>\r\n<data>\r\n` followed by `END` for `get`
//! - `DELETED`, `NOT_FOUND` for `delete`
//!
//! Anything malformed is a protocol error; the server drops the connection
//! rather than trying to resynchronize.

mod codec;
mod command;
mod response;

pub use codec::{
    decode_command, decode_response, encode_command, encode_response, MAX_KEY_LEN, MAX_LINE_LEN,
};
pub use command::Command;
pub use response::Response;
