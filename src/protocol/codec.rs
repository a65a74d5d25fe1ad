//! Protocol codec
//!
//! Incremental decoding over a connection's read buffer. A decoder returns
//! `Ok(None)` while the buffer holds only part of a message and consumes
//! nothing until a whole message is available.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Command, Response};
use crate::error::{KvError, Result};

/// Longest key a client may send
pub const MAX_KEY_LEN: usize = 1023;

/// Longest command line (without its data block) the server will buffer
pub const MAX_LINE_LEN: usize = 2048;

const CRLF: &[u8] = b"\r\n";

fn protocol_error(msg: impl Into<String>) -> KvError {
    KvError::Protocol(msg.into())
}

/// Position of the first CRLF, or an error once the buffer outgrows a line
fn find_line_end(buf: &[u8]) -> Result<Option<usize>> {
    match buf.windows(2).position(|w| w == CRLF) {
        Some(pos) if pos > MAX_LINE_LEN => Err(protocol_error(format!(
            "line of {} bytes exceeds {}",
            pos, MAX_LINE_LEN
        ))),
        Some(pos) => Ok(Some(pos)),
        None if buf.len() > MAX_LINE_LEN => Err(protocol_error("unterminated line")),
        None => Ok(None),
    }
}

fn parse_len(token: &[u8]) -> Result<usize> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            protocol_error(format!(
                "invalid length {:?}",
                String::from_utf8_lossy(token)
            ))
        })
}

/// Total bytes of a line plus its `len`-byte data block and terminator
fn block_end(data_start: usize, len: usize) -> Result<usize> {
    data_start
        .checked_add(len)
        .and_then(|end| end.checked_add(CRLF.len()))
        .ok_or_else(|| protocol_error(format!("data block of {} bytes is too large", len)))
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_LEN {
        return Err(protocol_error(format!(
            "key of {} bytes exceeds {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Decode one request from the front of `buf`
///
/// Values larger than `max_value_size` are rejected before their data block
/// is buffered.
pub fn decode_command(buf: &mut BytesMut, max_value_size: usize) -> Result<Option<Command>> {
    let Some(line_end) = find_line_end(buf)? else {
        return Ok(None);
    };

    let tokens: Vec<&[u8]> = buf[..line_end]
        .split(|b| *b == b' ')
        .filter(|t| !t.is_empty())
        .collect();

    match tokens.as_slice() {
        [b"get", key] | [b"delete", key] => {
            check_key(key)?;
            let is_get = tokens[0] == b"get";
            let key = Bytes::copy_from_slice(key);
            buf.advance(line_end + CRLF.len());

            Ok(Some(if is_get {
                Command::Get { key }
            } else {
                Command::Delete { key }
            }))
        }
        [b"set", key, _flags, bytes] | [b"set", key, _flags, _, bytes] => {
            check_key(key)?;
            let len = parse_len(bytes)?;
            if len > max_value_size {
                return Err(protocol_error(format!(
                    "value of {} bytes exceeds {}",
                    len, max_value_size
                )));
            }

            let data_start = line_end + CRLF.len();
            let total = block_end(data_start, len)?;
            if buf.len() < total {
                buf.reserve(total - buf.len());
                return Ok(None);
            }
            if &buf[data_start + len..total] != CRLF {
                return Err(protocol_error("data block not terminated by CRLF"));
            }

            let key = Bytes::copy_from_slice(key);
            buf.advance(data_start);
            let value = buf.split_to(len).freeze();
            buf.advance(CRLF.len());

            Ok(Some(Command::Set { key, value }))
        }
        _ => Err(protocol_error(format!(
            "unrecognized request {:?}",
            String::from_utf8_lossy(&buf[..line_end])
        ))),
    }
}

/// Encode a request the way a client sends it
pub fn encode_command(command: &Command, buf: &mut BytesMut) {
    match command {
        Command::Set { key, value } => {
            buf.put_slice(b"set ");
            buf.put_slice(key);
            buf.put_slice(format!(" 0 0 {}\r\n", value.len()).as_bytes());
            buf.put_slice(value);
            buf.put_slice(CRLF);
        }
        Command::Get { key } => {
            buf.put_slice(b"get ");
            buf.put_slice(key);
            buf.put_slice(CRLF);
        }
        Command::Delete { key } => {
            buf.put_slice(b"delete ");
            buf.put_slice(key);
            buf.put_slice(CRLF);
        }
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Append the wire form of `response` to `buf`
pub fn encode_response(response: &Response, buf: &mut BytesMut) {
    match response {
        Response::Stored => buf.put_slice(b"STORED\r\n"),
        Response::Error => buf.put_slice(b"ERROR\r\n"),
        Response::End => buf.put_slice(b"END\r\n"),
        Response::Deleted => buf.put_slice(b"DELETED\r\n"),
        Response::NotFound => buf.put_slice(b"NOT_FOUND\r\n"),
        Response::Value { key, data } => {
            buf.reserve(key.len() + data.len() + 32);
            buf.put_slice(b"VALUE ");
            buf.put_slice(key);
            buf.put_slice(format!(" 0 {}\r\n", data.len()).as_bytes());
            buf.put_slice(data);
            buf.put_slice(CRLF);
        }
    }
}

/// Decode one reply from the front of `buf`
pub fn decode_response(buf: &mut BytesMut) -> Result<Option<Response>> {
    let Some(line_end) = find_line_end(buf)? else {
        return Ok(None);
    };

    let simple = match &buf[..line_end] {
        b"STORED" => Some(Response::Stored),
        b"ERROR" => Some(Response::Error),
        b"END" => Some(Response::End),
        b"DELETED" => Some(Response::Deleted),
        b"NOT_FOUND" => Some(Response::NotFound),
        _ => None,
    };
    if let Some(response) = simple {
        buf.advance(line_end + CRLF.len());
        return Ok(Some(response));
    }

    let tokens: Vec<&[u8]> = buf[..line_end]
        .split(|b| *b == b' ')
        .filter(|t| !t.is_empty())
        .collect();
    let [b"VALUE", key, _flags, bytes] = tokens.as_slice() else {
        return Err(protocol_error(format!(
            "unrecognized reply {:?}",
            String::from_utf8_lossy(&buf[..line_end])
        )));
    };

    let len = parse_len(bytes)?;
    let data_start = line_end + CRLF.len();
    let total = block_end(data_start, len)?;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[data_start + len..total] != CRLF {
        return Err(protocol_error("data block not terminated by CRLF"));
    }

    let key = Bytes::copy_from_slice(key);
    buf.advance(data_start);
    let data = buf.split_to(len).freeze();
    buf.advance(CRLF.len());

    Ok(Some(Response::Value { key, data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_line_waits() {
        let mut buf = BytesMut::from(&b"get ke"[..]);
        assert_eq!(decode_command(&mut buf, 1024).unwrap(), None);
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_partial_data_block_waits() {
        let mut buf = BytesMut::from(&b"set k 0 0 5\r\nhel"[..]);
        assert_eq!(decode_command(&mut buf, 1024).unwrap(), None);

        buf.extend_from_slice(b"lo\r\n");
        let cmd = decode_command(&mut buf, 1024).unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Set {
                key: Bytes::from_static(b"k"),
                value: Bytes::from_static(b"hello"),
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_missing_terminator_is_error() {
        let mut buf = BytesMut::from(&b"set k 0 0 2\r\nabXY"[..]);
        assert!(decode_command(&mut buf, 1024).is_err());
    }

    #[test]
    fn test_reply_length_overflow_is_error() {
        let mut buf = BytesMut::from(&b"VALUE k 0 18446744073709551615\r\nab\r\n"[..]);
        assert!(matches!(
            decode_response(&mut buf),
            Err(KvError::Protocol(_))
        ));
    }

    #[test]
    fn test_unterminated_line_overflow() {
        let mut buf = BytesMut::from(&vec![b'a'; MAX_LINE_LEN + 1][..]);
        assert!(decode_command(&mut buf, 1024).is_err());
    }
}
