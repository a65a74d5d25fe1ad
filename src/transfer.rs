//! Import / Export
//!
//! A portable dump of the live records: two lines per record, the key and
//! then the value, each as lowercase hex.
//!
//! ```text
//! 6b6579310a      <- key
//! 76616c756531    <- value
//! ```

use std::io::{BufRead, Write};

use crate::engine::Engine;
use crate::error::Result;

/// Write every live record to `writer`; returns the number written
pub fn export<W: Write>(engine: &Engine, mut writer: W) -> Result<u64> {
    let mut count = 0u64;
    for entry in engine.entries() {
        let (key, value) = entry?;
        writeln!(writer, "{}", hex::encode(&key))?;
        writeln!(writer, "{}", hex::encode(&value))?;
        count += 1;
    }
    writer.flush()?;

    tracing::info!(records = count, "Exported store");
    Ok(count)
}

/// Decode one hex line, dropping a trailing odd nibble
fn decode_line(line: &str) -> Result<Vec<u8>> {
    let bytes = line.trim_end_matches(['\r', '\n']).as_bytes();
    Ok(hex::decode(&bytes[..bytes.len() & !1])?)
}

/// Read key/value line pairs from `reader` and store them
///
/// Pairs whose key decodes to nothing are skipped. A key line without a
/// value line stores an empty value, which deletes the key. Returns the
/// number of records stored.
pub fn import<R: BufRead>(engine: &mut Engine, reader: R) -> Result<u64> {
    let mut lines = reader.lines();
    let mut count = 0u64;

    while let Some(key_line) = lines.next() {
        let key = decode_line(&key_line?)?;
        let value = match lines.next() {
            Some(line) => decode_line(&line?)?,
            None => Vec::new(),
        };

        if key.is_empty() {
            continue;
        }
        engine.put(&key, &value)?;
        count += 1;
    }

    tracing::info!(records = count, "Imported records");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_drops_odd_nibble() {
        assert_eq!(decode_line("6162").unwrap(), b"ab");
        assert_eq!(decode_line("61626").unwrap(), b"ab");
        assert_eq!(decode_line("6162\r\n").unwrap(), b"ab");
        assert_eq!(decode_line("").unwrap(), b"");
    }

    #[test]
    fn test_decode_line_rejects_bad_hex() {
        assert!(decode_line("zz").is_err());
    }

    #[test]
    fn test_decode_line_non_ascii_is_error() {
        // 'é' spans bytes 1..3, so the even cut falls inside it
        assert!(decode_line("a\u{e9}").is_err());
        assert!(decode_line("\u{e9}").is_err());
    }
}
