//! Data Log
//!
//! Append-only record storage. A record is written once and never modified:
//!
//! ```text
//! ┌──────────┬──────────┬───────────────┬─────────────────┐
//! │ klen u32 │ vlen u32 │ key (klen)    │ value (vlen)    │
//! └──────────┴──────────┴───────────────┴─────────────────┘
//! ```
//!
//! An overwrite or delete appends a new record and repoints the index; a delete
//! is a record with `vlen == 0`. Superseded records stay in the file forever.

use crate::error::{KvError, Result};

use super::file::MappedFile;
use super::layout::{Layout, RecordHeader};

/// Append a record and return its offset
pub fn append(file: &mut MappedFile, key: &[u8], value: &[u8]) -> Result<u64> {
    let header = RecordHeader {
        klen: u32::try_from(key.len()).map_err(|_| KvError::RecordTooLarge(key.len()))?,
        vlen: u32::try_from(value.len()).map_err(|_| KvError::RecordTooLarge(value.len()))?,
    };

    let off = file.alloc(header.record_len())?;
    file.write_struct(off, &header)?;
    file.write(RecordHeader::key_offset(off), key)?;
    file.write(header.value_offset(off), value)?;

    Ok(off)
}

/// Decode the length prefix of the record at `off`
pub fn record_header(file: &MappedFile, off: u64) -> Result<RecordHeader> {
    file.read_struct(off)
}

/// Whether the record at `off` stores exactly `key`
///
/// Compares the stored length first, then the bytes in place.
pub fn key_matches(file: &MappedFile, off: u64, key: &[u8]) -> Result<bool> {
    let header = record_header(file, off)?;
    if header.klen as usize != key.len() {
        return Ok(false);
    }
    Ok(file.compare(RecordHeader::key_offset(off), key)?.is_eq())
}

/// Copy a prefix of the record's key into `buf`; returns the stored length
pub fn read_key_into(
    file: &MappedFile,
    off: u64,
    header: &RecordHeader,
    buf: &mut [u8],
) -> Result<usize> {
    let n = buf.len().min(header.klen as usize);
    file.read(RecordHeader::key_offset(off), &mut buf[..n])?;
    Ok(header.klen as usize)
}

/// Copy a prefix of the record's value into `buf`; returns the stored length
pub fn read_value_into(
    file: &MappedFile,
    off: u64,
    header: &RecordHeader,
    buf: &mut [u8],
) -> Result<usize> {
    let n = buf.len().min(header.vlen as usize);
    file.read(header.value_offset(off), &mut buf[..n])?;
    Ok(header.vlen as usize)
}

/// Read a whole record
pub fn read_record(file: &MappedFile, off: u64) -> Result<(Vec<u8>, Vec<u8>)> {
    let header = record_header(file, off)?;
    let key = file
        .slice(RecordHeader::key_offset(off), header.klen as u64)?
        .to_vec();
    let value = file
        .slice(header.value_offset(off), header.vlen as u64)?
        .to_vec();
    Ok((key, value))
}

// =============================================================================
// Sequential Scan
// =============================================================================

/// A record found by a sequential scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Offset of the record header
    pub offset: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Walks the log in append order without consulting the index
///
/// Bucket-array markers (`klen == 0`) and tombstones (`vlen == 0`) are stepped
/// over. Superseded versions of a key are yielded too.
pub struct LogScanner<'a> {
    file: &'a MappedFile,
    pos: u64,
    end: u64,
    failed: bool,
}

impl<'a> LogScanner<'a> {
    /// Scan records between `start` and `end`
    pub fn new(file: &'a MappedFile, start: u64, end: u64) -> Self {
        Self {
            file,
            pos: start,
            end,
            failed: false,
        }
    }

    fn step(&mut self) -> Result<Option<LogEntry>> {
        while self.pos < self.end {
            let off = self.pos;
            if off + RecordHeader::SIZE as u64 > self.end {
                return Err(KvError::Format(format!("truncated record header at {}", off)));
            }

            let header = record_header(self.file, off)?;
            let next = off + header.record_len();
            if next > self.end {
                return Err(KvError::Format(format!("truncated record at {}", off)));
            }
            self.pos = next;

            if header.klen == 0 || header.vlen == 0 {
                continue;
            }

            let (key, value) = read_record(self.file, off)?;
            return Ok(Some(LogEntry {
                offset: off,
                key,
                value,
            }));
        }
        Ok(None)
    }
}

impl<'a> Iterator for LogScanner<'a> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
