//! On-disk layout
//!
//! Fixed-size structures stored inside a mapped region. Every struct is
//! encoded with bincode using fixed-width integers in native byte order, so
//! the encoded size is exactly the sum of the field widths (no padding).
//!
//! ```text
//! FileHeader (40)  magic:u32 version:u32 data_head:u64 data_tail:u64 table_off:u64 table_len:u64
//! TableDesc  (24)  bucket_off:u64 bucket_key:u64 bucket_len:u64
//! Bucket     (16)  hash:u64 off:u64
//! Record          klen:u32 vlen:u32 key[klen] value[vlen]
//! ```

use bincode::Options as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Magic of a store keeping index and data in one file
pub const MAGIC_COMBINED: u32 = 0x0000_4244;

/// Magic of the index file in split mode
pub const MAGIC_INDEX: u32 = 0x5849_4244;

/// Magic of the data file in split mode
pub const MAGIC_DATA: u32 = 0x5444_4244;

/// Current format version
pub const FORMAT_VERSION: u32 = 2;

/// Byte offset of `data_tail` inside the header
pub(crate) const DATA_TAIL_OFFSET: u64 = 16;

fn codec() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_native_endian()
}

/// A fixed-size structure with a stable encoded width
pub trait Layout: Serialize + DeserializeOwned {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Encode into exactly `SIZE` bytes
    fn encode(&self) -> Result<Vec<u8>> {
        let bytes = codec().serialize(self)?;
        if bytes.len() != Self::SIZE {
            return Err(KvError::Serialization(format!(
                "encoded {} bytes, expected {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        Ok(bytes)
    }

    /// Decode from exactly `SIZE` bytes
    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(KvError::Serialization(format!(
                "decoding {} bytes, expected {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        Ok(codec().deserialize(bytes)?)
    }
}

/// Header at offset 0 of every mapped file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u32,
    /// First byte after the header
    pub data_head: u64,
    /// Bump-allocation cursor; never decreases
    pub data_tail: u64,
    /// Offset of the table descriptor array (index files only)
    pub table_off: u64,
    /// Number of tables (index files only)
    pub table_len: u64,
}

impl Layout for FileHeader {
    const SIZE: usize = 40;
}

/// Descriptor of one hash table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDesc {
    /// Offset of the bucket array
    pub bucket_off: u64,
    /// Occupied buckets
    pub bucket_key: u64,
    /// Bucket capacity
    pub bucket_len: u64,
}

impl Layout for TableDesc {
    const SIZE: usize = 24;
}

/// One index slot; `hash == 0` marks it empty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub hash: u64,
    pub off: u64,
}

impl Bucket {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hash == 0
    }
}

impl Layout for Bucket {
    const SIZE: usize = 16;
}

/// Length prefix of a data-log record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub klen: u32,
    pub vlen: u32,
}

impl RecordHeader {
    /// Total record size including this header
    pub fn record_len(&self) -> u64 {
        Self::SIZE as u64 + self.klen as u64 + self.vlen as u64
    }

    /// Offset of the key bytes for a record starting at `off`
    pub fn key_offset(off: u64) -> u64 {
        off + Self::SIZE as u64
    }

    /// Offset of the value bytes for a record starting at `off`
    pub fn value_offset(&self, off: u64) -> u64 {
        Self::key_offset(off) + self.klen as u64
    }
}

impl Layout for RecordHeader {
    const SIZE: usize = 8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_sizes_have_no_padding() {
        assert_eq!(FileHeader::default().encode().unwrap().len(), 40);
        assert_eq!(TableDesc::default().encode().unwrap().len(), 24);
        assert_eq!(Bucket::default().encode().unwrap().len(), 16);
        assert_eq!(RecordHeader::default().encode().unwrap().len(), 8);
    }

    #[test]
    fn test_header_field_positions() {
        let header = FileHeader {
            magic: MAGIC_COMBINED,
            version: FORMAT_VERSION,
            data_head: 40,
            data_tail: 0x1122_3344,
            table_off: 64,
            table_len: 4,
        };
        let bytes = header.encode().unwrap();

        assert_eq!(&bytes[0..4], &MAGIC_COMBINED.to_ne_bytes());
        assert_eq!(&bytes[4..8], &FORMAT_VERSION.to_ne_bytes());
        let tail = DATA_TAIL_OFFSET as usize;
        assert_eq!(&bytes[tail..tail + 8], &0x1122_3344u64.to_ne_bytes());
        assert_eq!(FileHeader::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_record_header_offsets() {
        let header = RecordHeader { klen: 3, vlen: 5 };
        assert_eq!(header.record_len(), 16);
        assert_eq!(RecordHeader::key_offset(100), 108);
        assert_eq!(header.value_offset(100), 111);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            Bucket::decode(&[0u8; 15]),
            Err(KvError::Serialization(_))
        ));
    }

    #[test]
    fn test_empty_bucket() {
        assert!(Bucket::default().is_empty());
        assert!(!Bucket { hash: 1, off: 0 }.is_empty());
    }
}
