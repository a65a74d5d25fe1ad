//! Hash Index
//!
//! The index is an array of `table_len` table descriptors, each pointing at
//! its own open-addressed bucket array inside the index file. A key goes to
//! table `hash % table_len` and is probed linearly from `hash % bucket_len`.
//!
//! Tables grow one at a time: a resize builds a fresh, larger bucket array,
//! rehashes every occupied bucket into it, and only then repoints the table
//! descriptor. The old array is never touched and simply becomes garbage.
//!
//! ## Combined files
//! When index and data share a file, every bucket array is preceded by a
//! record header with `klen = 0` and `vlen = array size`, so a sequential scan
//! of the data log can step over it like a record.

use crate::error::{KvError, Result};

use super::file::MappedFile;
use super::layout::{Bucket, Layout, RecordHeader, TableDesc};

/// Outcome of a linear probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// A bucket whose record matches the probed key
    Found { slot: u64, bucket: Bucket },

    /// The first empty bucket on the probe path
    Vacant { slot: u64 },

    /// Every bucket was visited without a match or a hole
    Exhausted,
}

/// Addressing for the table descriptor array
#[derive(Debug, Clone, Copy)]
pub struct HashIndex {
    table_off: u64,
    table_len: u64,
    embed_markers: bool,
}

impl HashIndex {
    /// Allocate `tables` descriptors, each with a zeroed array of `buckets`
    ///
    /// Records the descriptor array in the file header.
    pub fn create(
        file: &mut MappedFile,
        tables: u64,
        buckets: u64,
        embed_markers: bool,
    ) -> Result<Self> {
        let bytes = tables
            .checked_mul(TableDesc::SIZE as u64)
            .ok_or_else(|| KvError::Config(format!("too many tables: {}", tables)))?;
        let table_off = file.calloc(bytes)?;

        let mut header = file.header()?;
        header.table_off = table_off;
        header.table_len = tables;
        file.set_header(&header)?;

        let index = Self {
            table_off,
            table_len: tables,
            embed_markers,
        };
        for i in 0..tables {
            index.resize(file, i, buckets)?;
        }

        Ok(index)
    }

    /// Addressing for an existing index
    pub fn load(table_off: u64, table_len: u64, embed_markers: bool) -> Self {
        Self {
            table_off,
            table_len,
            embed_markers,
        }
    }

    pub fn table_len(&self) -> u64 {
        self.table_len
    }

    /// Offset of the first byte after the descriptor array
    pub fn tables_end(&self) -> u64 {
        self.table_off + self.table_len * TableDesc::SIZE as u64
    }

    /// Table responsible for `hash`
    #[inline]
    pub fn table_for(&self, hash: u64) -> u64 {
        hash % self.table_len
    }

    // =========================================================================
    // Fixed-size Record I/O
    // =========================================================================

    fn table_offset(&self, i: u64) -> u64 {
        self.table_off + i * TableDesc::SIZE as u64
    }

    pub fn read_table(&self, file: &MappedFile, i: u64) -> Result<TableDesc> {
        file.read_struct(self.table_offset(i))
    }

    pub fn write_table(&self, file: &mut MappedFile, i: u64, table: &TableDesc) -> Result<()> {
        file.write_struct(self.table_offset(i), table)
    }

    pub fn read_bucket(file: &MappedFile, table: &TableDesc, i: u64) -> Result<Bucket> {
        file.read_struct(table.bucket_off + i * Bucket::SIZE as u64)
    }

    pub fn write_bucket(
        file: &mut MappedFile,
        table: &TableDesc,
        i: u64,
        bucket: &Bucket,
    ) -> Result<()> {
        file.write_struct(table.bucket_off + i * Bucket::SIZE as u64, bucket)
    }

    // =========================================================================
    // Probing & Resize
    // =========================================================================

    /// Walk the probe sequence for `hash` in `table`
    ///
    /// `matches` is asked about every occupied bucket carrying `hash` and
    /// decides whether its record is the one being looked for.
    pub fn probe<F>(file: &MappedFile, table: &TableDesc, hash: u64, mut matches: F) -> Result<Probe>
    where
        F: FnMut(&Bucket) -> Result<bool>,
    {
        if table.bucket_len == 0 {
            return Ok(Probe::Exhausted);
        }

        let mut slot = hash % table.bucket_len;
        for _ in 0..table.bucket_len {
            let bucket = Self::read_bucket(file, table, slot)?;

            if bucket.is_empty() {
                return Ok(Probe::Vacant { slot });
            }
            if bucket.hash == hash && matches(&bucket)? {
                return Ok(Probe::Found { slot, bucket });
            }

            slot = (slot + 1) % table.bucket_len;
        }

        Ok(Probe::Exhausted)
    }

    /// Rebuild table `i` with `bucket_len` buckets and return its new descriptor
    pub fn resize(&self, file: &mut MappedFile, i: u64, bucket_len: u64) -> Result<TableDesc> {
        let array_bytes = bucket_len
            .checked_mul(Bucket::SIZE as u64)
            .filter(|bytes| u32::try_from(*bytes).is_ok() || !self.embed_markers)
            .ok_or_else(|| KvError::Config(format!("bucket array too large: {}", bucket_len)))?;

        let bucket_off = if self.embed_markers {
            let marker_off = file.calloc(RecordHeader::SIZE as u64 + array_bytes)?;
            let marker = RecordHeader {
                klen: 0,
                vlen: array_bytes as u32,
            };
            file.write_struct(marker_off, &marker)?;
            marker_off + RecordHeader::SIZE as u64
        } else {
            file.calloc(array_bytes)?
        };

        let old = self.read_table(file, i)?;
        let new = TableDesc {
            bucket_off,
            bucket_key: old.bucket_key,
            bucket_len,
        };

        for j in 0..old.bucket_len {
            let bucket = Self::read_bucket(file, &old, j)?;
            if bucket.is_empty() {
                continue;
            }

            match Self::probe(file, &new, bucket.hash, |_| Ok(false))? {
                Probe::Vacant { slot } => Self::write_bucket(file, &new, slot, &bucket)?,
                _ => {
                    return Err(KvError::Format(format!(
                        "table {} holds more entries than {} buckets",
                        i, bucket_len
                    )))
                }
            }
        }

        self.write_table(file, i, &new)?;

        if old.bucket_len > 0 {
            tracing::debug!(
                table = i,
                old_buckets = old.bucket_len,
                new_buckets = bucket_len,
                entries = new.bucket_key,
                "Resized hash table"
            );
        }
        Ok(new)
    }
}
