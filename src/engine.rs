//! Engine Module
//!
//! The key-value engine that composes the mapped files, the hash index and
//! the data log.
//!
//! ## Responsibilities
//! - Create or validate the store files on open
//! - Route put/get/del through the hash index to the data log
//! - Grow a table before it crosses the 50% load bound
//! - Report statistics and close all files as one step
//!
//! ## Concurrency Model: Single Writer
//!
//! The engine performs no locking. Mutating calls take `&mut self`, so within
//! safe Rust a put (and any resize it triggers) can never overlap a get or an
//! iteration. Embedders sharing an engine across threads wrap it in a mutex
//! that covers each call as a unit (see `network::Server`).

use std::path::Path;

use crate::config::Options;
use crate::error::{KvError, Result};
use crate::hash::key_hash;
use crate::storage::layout::{Layout, FORMAT_VERSION, MAGIC_COMBINED, MAGIC_DATA, MAGIC_INDEX};
use crate::storage::{
    log, AccessHint, Bucket, FileHeader, HashIndex, LogScanner, MappedFile, Probe, Storage,
    TableDesc,
};

/// Store statistics gathered by [`Engine::stat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Size of the data file in bytes
    pub file_size: u64,
    /// Most occupied buckets in any table
    pub table_max: u64,
    /// Fewest occupied buckets in any table
    pub table_min: u64,
    /// Occupied buckets across all tables
    pub table_total: u64,
    /// Bytes taken by the whole table descriptor array
    ///
    /// Counts every table, occupied or not (`table_len * 24`), rather than
    /// only tables holding entries.
    pub table_size: u64,
    /// Bucket capacity across all tables
    pub bucket_total: u64,
    /// Bytes taken by the live bucket arrays
    pub bucket_size: u64,
    /// Key plus value bytes of every live record
    pub data_size: u64,
}

/// The storage engine
pub struct Engine {
    /// Backing files, fixed at open
    pub(crate) storage: Storage,

    /// Table descriptor addressing
    pub(crate) index: HashIndex,

    /// Reject every mutating call
    read_only: bool,
}

impl Engine {
    /// Open or create a store
    ///
    /// `index_path` of `None` (or equal to `data_path`) keeps index and data
    /// in one file; otherwise two files are used. `options` decide the layout
    /// of a newly created store and are ignored for an existing one, except
    /// for `read_only`.
    pub fn open(data_path: &Path, index_path: Option<&Path>, options: &Options) -> Result<Self> {
        options.validate()?;
        let read_only = options.read_only;
        let min_size = FileHeader::SIZE as u64;

        let storage = match index_path.filter(|path| *path != data_path) {
            None => {
                let mut file = MappedFile::open(data_path, read_only, min_size)?;
                if file.created() {
                    Self::init_index(&mut file, MAGIC_COMBINED, options, true)?;
                }
                Self::validate(&file, MAGIC_COMBINED, true)?;
                Storage::Combined(file)
            }
            Some(index_path) => {
                let mut index = MappedFile::open(index_path, read_only, min_size)?;
                if index.created() {
                    Self::init_index(&mut index, MAGIC_INDEX, options, false)?;
                }
                Self::validate(&index, MAGIC_INDEX, true)?;

                let mut data = MappedFile::open(data_path, read_only, min_size)?;
                if data.created() {
                    Self::init_header(&mut data)?;
                    Self::seal(&mut data, MAGIC_DATA)?;
                }
                Self::validate(&data, MAGIC_DATA, false)?;

                Storage::Split { index, data }
            }
        };

        let header = storage.index().header()?;
        let index = HashIndex::load(header.table_off, header.table_len, storage.is_combined());

        let data = storage.data();
        data.advise(0, FileHeader::SIZE as u64, AccessHint::WillNeed)?;

        tracing::info!(
            data = %data.path().display(),
            combined = storage.is_combined(),
            tables = index.table_len(),
            read_only,
            "Opened store"
        );

        Ok(Self {
            storage,
            index,
            read_only,
        })
    }

    /// Open a combined-file store with default options
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(path, None, &Options::default())
    }

    // =========================================================================
    // Creation & Validation
    // =========================================================================

    /// Write a header with no magic yet; allocation starts at the file end
    fn init_header(file: &mut MappedFile) -> Result<()> {
        let header = FileHeader {
            magic: 0,
            version: FORMAT_VERSION,
            data_head: FileHeader::SIZE as u64,
            data_tail: file.size(),
            table_off: 0,
            table_len: 0,
        };
        file.set_header(&header)
    }

    fn init_index(
        file: &mut MappedFile,
        magic: u32,
        options: &Options,
        combined: bool,
    ) -> Result<()> {
        Self::init_header(file)?;
        HashIndex::create(file, options.tables, options.buckets, combined)?;
        Self::seal(file, magic)?;

        tracing::info!(
            path = %file.path().display(),
            tables = options.tables,
            buckets = options.buckets,
            "Created store index"
        );
        Ok(())
    }

    /// Stamp the magic last so a half-initialized file never validates
    fn seal(file: &mut MappedFile, magic: u32) -> Result<()> {
        let mut header = file.header()?;
        header.magic = magic;
        file.set_header(&header)
    }

    fn validate(file: &MappedFile, magic: u32, has_index: bool) -> Result<()> {
        let reject = |reason: String| -> Result<()> {
            tracing::warn!(path = %file.path().display(), %reason, "Rejected store file");
            Err(KvError::Format(format!("{}: {}", file.path().display(), reason)))
        };

        if file.size() < FileHeader::SIZE as u64 {
            return reject(format!("file of {} bytes has no header", file.size()));
        }

        let header = file.header()?;
        if header.magic != magic {
            return reject(format!("bad magic {:#010x}, expected {:#010x}", header.magic, magic));
        }
        if header.version != FORMAT_VERSION {
            return reject(format!(
                "unsupported version {}, expected {}",
                header.version, FORMAT_VERSION
            ));
        }
        if header.data_head > header.data_tail || header.data_tail > file.size() {
            return reject(format!(
                "data range {}..{} outside file of {} bytes",
                header.data_head,
                header.data_tail,
                file.size()
            ));
        }
        if has_index {
            let tables_end = header
                .table_len
                .checked_mul(TableDesc::SIZE as u64)
                .and_then(|bytes| bytes.checked_add(header.table_off));
            if header.table_len == 0 || tables_end.map_or(true, |end| end > file.size()) {
                return reject(format!(
                    "table array of {} entries at {} does not fit",
                    header.table_len, header.table_off
                ));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Key-Value Operations
    // =========================================================================

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(KvError::ReadOnly);
        }
        Ok(())
    }

    /// Locate the bucket holding `key`, if any
    fn find(&self, key: &[u8]) -> Result<Option<Bucket>> {
        let hash = key_hash(key);
        let table = self
            .index
            .read_table(self.storage.index(), self.index.table_for(hash))?;

        let data = self.storage.data();
        let probe = HashIndex::probe(self.storage.index(), &table, hash, |bucket| {
            log::key_matches(data, bucket.off, key)
        })?;

        match probe {
            Probe::Found { bucket, .. } => Ok(Some(bucket)),
            _ => Ok(None),
        }
    }

    /// Store `value` under `key`, superseding any earlier value
    ///
    /// The record is appended first, then the key's bucket is claimed or
    /// repointed. Only a newly claimed bucket counts towards occupancy.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_writable()?;

        let hash = key_hash(key);
        let table_index = self.index.table_for(hash);
        let mut table = self.index.read_table(self.storage.index(), table_index)?;

        if (table.bucket_key + 1) * 2 > table.bucket_len {
            let new_len = table.bucket_len.max(1) * 2;
            table = self
                .index
                .resize(self.storage.index_mut(), table_index, new_len)?;
        }

        let off = log::append(self.storage.data_mut(), key, value)?;
        let bucket = Bucket { hash, off };

        let data = self.storage.data();
        let probe = HashIndex::probe(self.storage.index(), &table, hash, |candidate| {
            log::key_matches(data, candidate.off, key)
        })?;

        match probe {
            Probe::Found { slot, .. } => {
                HashIndex::write_bucket(self.storage.index_mut(), &table, slot, &bucket)
            }
            Probe::Vacant { slot } => {
                HashIndex::write_bucket(self.storage.index_mut(), &table, slot, &bucket)?;
                table.bucket_key += 1;
                self.index
                    .write_table(self.storage.index_mut(), table_index, &table)
            }
            Probe::Exhausted => Err(KvError::Format(format!(
                "table {} has no free bucket",
                table_index
            ))),
        }
    }

    /// Copy the value of `key` into `buf` and return its stored length
    ///
    /// At most `buf.len()` bytes are copied; a return value larger than the
    /// buffer means the value was truncated. Returns 0 when the key is absent,
    /// deleted, or stores an empty value; the three cases look the same.
    pub fn get_into(&self, key: &[u8], buf: &mut [u8]) -> Result<usize> {
        match self.find(key)? {
            Some(bucket) => {
                let data = self.storage.data();
                let header = log::record_header(data, bucket.off)?;
                log::read_value_into(data, bucket.off, &header, buf)
            }
            None => Ok(0),
        }
    }

    /// Fetch the value of `key`
    ///
    /// `None` covers absent, deleted and empty values alike.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let Some(bucket) = self.find(key)? else {
            return Ok(None);
        };

        let data = self.storage.data();
        let header = log::record_header(data, bucket.off)?;
        if header.vlen == 0 {
            return Ok(None);
        }

        let mut value = vec![0u8; header.vlen as usize];
        log::read_value_into(data, bucket.off, &header, &mut value)?;
        Ok(Some(value))
    }

    /// Whether `key` currently maps to a non-empty value
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        match self.find(key)? {
            Some(bucket) => Ok(log::record_header(self.storage.data(), bucket.off)?.vlen > 0),
            None => Ok(false),
        }
    }

    /// Delete `key` by writing an empty value over it
    pub fn del(&mut self, key: &[u8]) -> Result<()> {
        self.put(key, &[])
    }

    // =========================================================================
    // Statistics & Scans
    // =========================================================================

    /// Gather index occupancy and live data size (walks every live record)
    pub fn stat(&self) -> Result<Stat> {
        let index_file = self.storage.index();
        let mut stat = Stat {
            file_size: self.storage.data().file_len()?,
            table_min: u64::MAX,
            ..Stat::default()
        };

        for i in 0..self.index.table_len() {
            let table = self.index.read_table(index_file, i)?;
            stat.table_max = stat.table_max.max(table.bucket_key);
            stat.table_min = stat.table_min.min(table.bucket_key);
            stat.table_total += table.bucket_key;
            stat.bucket_total += table.bucket_len;
        }
        stat.table_size = self.index.table_len() * TableDesc::SIZE as u64;
        stat.bucket_size = stat.bucket_total * Bucket::SIZE as u64;

        let mut cursor = self.iter_start(None)?;
        while let Some(lens) = self.iter_next(&mut cursor, &mut [], &mut [])? {
            stat.data_size += (lens.key_len + lens.value_len) as u64;
        }

        Ok(stat)
    }

    /// Scan the raw data log in append order, bypassing the index
    ///
    /// Yields every non-empty record ever written, superseded ones included.
    pub fn scan_log(&self) -> Result<LogScanner<'_>> {
        let data = self.storage.data();
        let header = data.header()?;
        let start = if self.storage.is_combined() {
            self.index.tables_end()
        } else {
            header.data_head
        };
        data.advise(
            start,
            header.data_tail.saturating_sub(start),
            AccessHint::Sequential,
        )?;
        Ok(LogScanner::new(data, start, header.data_tail))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush all mapped changes to disk
    ///
    /// A no-op for read-only stores.
    pub fn sync(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.storage.sync()
    }

    /// Sync and release every file
    pub fn close(self) -> Result<()> {
        tracing::debug!(combined = self.storage.is_combined(), "Closing store");
        self.storage.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether index and data share one file
    pub fn is_combined(&self) -> bool {
        self.storage.is_combined()
    }

    /// Number of hash tables
    pub fn table_len(&self) -> u64 {
        self.index.table_len()
    }

    /// Descriptor of table `i`
    pub fn table(&self, i: u64) -> Result<TableDesc> {
        if i >= self.index.table_len() {
            return Err(KvError::Config(format!(
                "table {} out of range ({} tables)",
                i,
                self.index.table_len()
            )));
        }
        self.index.read_table(self.storage.index(), i)
    }

    /// Table that `key` is routed to
    pub fn table_of(&self, key: &[u8]) -> u64 {
        self.index.table_for(key_hash(key))
    }
}
