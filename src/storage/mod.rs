//! Storage Module
//!
//! Memory-mapped files, the on-disk layout, the hash index and the data log.
//!
//! ## File Layout
//! ```text
//! ┌────────────────────────────────────────┐
//! │ FileHeader (40)                        │
//! ├────────────────────────────────────────┤
//! │ Table descriptors (table_len × 24)     │  index files only
//! ├────────────────────────────────────────┤
//! │ Bucket arrays / records, in the order  │
//! │ they were allocated from data_tail     │
//! └────────────────────────────────────────┘
//! ```
//!
//! A store is either one combined file (index and data interleaved, one
//! allocation cursor) or a split pair of index and data files. The choice is
//! made once at open and captured by [`Storage`].

pub mod file;
pub mod index;
pub mod layout;
pub mod log;

pub use file::{AccessHint, MappedFile};
pub use index::{HashIndex, Probe};
pub use layout::{Bucket, FileHeader, RecordHeader, TableDesc};
pub use log::{LogEntry, LogScanner};

use crate::error::Result;

/// The files backing a store
pub enum Storage {
    /// Index and data share one file and one allocation cursor
    Combined(MappedFile),

    /// Index and data live in separate files
    Split { index: MappedFile, data: MappedFile },
}

impl Storage {
    pub fn is_combined(&self) -> bool {
        matches!(self, Storage::Combined(_))
    }

    /// File holding the table descriptors and bucket arrays
    pub fn index(&self) -> &MappedFile {
        match self {
            Storage::Combined(file) => file,
            Storage::Split { index, .. } => index,
        }
    }

    pub fn index_mut(&mut self) -> &mut MappedFile {
        match self {
            Storage::Combined(file) => file,
            Storage::Split { index, .. } => index,
        }
    }

    /// File holding the records
    pub fn data(&self) -> &MappedFile {
        match self {
            Storage::Combined(file) => file,
            Storage::Split { data, .. } => data,
        }
    }

    pub fn data_mut(&mut self) -> &mut MappedFile {
        match self {
            Storage::Combined(file) => file,
            Storage::Split { data, .. } => data,
        }
    }

    /// Flush every mapped byte to disk
    pub fn sync(&self) -> Result<()> {
        match self {
            Storage::Combined(file) => file.sync(0, file.size()),
            Storage::Split { index, data } => {
                index.sync(0, index.size())?;
                data.sync(0, data.size())
            }
        }
    }

    /// Close every file
    ///
    /// Both files of a split store are always closed; the first error is
    /// returned.
    pub fn close(self) -> Result<()> {
        match self {
            Storage::Combined(file) => file.close(),
            Storage::Split { index, data } => {
                let index_result = index.close();
                let data_result = data.close();
                index_result.and(data_result)
            }
        }
    }
}
