//! Iteration
//!
//! A cursor walks the index in table order, then bucket-slot order, and
//! yields every bucket whose record has a non-empty value. The order has
//! nothing to do with insertion or key order.
//!
//! A cursor is only meaningful against an index that is not being resized.
//! `Entries` borrows the engine, which rules out concurrent mutation; a bare
//! `Cursor` kept across a `put` may skip or repeat entries.

use crate::engine::Engine;
use crate::error::{KvError, Result};
use crate::hash::key_hash;
use crate::storage::{log, HashIndex, Probe, RecordHeader};

/// Position of an iteration: next bucket to inspect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    table: u64,
    bucket: u64,
}

impl Cursor {
    /// Table the cursor is in
    pub fn table(&self) -> u64 {
        self.table
    }

    /// Next bucket slot to inspect within the table
    pub fn bucket(&self) -> u64 {
        self.bucket
    }
}

/// Stored lengths of the record returned by [`Engine::iter_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLen {
    pub key_len: usize,
    pub value_len: usize,
}

impl Engine {
    /// Create a cursor at the start of the index, or at the bucket of `key`
    ///
    /// Positioning at a key fails with `KeyNotFound` when the index holds no
    /// bucket for it. An empty key starts from the beginning.
    pub fn iter_start(&self, key: Option<&[u8]>) -> Result<Cursor> {
        let key = match key {
            Some(key) if !key.is_empty() => key,
            _ => return Ok(Cursor::default()),
        };

        let hash = key_hash(key);
        let table_index = self.index.table_for(hash);
        let table = self.index.read_table(self.storage.index(), table_index)?;

        let data = self.storage.data();
        let probe = HashIndex::probe(self.storage.index(), &table, hash, |bucket| {
            log::key_matches(data, bucket.off, key)
        })?;

        match probe {
            Probe::Found { slot, .. } => Ok(Cursor {
                table: table_index,
                bucket: slot,
            }),
            _ => Err(KvError::KeyNotFound),
        }
    }

    /// Move the cursor past the next live record and return where it is
    fn advance(&self, cursor: &mut Cursor) -> Result<Option<(u64, RecordHeader)>> {
        let index_file = self.storage.index();
        let data = self.storage.data();

        while cursor.table < self.index.table_len() {
            let table = self.index.read_table(index_file, cursor.table)?;

            while cursor.bucket < table.bucket_len {
                let bucket = HashIndex::read_bucket(index_file, &table, cursor.bucket)?;
                cursor.bucket += 1;

                if bucket.is_empty() {
                    continue;
                }
                let header = log::record_header(data, bucket.off)?;
                if header.vlen == 0 {
                    continue;
                }
                return Ok(Some((bucket.off, header)));
            }

            cursor.table += 1;
            cursor.bucket = 0;
        }

        Ok(None)
    }

    /// Copy the next live record into the caller's buffers
    ///
    /// Copies at most `key_buf.len()` / `value_buf.len()` bytes but reports
    /// the stored lengths. Returns `None` once every table is exhausted.
    pub fn iter_next(
        &self,
        cursor: &mut Cursor,
        key_buf: &mut [u8],
        value_buf: &mut [u8],
    ) -> Result<Option<EntryLen>> {
        let Some((off, header)) = self.advance(cursor)? else {
            return Ok(None);
        };

        let data = self.storage.data();
        let key_len = log::read_key_into(data, off, &header, key_buf)?;
        let value_len = log::read_value_into(data, off, &header, value_buf)?;

        Ok(Some(EntryLen { key_len, value_len }))
    }

    /// Iterate every live `(key, value)` pair
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            engine: self,
            cursor: Cursor::default(),
            done: false,
        }
    }

    /// Iterate live pairs starting at the bucket of `key`
    pub fn entries_from(&self, key: &[u8]) -> Result<Entries<'_>> {
        Ok(Entries {
            engine: self,
            cursor: self.iter_start(Some(key))?,
            done: false,
        })
    }
}

/// Borrowing iterator over live records
pub struct Entries<'a> {
    engine: &'a Engine,
    cursor: Cursor,
    done: bool,
}

impl<'a> Entries<'a> {
    /// Current cursor position
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let step = self
            .engine
            .advance(&mut self.cursor)
            .and_then(|found| match found {
                Some((off, _)) => log::read_record(self.engine.storage.data(), off).map(Some),
                None => Ok(None),
            });

        match step {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
