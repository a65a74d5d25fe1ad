//! Mapped File
//!
//! Owns one memory-mapped file and hands out offset-addressed, bounds-checked
//! access to it. All addressing is by file offset; the mapping itself may be
//! replaced by any call that grows the file (`alloc`, `calloc`), so nothing
//! outside this type ever holds a pointer into it.
//!
//! ## Growth
//! `alloc` bumps `data_tail` (stored in the file header). When the request does
//! not fit, the file is truncated up to `(tail + len) * 2` and remapped. The new
//! mapping is created before the old one is dropped, so a failed remap leaves
//! the previous mapping in place.

use std::cmp::Ordering;
use std::fs::{File, OpenOptions};
use std::ops::Range;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::error::{KvError, Result};

use super::layout::{FileHeader, Layout, DATA_TAIL_OFFSET};

/// Access pattern hint passed to the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessHint {
    Normal,
    Sequential,
    Random,
    WillNeed,
}

/// The live mapping: shared read/write, or private read-only
enum Region {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Region {
    fn bytes(&self) -> &[u8] {
        match self {
            Region::ReadOnly(map) => &map[..],
            Region::ReadWrite(map) => &map[..],
        }
    }
}

/// A memory-mapped file with a bump allocator
pub struct MappedFile {
    /// Path the file was opened from
    path: PathBuf,

    /// Backing descriptor (needed for truncate + remap)
    file: File,

    /// Current mapping, covering the whole file
    region: Region,

    /// Whether the file was empty when opened
    created: bool,
}

impl MappedFile {
    /// Open (or create) the file and map it
    ///
    /// An empty file is first grown to `min_size`; a non-empty file is mapped
    /// as it is. Read-only opens never create the file and map it privately.
    pub fn open(path: &Path, read_only: bool, min_size: u64) -> Result<Self> {
        let file = if read_only {
            OpenOptions::new().read(true).open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?
        };

        let len = file.metadata()?.len();
        let created = len == 0;

        if created {
            if read_only {
                return Err(KvError::Format(format!(
                    "{} is empty and cannot be initialized read-only",
                    path.display()
                )));
            }
            file.set_len(min_size)?;
        }

        let region = Self::map(&file, read_only)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            region,
            created,
        })
    }

    fn map(file: &File, read_only: bool) -> Result<Region> {
        // Safety: the store assumes exclusive ownership of its files; nothing
        // else in this process truncates them while mapped.
        let region = if read_only {
            Region::ReadOnly(unsafe { MmapOptions::new().map_copy_read_only(file)? })
        } else {
            Region::ReadWrite(unsafe { MmapOptions::new().map_mut(file)? })
        };
        Ok(region)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file was empty (and therefore needs initializing) at open
    pub fn created(&self) -> bool {
        self.created
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.region, Region::ReadOnly(_))
    }

    /// Size of the current mapping in bytes
    pub fn size(&self) -> u64 {
        self.region.bytes().len() as u64
    }

    /// Size of the backing file as reported by the filesystem
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Decode the file header
    pub fn header(&self) -> Result<FileHeader> {
        self.read_struct(0)
    }

    /// Overwrite the file header
    pub fn set_header(&mut self, header: &FileHeader) -> Result<()> {
        self.write_struct(0, header)
    }

    /// Current bump-allocation cursor
    pub fn data_tail(&self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read(DATA_TAIL_OFFSET, &mut buf)?;
        Ok(u64::from_ne_bytes(buf))
    }

    fn set_data_tail(&mut self, tail: u64) -> Result<()> {
        self.write(DATA_TAIL_OFFSET, &tail.to_ne_bytes())
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Reserve `len` bytes at the tail, growing the file when needed
    ///
    /// Offsets returned earlier stay valid; the mapping does not.
    pub fn alloc(&mut self, len: u64) -> Result<u64> {
        if self.is_read_only() {
            return Err(KvError::ReadOnly);
        }

        let tail = self.data_tail()?;
        let end = tail.checked_add(len).ok_or(KvError::OutOfBounds {
            offset: tail,
            len,
            size: self.size(),
        })?;

        if end > self.size() {
            self.grow(end.saturating_mul(2))?;
        }

        self.set_data_tail(end)?;
        Ok(tail)
    }

    /// `alloc` followed by zero-filling the new range
    pub fn calloc(&mut self, len: u64) -> Result<u64> {
        let off = self.alloc(len)?;
        let range = self.range(off, len)?;
        self.bytes_mut()?[range].fill(0);
        Ok(off)
    }

    fn grow(&mut self, new_size: u64) -> Result<()> {
        let old_size = self.size();

        if let Region::ReadWrite(map) = &self.region {
            map.flush()?;
        }
        self.file.set_len(new_size)?;
        let region = Self::map(&self.file, false)?;
        self.region = region;

        tracing::debug!(
            path = %self.path.display(),
            old_size,
            new_size,
            "Grew mapped file"
        );
        Ok(())
    }

    // =========================================================================
    // Bounded Access
    // =========================================================================

    fn range(&self, offset: u64, len: u64) -> Result<Range<usize>> {
        let size = self.size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(offset as usize..end as usize),
            _ => Err(KvError::OutOfBounds { offset, len, size }),
        }
    }

    fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        match &mut self.region {
            Region::ReadWrite(map) => Ok(&mut map[..]),
            Region::ReadOnly(_) => Err(KvError::ReadOnly),
        }
    }

    /// Borrow `len` mapped bytes at `offset`
    ///
    /// The borrow ends before any growth can happen, so it never outlives the
    /// mapping it points into.
    pub fn slice(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.region.bytes()[range])
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.slice(offset, buf.len() as u64)?);
        Ok(())
    }

    /// Copy `data` into the mapping at `offset`
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let range = self.range(offset, data.len() as u64)?;
        self.bytes_mut()?[range].copy_from_slice(data);
        Ok(())
    }

    /// Compare mapped bytes at `offset` against `data` without copying
    pub fn compare(&self, offset: u64, data: &[u8]) -> Result<Ordering> {
        Ok(self.slice(offset, data.len() as u64)?.cmp(data))
    }

    /// Decode a fixed-size structure at `offset`
    pub fn read_struct<T: Layout>(&self, offset: u64) -> Result<T> {
        T::decode(self.slice(offset, T::SIZE as u64)?)
    }

    /// Encode a fixed-size structure at `offset`
    pub fn write_struct<T: Layout>(&mut self, offset: u64, value: &T) -> Result<()> {
        let bytes = value.encode()?;
        self.write(offset, &bytes)
    }

    // =========================================================================
    // Durability & Hints
    // =========================================================================

    /// Flush `len` bytes starting at `offset` to the file
    pub fn sync(&self, offset: u64, len: u64) -> Result<()> {
        let range = self.range(offset, len)?;
        match &self.region {
            Region::ReadWrite(map) => Ok(map.flush_range(range.start, range.len())?),
            Region::ReadOnly(_) => Err(KvError::ReadOnly),
        }
    }

    /// Hint the OS about the upcoming access pattern for a range
    ///
    /// Purely advisory; platforms without `madvise` ignore it.
    pub fn advise(&self, offset: u64, len: u64, hint: AccessHint) -> Result<()> {
        let range = self.range(offset, len)?;

        #[cfg(unix)]
        {
            use memmap2::Advice;

            let advice = match hint {
                AccessHint::Normal => Advice::Normal,
                AccessHint::Sequential => Advice::Sequential,
                AccessHint::Random => Advice::Random,
                AccessHint::WillNeed => Advice::WillNeed,
            };
            match &self.region {
                Region::ReadOnly(map) => map.advise_range(advice, range.start, range.len())?,
                Region::ReadWrite(map) => map.advise_range(advice, range.start, range.len())?,
            }
        }

        #[cfg(not(unix))]
        let _ = (range, hint);

        Ok(())
    }

    /// Sync the whole mapping, unmap, and close the descriptor
    pub fn close(self) -> Result<()> {
        if let Region::ReadWrite(map) = &self.region {
            map.flush()?;
        }
        tracing::debug!(path = %self.path.display(), "Closed mapped file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::layout::FileHeader;
    use tempfile::TempDir;

    fn open_fresh(dir: &TempDir) -> MappedFile {
        let path = dir.path().join("region.db");
        let mut file = MappedFile::open(&path, false, FileHeader::SIZE as u64).unwrap();
        let header = FileHeader {
            data_head: FileHeader::SIZE as u64,
            data_tail: file.size(),
            ..FileHeader::default()
        };
        file.set_header(&header).unwrap();
        file
    }

    #[test]
    fn test_open_creates_min_size() {
        let dir = TempDir::new().unwrap();
        let file = open_fresh(&dir);

        assert!(file.created());
        assert!(!file.is_read_only());
        assert_eq!(file.size(), 40);
        assert_eq!(file.data_tail().unwrap(), 40);
    }

    #[test]
    fn test_alloc_bumps_tail_and_grows() {
        let dir = TempDir::new().unwrap();
        let mut file = open_fresh(&dir);

        let off = file.alloc(10).unwrap();
        assert_eq!(off, 40);
        assert_eq!(file.data_tail().unwrap(), 50);
        assert_eq!(file.size(), 100);

        // Fits in the grown region without remapping
        let off = file.alloc(20).unwrap();
        assert_eq!(off, 50);
        assert_eq!(file.size(), 100);
        assert_eq!(file.file_len().unwrap(), 100);
    }

    #[test]
    fn test_offsets_survive_growth() {
        let dir = TempDir::new().unwrap();
        let mut file = open_fresh(&dir);

        let first = file.alloc(5).unwrap();
        file.write(first, b"hello").unwrap();

        let big = file.alloc(4096).unwrap();
        assert!(file.size() >= big + 4096);

        let mut buf = [0u8; 5];
        file.read(first, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_calloc_zero_fills() {
        let dir = TempDir::new().unwrap();
        let mut file = open_fresh(&dir);

        let off = file.alloc(8).unwrap();
        file.write(off, &[0xff; 8]).unwrap();

        let zeroed = file.calloc(64).unwrap();
        assert!(file.slice(zeroed, 64).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bounds_are_enforced() {
        let dir = TempDir::new().unwrap();
        let mut file = open_fresh(&dir);

        let mut buf = [0u8; 8];
        assert!(matches!(
            file.read(36, &mut buf),
            Err(KvError::OutOfBounds { offset: 36, len: 8, size: 40 })
        ));
        assert!(matches!(
            file.write(u64::MAX, b"x"),
            Err(KvError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_compare() {
        let dir = TempDir::new().unwrap();
        let mut file = open_fresh(&dir);

        let off = file.alloc(3).unwrap();
        file.write(off, b"abc").unwrap();

        assert_eq!(file.compare(off, b"abc").unwrap(), Ordering::Equal);
        assert_eq!(file.compare(off, b"abd").unwrap(), Ordering::Less);
        assert_eq!(file.compare(off, b"abb").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("region.db");
        {
            let mut file = open_fresh(&dir);
            let off = file.alloc(4).unwrap();
            file.write(off, b"data").unwrap();
            file.close().unwrap();
        }

        let mut file = MappedFile::open(&path, true, 40).unwrap();
        assert!(file.is_read_only());
        assert!(!file.created());
        assert_eq!(file.slice(40, 4).unwrap(), b"data");

        assert!(matches!(file.alloc(1), Err(KvError::ReadOnly)));
        assert!(matches!(file.write(40, b"x"), Err(KvError::ReadOnly)));
        assert!(matches!(file.sync(0, 40), Err(KvError::ReadOnly)));
    }

    #[test]
    fn test_read_only_empty_file_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        std::fs::File::create(&path).unwrap();

        assert!(matches!(
            MappedFile::open(&path, true, 40),
            Err(KvError::Format(_))
        ));
    }

    #[test]
    fn test_read_only_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.db");

        assert!(matches!(
            MappedFile::open(&path, true, 40),
            Err(KvError::Io(_))
        ));
    }

    #[test]
    fn test_sync_and_advise() {
        let dir = TempDir::new().unwrap();
        let mut file = open_fresh(&dir);
        let off = file.alloc(4096).unwrap();

        file.sync(off, 4096).unwrap();
        file.advise(0, file.size(), AccessHint::WillNeed).unwrap();
        assert!(file.advise(0, file.size() + 1, AccessHint::Random).is_err());
    }
}
