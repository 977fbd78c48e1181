//! Memory-mapped offset index.
//!
//! The index maps a segment-relative record offset to the byte position of
//! that record in the segment's store file. Entries are fixed width and
//! packed with no padding:
//!
//! ```text
//! ┌───────────────────────────┬────────────────────┐
//! │ Relative offset (4 bytes) │ Position (8 bytes) │  ... repeated
//! └───────────────────────────┴────────────────────┘
//! ```
//!
//! Both fields are big-endian. Entries are written strictly in append order,
//! so the n-th entry always belongs to the n-th record of the segment and
//! the relative offset equals the entry's own index. That invariant is what
//! makes negative ("from the end") lookups and next-offset recovery cheap.
//!
//! The backing file is preallocated to its maximum size up front so it can
//! be memory-mapped once; "index full" is then a plain size comparison. On
//! close the map is flushed and the file truncated back down to its logical
//! size, which is how a later open tells how many entries exist.

use std::fs::File;

use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;

use crate::error::{Error, Result};

const OFF_WIDTH: u64 = 4;
const POS_WIDTH: u64 = 8;

/// Width of one index entry: relative offset plus store position.
pub(crate) const ENT_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

/// Fixed-capacity, memory-mapped index file.
///
/// Writes are not internally synchronized; the owning segment serializes
/// them under the log's locks. Concurrent unsynchronized writes would race
/// on the size counter and corrupt entries.
pub(crate) struct Index {
    file: File,
    mmap: MmapMut,
    size: u64,
}

impl Index {
    /// Map an index file, growing it to `max_index_bytes` of capacity. The
    /// file's size *before* growing is the logical size: the bytes that hold
    /// real entries from a previous, cleanly closed incarnation.
    pub(crate) fn new(file: File, max_index_bytes: u64) -> Result<Self> {
        let size = file.metadata()?.len();
        file.set_len(max_index_bytes)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { file, mmap, size })
    }

    /// Read entry `n`. Non-negative `n` is an absolute entry index; negative
    /// `n` counts from the end, `-1` being the most recent entry. Returns
    /// [`Error::EndOfData`] when the slot does not exist.
    pub(crate) fn read(&self, n: i64) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfData);
        }
        let entries = (self.size / ENT_WIDTH) as i64;
        let slot = if n < 0 { entries + n } else { n };
        if slot < 0 {
            return Err(Error::EndOfData);
        }
        let at = slot as u64 * ENT_WIDTH;
        if at >= self.size {
            return Err(Error::EndOfData);
        }
        let at = at as usize;
        let rel = BigEndian::read_u32(&self.mmap[at..at + OFF_WIDTH as usize]);
        let position =
            BigEndian::read_u64(&self.mmap[at + OFF_WIDTH as usize..at + ENT_WIDTH as usize]);
        Ok((rel, position))
    }

    /// Append one entry. Returns [`Error::EndOfData`] when fewer than
    /// [`ENT_WIDTH`] bytes of mapped capacity remain.
    pub(crate) fn write(&mut self, relative_offset: u32, position: u64) -> Result<()> {
        if self.mmap.len() as u64 - self.size < ENT_WIDTH {
            return Err(Error::EndOfData);
        }
        let at = self.size as usize;
        BigEndian::write_u32(
            &mut self.mmap[at..at + OFF_WIDTH as usize],
            relative_offset,
        );
        BigEndian::write_u64(
            &mut self.mmap[at + OFF_WIDTH as usize..at + ENT_WIDTH as usize],
            position,
        );
        self.size += ENT_WIDTH;
        Ok(())
    }

    /// Logical size in bytes: entries written, not mapped capacity.
    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Flush the map, truncate the file down to the logical size, and sync.
    /// The map must be dropped before truncating below its length.
    pub(crate) fn close(self) -> Result<()> {
        let Index { file, mmap, size } = self;
        mmap.flush()?;
        drop(mmap);
        file.set_len(size)?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    const MAX_INDEX_BYTES: u64 = ENT_WIDTH * 3;

    fn open_file(path: &std::path::Path) -> File {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .unwrap()
    }

    #[test]
    fn test_read_empty_is_end_of_data() {
        let dir = TempDir::new().unwrap();
        let index = Index::new(open_file(&dir.path().join("i")), MAX_INDEX_BYTES).unwrap();

        assert!(matches!(index.read(0), Err(Error::EndOfData)));
        assert!(matches!(index.read(-1), Err(Error::EndOfData)));
    }

    #[test]
    fn test_write_read() {
        let dir = TempDir::new().unwrap();
        let mut index = Index::new(open_file(&dir.path().join("i")), MAX_INDEX_BYTES).unwrap();

        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();

        assert_eq!(index.read(0).unwrap(), (0, 0));
        assert_eq!(index.read(1).unwrap(), (1, 19));
        // -1 resolves to the most recent entry, -2 to the one before it.
        assert_eq!(index.read(-1).unwrap(), (1, 19));
        assert_eq!(index.read(-2).unwrap(), (0, 0));

        assert!(matches!(index.read(2), Err(Error::EndOfData)));
        assert!(matches!(index.read(-3), Err(Error::EndOfData)));
    }

    #[test]
    fn test_write_past_capacity_is_end_of_data() {
        let dir = TempDir::new().unwrap();
        let mut index = Index::new(open_file(&dir.path().join("i")), MAX_INDEX_BYTES).unwrap();

        for n in 0..3u32 {
            index.write(n, u64::from(n) * 19).unwrap();
        }
        assert!(matches!(index.write(3, 57), Err(Error::EndOfData)));

        // Prior entries survive the failed write untouched.
        for n in 0..3u32 {
            assert_eq!(index.read(i64::from(n)).unwrap(), (n, u64::from(n) * 19));
        }
    }

    #[test]
    fn test_close_truncates_and_reopen_recovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("i");

        let mut index = Index::new(open_file(&path), MAX_INDEX_BYTES).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();
        index.close().unwrap();

        // Close trims the preallocated capacity away.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), ENT_WIDTH * 2);

        let reopened = Index::new(open_file(&path), MAX_INDEX_BYTES).unwrap();
        assert_eq!(reopened.size(), ENT_WIDTH * 2);
        assert_eq!(reopened.read(-1).unwrap(), (1, 19));
    }
}
