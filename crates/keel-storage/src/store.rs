//! Append-only record store.
//!
//! A store is the file that holds the actual record bytes. Entries are
//! length-prefixed and packed back to back:
//!
//! ```text
//! ┌──────────────────┬───────────────────┐
//! │ Length (8 bytes) │ Record (N bytes)  │  ... repeated
//! └──────────────────┴───────────────────┘
//! ```
//!
//! The length prefix is big-endian. A record's *position* is the byte offset
//! of its length prefix; positions are handed out by [`Store::append`] and
//! later resolved through the segment index.
//!
//! Appends go through a write buffer, so a record is not visible to readers
//! (or durable) until the buffer is flushed. Every read flushes first, which
//! gives read-after-write consistency within the process.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;

use parking_lot::Mutex;

use crate::error::Result;

/// Width of the big-endian length prefix in front of every record.
pub(crate) const LEN_WIDTH: u64 = 8;

/// Append-only, length-prefixed record file.
///
/// A single mutex serializes appends, reads, and close so that a reader can
/// never observe a torn write. Stores of different segments are independent.
pub(crate) struct Store {
    inner: Mutex<Inner>,
}

struct Inner {
    writer: BufWriter<File>,
    size: u64,
}

impl Store {
    /// Wrap an opened store file. The current file size becomes the position
    /// of the next append, so reopening an existing file resumes where the
    /// previous process left off.
    pub(crate) fn new(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            inner: Mutex::new(Inner {
                writer: BufWriter::new(file),
                size,
            }),
        })
    }

    /// Append one record payload. Returns the total bytes written (prefix
    /// plus payload) and the position the entry starts at.
    pub(crate) fn append(&self, payload: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;
        inner
            .writer
            .write_all(&(payload.len() as u64).to_be_bytes())?;
        inner.writer.write_all(payload)?;
        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;
        Ok((written, position))
    }

    /// Read the record payload stored at `position`.
    pub(crate) fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        let file = inner.writer.get_ref();
        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact_at(&mut len_buf, position)?;
        let len = u64::from_be_bytes(len_buf);
        let mut payload = vec![0u8; len as usize];
        file.read_exact_at(&mut payload, position + LEN_WIDTH)?;
        Ok(payload)
    }

    /// Raw positional read of the underlying file, used for bulk export of
    /// the whole store. Flushes buffered appends first.
    pub(crate) fn read_at(&self, buf: &mut [u8], byte_offset: u64) -> Result<usize> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        Ok(inner.writer.get_ref().read_at(buf, byte_offset)?)
    }

    /// Current logical size, counting buffered but unflushed appends.
    pub(crate) fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Flush buffered appends and sync the file to disk. The descriptor
    /// itself is released when the last handle drops.
    pub(crate) fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> Store {
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(dir.path().join("test.store"))
            .unwrap();
        Store::new(file).unwrap()
    }

    #[test]
    fn test_append_read() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let payload = b"hello world";
        let (written, position) = store.append(payload).unwrap();
        assert_eq!(written, LEN_WIDTH + payload.len() as u64);
        assert_eq!(position, 0);

        let read_back = store.read(position).unwrap();
        assert_eq!(read_back, payload);

        // Positions advance by the full entry width.
        let (_, second) = store.append(payload).unwrap();
        assert_eq!(second, written);
        assert_eq!(store.read(second).unwrap(), payload);
    }

    #[test]
    fn test_read_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let payload = b"abc";
        store.append(payload).unwrap();

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        let n = store.read_at(&mut len_buf, 0).unwrap();
        assert_eq!(n, LEN_WIDTH as usize);
        assert_eq!(u64::from_be_bytes(len_buf), payload.len() as u64);

        let mut value = vec![0u8; payload.len()];
        store.read_at(&mut value, LEN_WIDTH).unwrap();
        assert_eq!(value, payload);
    }

    #[test]
    fn test_reopen_resumes_at_previous_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.store");

        let open = || {
            OpenOptions::new()
                .read(true)
                .create(true)
                .append(true)
                .open(&path)
                .unwrap()
        };

        let store = Store::new(open()).unwrap();
        let (written, _) = store.append(b"persisted").unwrap();
        store.close().unwrap();

        let reopened = Store::new(open()).unwrap();
        assert_eq!(reopened.size(), written);
        assert_eq!(reopened.read(0).unwrap(), b"persisted");
    }
}
