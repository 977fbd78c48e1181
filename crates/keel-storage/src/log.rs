//! The log: an ordered list of segments behind one monotonic offset space.
//!
//! The log owns every segment in its directory. The segment with the
//! highest base offset is the *active* segment and is the only one that
//! accepts appends; once it fills up the log rotates, creating a fresh
//! segment whose base offset is the old active's next offset. Offsets are
//! assigned once and never reused, across rotation and retention alike.
//!
//! On open, the log rebuilds its segment list from the `<base>.store` /
//! `<base>.index` pairs found on disk, recovering each segment's next
//! offset from its index. An empty directory gets a single segment at base
//! offset zero.
//!
//! A read/write lock guards the segment list: appends take it exclusively
//! (they may rotate), reads share it. Once an append returns offset `k`,
//! any read for an offset `<= k` issued afterwards observes the record.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{LogConfig, DEFAULT_MAX_INDEX_BYTES, DEFAULT_MAX_STORE_BYTES};
use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::store::Store;
use keel_proto::v1::Record;

pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    inner: RwLock<Inner>,
}

struct Inner {
    /// Sorted by base offset; the last segment is the active one. Never
    /// empty while the log is open.
    segments: Vec<Segment>,
    closed: bool,
}

impl Log {
    /// Open the log in `dir`, creating the directory if needed.
    ///
    /// Limits left at zero in `config` fall back to the built-in defaults.
    /// Existing segments are rebuilt from the file pairs on disk, sorted by
    /// base offset; duplicated bases (a store and its index) collapse to one
    /// segment.
    pub fn open(dir: impl Into<PathBuf>, mut config: LogConfig) -> Result<Self> {
        if config.max_store_bytes == 0 {
            config.max_store_bytes = DEFAULT_MAX_STORE_BYTES;
        }
        if config.max_index_bytes == 0 {
            config.max_index_bytes = DEFAULT_MAX_INDEX_BYTES;
        }

        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut bases = BTreeSet::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("store") | Some("index")
            ) {
                continue;
            }
            match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(base) => {
                    bases.insert(base);
                }
                None => debug!(path = %path.display(), "skipping unrecognized file"),
            }
        }

        let mut segments = Vec::with_capacity(bases.len().max(1));
        for base in bases {
            segments.push(Segment::new(&dir, base, config.clone())?);
        }
        if segments.is_empty() {
            segments.push(Segment::new(&dir, 0, config.clone())?);
        }

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            next_offset = segments.last().map(Segment::next_offset).unwrap_or(0),
            "log opened"
        );

        Ok(Self {
            dir,
            config,
            inner: RwLock::new(Inner {
                segments,
                closed: false,
            }),
        })
    }

    /// Append a record to the active segment and return its offset.
    ///
    /// Rotation is checked after the append, so the active segment may
    /// overshoot its cap by one record but is always writable on the next
    /// call.
    pub fn append(&self, record: &mut Record) -> Result<u64> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }
        // The segment list is never empty while the log is open.
        let active = inner.segments.last_mut().ok_or(Error::Closed)?;
        let offset = active.append(record)?;
        let rotate_at = active.is_maxed().then(|| active.next_offset());
        if let Some(base) = rotate_at {
            debug!(base_offset = base, "rotating to new segment");
            inner
                .segments
                .push(Segment::new(&self.dir, base, self.config.clone())?);
        }
        Ok(offset)
    }

    /// Read the record at `offset` from whichever segment owns it.
    pub fn read(&self, offset: u64) -> Result<Record> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }
        let idx = inner
            .segments
            .partition_point(|s| s.base_offset() <= offset);
        let segment = idx
            .checked_sub(1)
            .map(|i| &inner.segments[i])
            .ok_or(Error::OffsetOutOfRange(offset))?;
        if offset >= segment.next_offset() {
            return Err(Error::OffsetOutOfRange(offset));
        }
        segment.read(offset)
    }

    /// Offset of the oldest record still held, or 0 on an empty log.
    pub fn lowest_offset(&self) -> Result<u64> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }
        Ok(inner
            .segments
            .first()
            .map(Segment::base_offset)
            .unwrap_or(0))
    }

    /// Offset of the newest record, or 0 on an empty log.
    pub fn highest_offset(&self) -> Result<u64> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }
        Ok(inner
            .segments
            .last()
            .map(|s| s.next_offset().saturating_sub(1))
            .unwrap_or(0))
    }

    /// Remove every segment whose records all fall below `lowest`, deleting
    /// their files. Offsets are never reassigned: if retention empties the
    /// log entirely, the next segment starts where the old active ended.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }
        let resume_at = inner
            .segments
            .last()
            .map(Segment::next_offset)
            .unwrap_or(0);

        // Segments are sorted, so everything removable is a prefix.
        let split = inner.segments.partition_point(|s| s.next_offset() <= lowest);
        if split == 0 {
            return Ok(());
        }
        info!(lowest, removed = split, "truncating log");
        let removed: Vec<Segment> = inner.segments.drain(..split).collect();
        for segment in removed {
            segment.remove()?;
        }
        if inner.segments.is_empty() {
            inner
                .segments
                .push(Segment::new(&self.dir, resume_at, self.config.clone())?);
        }
        Ok(())
    }

    /// A sequential reader over the raw store contents of every segment in
    /// base-offset order, for exporting the whole log.
    ///
    /// The view is bounded at the sizes the stores had when the reader was
    /// created; appends that land afterwards are not included.
    pub fn reader(&self) -> Result<LogReader> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(Error::Closed);
        }
        Ok(LogReader {
            stores: inner.segments.iter().map(Segment::store_view).collect(),
            current: 0,
            position: 0,
        })
    }

    /// Close every segment. The log is unusable afterwards; every operation
    /// fails with [`Error::Closed`]. All segments are attempted even when
    /// one fails; the first error is reported.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(Error::Closed);
        }
        inner.closed = true;
        let mut result = Ok(());
        for segment in inner.segments.drain(..) {
            let closed = segment.close();
            if result.is_ok() {
                result = closed;
            }
        }
        result
    }

    /// Close the log and delete its directory.
    pub fn remove(&self) -> Result<()> {
        self.close()?;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Sequential byte view over the concatenated segment stores, front to
/// back. Yields exactly the length-prefixed entries as laid out on disk.
pub struct LogReader {
    stores: Vec<(Arc<Store>, u64)>,
    current: usize,
    position: u64,
}

impl io::Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.current < self.stores.len() {
            let (store, size) = &self.stores[self.current];
            if self.position >= *size {
                self.current += 1;
                self.position = 0;
                continue;
            }
            let want = buf.len().min((*size - self.position) as usize);
            let n = store
                .read_at(&mut buf[..want], self.position)
                .map_err(io::Error::other)?;
            if n == 0 {
                self.current += 1;
                self.position = 0;
                continue;
            }
            self.position += n as u64;
            return Ok(n);
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use prost::Message;
    use tempfile::TempDir;

    fn record(value: &'static [u8]) -> Record {
        Record {
            value: Bytes::from_static(value),
            offset: 0,
        }
    }

    /// Config sized so the store of one segment holds exactly `per_segment`
    /// copies of `value` before rotation kicks in.
    fn config_for(value: &'static [u8], per_segment: u64) -> LogConfig {
        let entry_bytes: u64 = (0..per_segment)
            .map(|offset| {
                8 + Record {
                    value: Bytes::from_static(value),
                    offset,
                }
                .encoded_len() as u64
            })
            .sum();
        LogConfig {
            max_store_bytes: entry_bytes,
            max_index_bytes: 1024,
        }
    }

    #[test]
    fn test_monotonic_offsets() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();

        for expected in 0..10 {
            let offset = log.append(&mut record(b"entry")).unwrap();
            assert_eq!(offset, expected);
        }
    }

    #[test]
    fn test_append_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();

        let mut r = record(b"hello world");
        let offset = log.append(&mut r).unwrap();
        let got = log.read(offset).unwrap();
        assert_eq!(got.value, r.value);
        assert_eq!(got.offset, offset);
    }

    #[test]
    fn test_out_of_range() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();

        // Empty log: nothing is readable, including offset zero.
        assert!(matches!(log.read(0), Err(Error::OffsetOutOfRange(0))));

        log.append(&mut record(b"only")).unwrap();
        assert!(log.read(0).is_ok());
        assert!(matches!(log.read(1), Err(Error::OffsetOutOfRange(1))));
        assert!(matches!(
            log.read(u64::MAX),
            Err(Error::OffsetOutOfRange(u64::MAX))
        ));
    }

    #[test]
    fn test_rotation_spans_segments() {
        let dir = TempDir::new().unwrap();
        let value: &[u8] = b"hello";
        let log = Log::open(dir.path(), config_for(b"hello", 2)).unwrap();

        for _ in 0..5 {
            log.append(&mut record(b"hello")).unwrap();
        }
        // Two full segments plus the active one.
        let stores: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.unwrap().path().extension().map(|x| x.to_owned()))
            .filter(|ext| ext == "store")
            .collect();
        assert!(stores.len() >= 2);

        // Reads resolve across the segment boundary.
        for offset in 0..5 {
            let got = log.read(offset).unwrap();
            assert_eq!(got.value, Bytes::copy_from_slice(value));
            assert_eq!(got.offset, offset);
        }
    }

    #[test]
    fn test_lowest_highest() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();

        // Empty-log sentinel.
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 0);

        for _ in 0..3 {
            log.append(&mut record(b"x")).unwrap();
        }
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 2);
    }

    #[test]
    fn test_closed_log_fails_fast() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();
        log.append(&mut record(b"x")).unwrap();
        log.close().unwrap();

        assert!(matches!(log.append(&mut record(b"y")), Err(Error::Closed)));
        assert!(matches!(log.read(0), Err(Error::Closed)));
        assert!(matches!(log.lowest_offset(), Err(Error::Closed)));
        assert!(matches!(log.highest_offset(), Err(Error::Closed)));
        assert!(matches!(log.truncate(0), Err(Error::Closed)));
        assert!(log.reader().is_err());
        assert!(matches!(log.close(), Err(Error::Closed)));
    }

    #[test]
    fn test_truncate_after_emptying_resumes_offsets() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), LogConfig::default()).unwrap();

        for _ in 0..3 {
            log.append(&mut record(b"x")).unwrap();
        }
        // Everything is below the threshold; the whole list goes.
        log.truncate(100).unwrap();

        // Offsets continue from where the log left off, never reused.
        let offset = log.append(&mut record(b"fresh")).unwrap();
        assert_eq!(offset, 3);
        assert_eq!(log.lowest_offset().unwrap(), 3);
        assert!(matches!(log.read(0), Err(Error::OffsetOutOfRange(0))));
    }
}
