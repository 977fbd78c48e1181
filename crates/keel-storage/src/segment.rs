//! Log segment: one store plus one index over a contiguous offset range.
//!
//! A segment ties together a store file and its index under a shared base
//! offset, which is also the filename key (`<base>.store` / `<base>.index`).
//! The segment assigns global offsets on append and reports when either
//! backing file has reached its configured size cap, at which point the log
//! rotates to a fresh segment.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use prost::Message;
use tracing::debug;

use crate::config::LogConfig;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::store::Store;
use keel_proto::v1::Record;

pub(crate) struct Segment {
    store: Arc<Store>,
    index: Index,
    store_path: PathBuf,
    index_path: PathBuf,
    base_offset: u64,
    next_offset: u64,
    config: LogConfig,
}

impl Segment {
    /// Open or create the segment at `base_offset` inside `dir`.
    ///
    /// The next offset to assign is recovered from the index's last entry:
    /// an empty index means the segment starts at its base offset, otherwise
    /// it resumes one past the last relative offset on record.
    pub(crate) fn new(dir: &Path, base_offset: u64, config: LogConfig) -> Result<Self> {
        let store_path = dir.join(format!("{base_offset}.store"));
        let index_path = dir.join(format!("{base_offset}.index"));

        let store_file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&store_path)?;
        let store = Arc::new(Store::new(store_file)?);

        let index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)?;
        let index = Index::new(index_file, config.max_index_bytes)?;

        let next_offset = match index.read(-1) {
            Ok((relative_offset, _)) => base_offset + u64::from(relative_offset) + 1,
            Err(Error::EndOfData) => base_offset,
            Err(err) => return Err(err),
        };
        debug!(base_offset, next_offset, "segment opened");

        Ok(Self {
            store,
            index,
            store_path,
            index_path,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Append a record, stamping it with the next offset of this segment.
    ///
    /// The store write and the index write succeed or fail as a unit from
    /// the caller's point of view: a failed index write leaves the next
    /// offset unchanged, so the orphaned store entry is never addressable.
    pub(crate) fn append(&mut self, record: &mut Record) -> Result<u64> {
        record.offset = self.next_offset;
        let encoded = record.encode_to_vec();
        let (_, position) = self.store.append(&encoded)?;
        self.index
            .write((self.next_offset - self.base_offset) as u32, position)?;
        self.next_offset += 1;
        Ok(record.offset)
    }

    /// Read the record at a global offset owned by this segment.
    pub(crate) fn read(&self, offset: u64) -> Result<Record> {
        let (_, position) = self.index.read((offset - self.base_offset) as i64)?;
        let payload = self.store.read(position)?;
        Ok(Record::decode(payload.as_slice())?)
    }

    /// Whether either backing file has reached its configured cap.
    pub(crate) fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    pub(crate) fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub(crate) fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Shared handle to the store plus its current size, for sequential
    /// export of the whole log.
    pub(crate) fn store_view(&self) -> (Arc<Store>, u64) {
        (Arc::clone(&self.store), self.store.size())
    }

    /// Close the segment and delete both backing files.
    pub(crate) fn remove(self) -> Result<()> {
        let store_path = self.store_path.clone();
        let index_path = self.index_path.clone();
        debug!(base_offset = self.base_offset, "removing segment");
        self.close()?;
        fs::remove_file(index_path)?;
        fs::remove_file(store_path)?;
        Ok(())
    }

    /// Close the store and the index. Both are attempted even if the store
    /// close fails; the store's error wins.
    pub(crate) fn close(self) -> Result<()> {
        let store_result = self.store.close();
        let index_result = self.index.close();
        store_result.and(index_result)
    }
}
