//! Keel Storage Engine
//!
//! Segmented, offset-indexed storage for the keel commit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────── Log ─────────────────────────┐
//! │                                                       │
//! │  Segment 0          Segment 12          Segment 31    │
//! │  ┌──────────┐       ┌──────────┐       ┌──────────┐   │
//! │  │ 0.store  │       │ 12.store │       │ 31.store │   │  ← record bytes
//! │  │ 0.index  │       │ 12.index │       │ 31.index │   │  ← offset → position
//! │  └──────────┘       └──────────┘       └──────────┘   │
//! │   immutable          immutable          active        │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The [`Log`] owns an ordered list of segments sharing one monotonic
//! offset space. Each segment pairs a *store* — an append-only file of
//! length-prefixed records — with a memory-mapped fixed-width *index* that
//! maps segment-relative offsets to store positions.
//! Appends always land in the active (highest-base) segment; when it
//! reaches its configured size the log rotates to a fresh one. Reads are
//! routed to whichever segment owns the requested offset.
//!
//! Old segments are reclaimed with [`Log::truncate`], which deletes every
//! segment entirely below a retention threshold without ever reassigning
//! offsets.

pub mod config;
pub mod error;
mod index;
mod log;
mod segment;
mod store;

pub use config::LogConfig;
pub use error::{Error, Result};
pub use log::{Log, LogReader};

/// Re-exported record type; the unit of data the log stores.
pub use keel_proto::v1::Record;
