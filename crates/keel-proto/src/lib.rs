//! Keel Protocol Definitions
//!
//! gRPC service definition and message types for the commit log API.
//!
//! ## Service
//!
//! The `Log` service exposes four operations:
//!
//! - `Produce`: append one record, returns its assigned offset
//! - `Consume`: read the record at a given offset
//! - `ProduceStream`: bidirectional stream of produce requests/responses,
//!   one response per request in order
//! - `ConsumeStream`: server stream of records from a start offset onward,
//!   following the log's tail until the client cancels
//!
//! ## Usage
//!
//! Server side:
//!
//! ```ignore
//! use keel_proto::v1::log_server::{Log, LogServer};
//! ```
//!
//! Client side:
//!
//! ```ignore
//! use keel_proto::v1::{log_client::LogClient, ProduceRequest, Record};
//!
//! let mut client = LogClient::connect("http://localhost:8400").await?;
//! let response = client
//!     .produce(ProduceRequest {
//!         record: Some(Record {
//!             value: "hello".into(),
//!             offset: 0,
//!         }),
//!     })
//!     .await?;
//! println!("offset: {}", response.into_inner().offset);
//! ```

pub mod v1 {
    tonic::include_proto!("keel.v1");
}
