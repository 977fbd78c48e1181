//! Keel gRPC Server
//!
//! The service façade over the storage engine: the four `Log` RPCs
//! (`Produce`, `Consume`, `ProduceStream`, `ConsumeStream`), with ACL
//! authorization in front of every operation and optional mutual-TLS
//! transport security supplying caller identities.

pub mod auth;
pub mod service;
pub mod tls;

pub use auth::{Acl, AuthError, Authorizer};
pub use service::LogService;
pub use tls::TlsSettings;
