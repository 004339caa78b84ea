//! Persistent storage for channel message DAGs
//!
//! - `sql_store`: store lifecycle and the blocking-pool bridge
//! - `messages`: message writes, lookups, leaves and ordered scans
//! - `entities`: namespaced auxiliary blobs
//! - `schema`: table layout and the version policy

pub mod entities;
pub mod messages;
pub mod schema;
pub mod sql_store;

pub use schema::{SchemaStatus, CURRENT_SCHEMA_VERSION};
pub use sql_store::DagStore;

/// Default number of hashes per batched lookup round trip
pub const DEFAULT_LOOKUP_BATCH_SIZE: usize = 500;

/// Largest batch that stays under SQLite's default bound-parameter limit
/// (999) with the channel id bound alongside
pub const MAX_LOOKUP_BATCH_SIZE: usize = 998;
