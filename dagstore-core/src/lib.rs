//! Persistence and query layer for per-channel message DAGs
//!
//! Each channel is an append-only DAG of messages. The store keeps
//! messages and their parent edges in SQLite, reports the channel's
//! current tips, pages through the deterministic `(height, hash)` order
//! with resumable cursors, and keeps namespaced auxiliary blobs.

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod query;
pub mod store;
pub mod test_utils;

pub use config::{Config, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use logging::{init_logging, LogLevel};
pub use model::{ChannelId, DagMessage, Entity, FromPayload, Hash, Json, Message};
pub use query::{AbbreviatedMessage, Cursor, QueryPage};
pub use store::DagStore;
