//! Database schema and version policy
//!
//! There are no incremental migrations. Stored message formats are not
//! guaranteed compatible across protocol versions, so any stored version
//! below [`CURRENT_SCHEMA_VERSION`] triggers a full erasure of messages,
//! parent edges and entities before the current version is recorded.

use crate::error::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

const SCHEMA_SQL: &str = r#"
    -- Single-row version marker
    CREATE TABLE IF NOT EXISTS schema_version (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        version INTEGER NOT NULL,
        applied_at INTEGER NOT NULL
    );

    -- Messages, keyed by globally unique hash
    CREATE TABLE IF NOT EXISTS messages (
        hash BLOB PRIMARY KEY,
        channel_id BLOB NOT NULL,
        parents BLOB NOT NULL,                  -- length-prefixed hash list
        height INTEGER NOT NULL,
        payload BLOB NOT NULL
    );

    -- CRDT order range scans
    CREATE INDEX IF NOT EXISTS idx_messages_channel_order
        ON messages(channel_id, height, hash);

    -- One row per hash referenced as a parent
    CREATE TABLE IF NOT EXISTS parent_edges (
        hash BLOB PRIMARY KEY,
        channel_id BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_parent_edges_channel ON parent_edges(channel_id);

    -- Namespaced blobs (identities, channel lists, ...)
    CREATE TABLE IF NOT EXISTS entities (
        prefix TEXT NOT NULL,
        id TEXT NOT NULL,
        blob BLOB NOT NULL,
        PRIMARY KEY (prefix, id)
    );
"#;

/// What [`ensure_schema`] found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// Marker already at the current version
    Current,
    /// No marker and no data; schema created
    Initialized,
    /// Older marker (or unmarked data); all rows erased
    Wiped { from: i32, rows: usize },
}

/// Create missing tables and apply the version policy in one transaction.
pub fn ensure_schema(conn: &mut Connection) -> StoreResult<SchemaStatus> {
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_SQL)?;

    let stored: Option<i32> = tx
        .query_row("SELECT version FROM schema_version WHERE id = 0", [], |row| row.get(0))
        .optional()?;

    let status = match stored {
        Some(version) if version > CURRENT_SCHEMA_VERSION => {
            return Err(StoreError::SchemaTooNew {
                stored: version,
                current: CURRENT_SCHEMA_VERSION,
            });
        }
        Some(version) if version == CURRENT_SCHEMA_VERSION => SchemaStatus::Current,
        Some(version) => SchemaStatus::Wiped { from: version, rows: wipe(&tx)? },
        None => match wipe(&tx)? {
            0 => SchemaStatus::Initialized,
            rows => SchemaStatus::Wiped { from: 0, rows },
        },
    };

    if status != SchemaStatus::Current {
        tx.execute(
            "INSERT INTO schema_version (id, version, applied_at) VALUES (0, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                 version = excluded.version,
                 applied_at = excluded.applied_at",
            params![CURRENT_SCHEMA_VERSION, current_timestamp()],
        )?;
    }

    tx.commit()?;
    Ok(status)
}

/// Delete every message, parent edge and entity. Returns the rows removed.
pub(crate) fn wipe(conn: &Connection) -> rusqlite::Result<usize> {
    let mut removed = conn.execute("DELETE FROM messages", [])?;
    removed += conn.execute("DELETE FROM parent_edges", [])?;
    removed += conn.execute("DELETE FROM entities", [])?;
    Ok(removed)
}

/// Stored schema version, if the marker exists
pub fn stored_version(conn: &Connection) -> StoreResult<Option<i32>> {
    Ok(conn
        .query_row("SELECT version FROM schema_version WHERE id = 0", [], |row| row.get(0))
        .optional()?)
}

/// Current Unix timestamp in milliseconds
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
