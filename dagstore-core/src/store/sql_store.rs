//! SQLite-backed message DAG store
//!
//! The store owns a single-connection pool in exclusive locking mode: it
//! assumes it is the only process using the database file. Every public
//! operation is `async` and runs its SQLite work on the blocking thread pool
//! through [`DagStore::with_conn`], so operations execute one at a time.

use super::schema::{self, SchemaStatus};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::metrics::{describe_once, record_counter, STORE_WIPED};
use r2d2::{ManageConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// File name used inside a private temporary directory
const TEMP_DB_NAME: &str = "dagstore.db";

/// Persistent store for channel message DAGs and auxiliary entities
pub struct DagStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    config: StoreConfig,
    path: PathBuf,
    temp_dir: Option<TempDir>,
}

impl DagStore {
    /// Open (or create) the store described by `config`.
    ///
    /// Creates missing tables, enables exclusive locking and applies the
    /// schema version policy (see [`schema`]). Without a configured path a
    /// private temporary directory is used and removed on [`close`].
    ///
    /// [`close`]: DagStore::close
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        describe_once();
        tokio::task::spawn_blocking(move || Self::open_blocking(config)).await?
    }

    /// Open a private temporary store with default settings
    pub async fn open_temporary() -> StoreResult<Self> {
        Self::open(StoreConfig::default()).await
    }

    fn open_blocking(config: StoreConfig) -> StoreResult<Self> {
        let (path, temp_dir) = match &config.path {
            Some(path) => (path.clone(), None),
            None => {
                let dir = tempfile::Builder::new().prefix("dagstore-").tempdir()?;
                (dir.path().join(TEMP_DB_NAME), Some(dir))
            }
        };

        let journal_mode = if config.enable_wal { "WAL" } else { "DELETE" };
        let manager = SqliteConnectionManager::file(&path).with_init(move |conn| {
            conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |_| Ok(()))?;
            conn.pragma_update_and_check(None, "journal_mode", journal_mode, |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });

        // Connect once directly so a bad location fails immediately instead
        // of after the pool's connection timeout. The connection is dropped
        // before the pool opens its own, releasing the exclusive lock.
        let status = {
            let mut conn = manager.connect()?;
            schema::ensure_schema(&mut conn)?
        };

        match status {
            SchemaStatus::Current => debug!(path = %path.display(), "Schema up to date"),
            SchemaStatus::Initialized => info!(path = %path.display(), "Initialized new store"),
            SchemaStatus::Wiped { from, rows } => {
                warn!(
                    path = %path.display(),
                    from_version = from,
                    to_version = schema::CURRENT_SCHEMA_VERSION,
                    rows,
                    "Stored schema is older than current; erased all data"
                );
                record_counter(STORE_WIPED, 1);
            }
        }

        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(config.connection_timeout)
            .build(manager)?;

        info!(path = %path.display(), temporary = temp_dir.is_some(), "Opened store");

        Ok(Self { pool: Arc::new(pool), config, path, temp_dir })
    }

    /// Close the store, releasing the database and removing a private
    /// temporary directory.
    pub async fn close(self) -> StoreResult<()> {
        let DagStore { pool, path, temp_dir, .. } = self;

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            drop(pool);
            if let Some(dir) = temp_dir {
                dir.close()?;
            }
            Ok(())
        })
        .await??;

        info!(path = %path.display(), "Closed store");
        Ok(())
    }

    /// Delete all messages, parent edges and entities. The schema version
    /// marker is kept.
    pub async fn clear(&self) -> StoreResult<()> {
        let removed = self
            .with_conn(|conn| {
                let tx = conn.transaction()?;
                let removed = schema::wipe(&tx)?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;

        info!(rows = removed, "Cleared store");
        Ok(())
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the store lives in a private temporary directory
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Run `op` against the store connection on the blocking thread pool.
    ///
    /// This is the only place the async API meets the synchronous driver.
    pub(crate) async fn with_conn<F, T>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await?
    }
}

/// Convert a count for use as a SQL `LIMIT`/`OFFSET`, saturating at `i64::MAX`
pub(crate) fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Convert a message height to its stored representation
pub(crate) fn sql_height(height: u64) -> StoreResult<i64> {
    i64::try_from(height).map_err(|_| {
        StoreError::InvalidInput(format!("height {} exceeds the storable maximum {}", height, i64::MAX))
    })
}
