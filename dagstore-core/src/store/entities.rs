//! Namespaced entity blobs
//!
//! Entities are opaque blobs addressed by `(prefix, id)`, for auxiliary
//! state such as identities or channel lists. They live beside the message
//! DAG and are only erased by [`DagStore::clear`] or a schema wipe.

use super::sql_store::DagStore;
use crate::error::StoreResult;
use crate::metrics::{record_counter, ENTITIES_STORED};
use crate::model::Entity;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

impl DagStore {
    /// Insert or replace the blob stored under `(prefix, id)`
    pub async fn store_entity(&self, prefix: &str, id: &str, blob: &[u8]) -> StoreResult<()> {
        let prefix = prefix.to_string();
        let id = id.to_string();
        let blob = blob.to_vec();

        debug!(prefix = %prefix, id = %id, size = blob.len(), "Storing entity");

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO entities (prefix, id, blob) VALUES (?1, ?2, ?3)
                 ON CONFLICT(prefix, id) DO UPDATE SET blob = excluded.blob",
                params![prefix, id, blob],
            )?;
            Ok(())
        })
        .await?;

        record_counter(ENTITIES_STORED, 1);
        Ok(())
    }

    /// Serialize `entity` and store it under `(prefix, id)`
    pub async fn store_entity_as<E: Entity>(&self, prefix: &str, id: &str, entity: &E) -> StoreResult<()> {
        let blob = entity.to_bytes()?;
        self.store_entity(prefix, id, &blob).await
    }

    /// Blob stored under `(prefix, id)`, if any
    pub async fn retrieve_entity(&self, prefix: &str, id: &str) -> StoreResult<Option<Vec<u8>>> {
        let prefix = prefix.to_string();
        let id = id.to_string();

        self.with_conn(move |conn| {
            let blob = conn
                .query_row(
                    "SELECT blob FROM entities WHERE prefix = ?1 AND id = ?2",
                    params![prefix, id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(blob)
        })
        .await
    }

    /// [`retrieve_entity`](Self::retrieve_entity), reconstructed through [`Entity`]
    pub async fn retrieve_entity_as<E: Entity>(&self, prefix: &str, id: &str) -> StoreResult<Option<E>> {
        self.retrieve_entity(prefix, id)
            .await?
            .map(|blob| E::from_bytes(&blob))
            .transpose()
    }

    /// Remove the entity under `(prefix, id)`. Removing a missing entity is not an error.
    pub async fn remove_entity(&self, prefix: &str, id: &str) -> StoreResult<()> {
        let prefix = prefix.to_string();
        let id = id.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM entities WHERE prefix = ?1 AND id = ?2",
                params![prefix, id],
            )?;
            Ok(())
        })
        .await
    }

    /// Ids stored under `prefix`, sorted
    pub async fn get_entity_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let prefix = prefix.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached("SELECT id FROM entities WHERE prefix = ?1 ORDER BY id")?;
            let keys = stmt
                .query_map(params![prefix], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
        .await
    }

    /// Number of entities across all prefixes
    pub async fn get_entity_count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Json;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ChannelList {
        channels: Vec<String>,
    }

    #[tokio::test]
    async fn test_entity_roundtrip() {
        let store = DagStore::open_temporary().await.unwrap();

        store.store_entity("identity", "alice", b"key-a").await.unwrap();
        assert_eq!(store.retrieve_entity("identity", "alice").await.unwrap(), Some(b"key-a".to_vec()));
        assert_eq!(store.retrieve_entity("identity", "bob").await.unwrap(), None);
        assert_eq!(store.retrieve_entity("other", "alice").await.unwrap(), None);

        store.store_entity("identity", "alice", b"key-b").await.unwrap();
        assert_eq!(store.retrieve_entity("identity", "alice").await.unwrap(), Some(b"key-b".to_vec()));
        assert_eq!(store.get_entity_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_keys_sorted_and_removal() {
        let store = DagStore::open_temporary().await.unwrap();
        for id in ["carol", "alice", "bob"] {
            store.store_entity("identity", id, id.as_bytes()).await.unwrap();
        }
        store.store_entity("channels", "list", b"[]").await.unwrap();

        assert_eq!(store.get_entity_keys("identity").await.unwrap(), vec!["alice", "bob", "carol"]);

        store.remove_entity("identity", "bob").await.unwrap();
        store.remove_entity("identity", "nobody").await.unwrap();

        assert_eq!(store.get_entity_keys("identity").await.unwrap(), vec!["alice", "carol"]);
        assert_eq!(store.get_entity_count().await.unwrap(), 3);
        assert!(store.get_entity_keys("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_typed_entities() {
        let store = DagStore::open_temporary().await.unwrap();
        let list = Json(ChannelList { channels: vec!["general".into(), "random".into()] });

        store.store_entity_as("channels", "joined", &list).await.unwrap();

        let restored: Option<Json<ChannelList>> =
            store.retrieve_entity_as("channels", "joined").await.unwrap();
        assert_eq!(restored, Some(list));

        let missing: Option<Json<ChannelList>> =
            store.retrieve_entity_as("channels", "left").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_entities_and_messages() {
        let store = DagStore::open_temporary().await.unwrap();
        store.store_entity("identity", "alice", b"k").await.unwrap();
        let root = crate::model::Message::new(b"c".to_vec(), b"a".to_vec(), vec![], 0, b"x".to_vec());
        store.add_message(&root).await.unwrap();

        store.clear().await.unwrap();

        assert_eq!(store.get_entity_count().await.unwrap(), 0);
        assert_eq!(store.get_message_count(b"c").await.unwrap(), 0);
        assert!(store.get_channel_ids().await.unwrap().is_empty());
    }
}
