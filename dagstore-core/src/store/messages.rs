//! Message persistence and lookups
//!
//! Messages are totally ordered within a channel by CRDT order:
//! `(height ascending, hash ascending)`. SQLite compares BLOBs with
//! `memcmp`, which matches lexicographic byte order, so every ordered
//! query here is a plain `ORDER BY height, hash`.

use super::sql_store::{sql_count, sql_height, DagStore};
use crate::codec::{decode_hash_list, encode_hash_list};
use crate::error::StoreResult;
use crate::metrics::{record_counter, CHANNELS_PURGED, LOOKUP_BATCHES, MESSAGES_ADDED};
use crate::model::{ChannelId, DagMessage, FromPayload, Hash};
use crate::query::AbbreviatedMessage;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use tracing::{debug, info, warn};

impl DagStore {
    /// Insert a message, replacing any message with the same hash, and
    /// record an edge for each of its parents.
    ///
    /// Both writes happen in one transaction. A parent hash that cannot be
    /// encoded fails the call before anything is written.
    pub async fn add_message<M: DagMessage + ?Sized>(&self, message: &M) -> StoreResult<()> {
        let parents = encode_hash_list(message.parents())?;
        let height = sql_height(message.height())?;
        let payload = message.to_payload()?;

        let channel_id = message.channel_id().to_vec();
        let hash = message.hash().to_vec();
        let parent_hashes = message.parents().to_vec();

        if (height == 0) != parent_hashes.is_empty() {
            warn!(
                hash = %hex::encode(&hash),
                height,
                parents = parent_hashes.len(),
                "Message height inconsistent with its parents"
            );
        }

        debug!(
            channel = %hex::encode(&channel_id),
            hash = %hex::encode(&hash),
            height,
            parents = parent_hashes.len(),
            "Adding message"
        );

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR REPLACE INTO messages (hash, channel_id, parents, height, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![hash, channel_id, parents, height, payload],
            )?;

            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO parent_edges (hash, channel_id) VALUES (?1, ?2)",
                )?;
                for parent in &parent_hashes {
                    stmt.execute(params![parent, channel_id])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await?;

        record_counter(MESSAGES_ADDED, 1);
        Ok(())
    }

    /// Number of messages stored for a channel
    pub async fn get_message_count(&self, channel_id: &[u8]) -> StoreResult<u64> {
        let channel_id = channel_id.to_vec();

        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel_id = ?1",
                params![channel_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Hashes of the channel's messages that no message references as a
    /// parent, in CRDT order.
    pub async fn get_leaf_hashes(&self, channel_id: &[u8]) -> StoreResult<Vec<Hash>> {
        let channel_id = channel_id.to_vec();

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT m.hash FROM messages m
                 WHERE m.channel_id = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM parent_edges e
                       WHERE e.hash = m.hash AND e.channel_id = ?1
                   )
                 ORDER BY m.height ASC, m.hash ASC",
            )?;

            let leaves = stmt
                .query_map(params![channel_id], |row| row.get(0))?
                .collect::<Result<Vec<Hash>, _>>()?;
            Ok(leaves)
        })
        .await
    }

    /// Whether a message with this hash exists in the channel
    pub async fn has_message(&self, channel_id: &[u8], hash: &[u8]) -> StoreResult<bool> {
        let channel_id = channel_id.to_vec();
        let hash = hash.to_vec();

        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM messages WHERE channel_id = ?1 AND hash = ?2",
                    params![channel_id, hash],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    /// Payload of a message, or `None` if it is not stored in the channel
    pub async fn get_message(&self, channel_id: &[u8], hash: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let channel_id = channel_id.to_vec();
        let hash = hash.to_vec();

        self.with_conn(move |conn| {
            let payload = conn
                .query_row(
                    "SELECT payload FROM messages WHERE channel_id = ?1 AND hash = ?2",
                    params![channel_id, hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(payload)
        })
        .await
    }

    /// [`get_message`](Self::get_message), reconstructed through [`FromPayload`]
    pub async fn get_message_as<T: FromPayload>(
        &self,
        channel_id: &[u8],
        hash: &[u8],
    ) -> StoreResult<Option<T>> {
        self.get_message(channel_id, hash)
            .await?
            .map(|payload| T::from_payload(&payload))
            .transpose()
    }

    /// Look up many messages at once.
    ///
    /// The result is position-aligned with `hashes`: duplicates are
    /// answered at every position and missing messages are `None`.
    /// Lookups are issued in batches of at most `lookup_batch_size`
    /// hashes, taken in sorted hash order.
    pub async fn get_messages<H: AsRef<[u8]>>(
        &self,
        channel_id: &[u8],
        hashes: &[H],
    ) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let channel_id = channel_id.to_vec();
        let wanted: Vec<Hash> = hashes.iter().map(|h| h.as_ref().to_vec()).collect();
        let batch_size = self.config().lookup_batch_size;

        let (payloads, batches) = self
            .with_conn(move |conn| {
                // Query each distinct hash once, in sorted order
                let mut distinct: Vec<&Hash> = wanted.iter().collect();
                distinct.sort();
                distinct.dedup();

                let mut found: HashMap<Hash, Vec<u8>> = HashMap::with_capacity(distinct.len());
                let mut batches = 0u64;

                for chunk in distinct.chunks(batch_size) {
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql = format!(
                        "SELECT hash, payload FROM messages WHERE channel_id = ? AND hash IN ({})",
                        placeholders
                    );

                    let mut stmt = conn.prepare(&sql)?;
                    let params = std::iter::once(&channel_id).chain(chunk.iter().copied());
                    let mut rows = stmt.query(params_from_iter(params))?;

                    while let Some(row) = rows.next()? {
                        found.insert(row.get(0)?, row.get(1)?);
                    }
                    batches += 1;
                }

                let payloads: Vec<Option<Vec<u8>>> =
                    wanted.iter().map(|hash| found.get(hash.as_slice()).cloned()).collect();
                Ok((payloads, batches))
            })
            .await?;

        record_counter(LOOKUP_BATCHES, batches);
        Ok(payloads)
    }

    /// [`get_messages`](Self::get_messages), reconstructed through [`FromPayload`]
    pub async fn get_messages_as<T: FromPayload, H: AsRef<[u8]>>(
        &self,
        channel_id: &[u8],
        hashes: &[H],
    ) -> StoreResult<Vec<Option<T>>> {
        self.get_messages(channel_id, hashes)
            .await?
            .into_iter()
            .map(|payload| payload.map(|p| T::from_payload(&p)).transpose())
            .collect()
    }

    /// Up to `limit` hashes starting at `offset` in CRDT order
    pub async fn get_hashes_at_offset(
        &self,
        channel_id: &[u8],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Hash>> {
        self.hashes_at_offset(channel_id, offset, limit, "ASC").await
    }

    /// Up to `limit` hashes starting at `offset` in reverse CRDT order
    pub async fn get_reverse_hashes_at_offset(
        &self,
        channel_id: &[u8],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Hash>> {
        self.hashes_at_offset(channel_id, offset, limit, "DESC").await
    }

    async fn hashes_at_offset(
        &self,
        channel_id: &[u8],
        offset: usize,
        limit: usize,
        direction: &'static str,
    ) -> StoreResult<Vec<Hash>> {
        let channel_id = channel_id.to_vec();

        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT hash FROM messages WHERE channel_id = ?1
                 ORDER BY height {dir}, hash {dir}
                 LIMIT ?2 OFFSET ?3",
                dir = direction
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let hashes = stmt
                .query_map(params![channel_id, sql_count(limit), sql_count(offset)], |row| row.get(0))?
                .collect::<Result<Vec<Hash>, _>>()?;
            Ok(hashes)
        })
        .await
    }

    /// Delete every message and parent edge of a channel atomically.
    /// Entities and other channels are untouched.
    pub async fn remove_channel_messages(&self, channel_id: &[u8]) -> StoreResult<()> {
        let channel = channel_id.to_vec();

        let (messages, edges) = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let messages = tx.execute("DELETE FROM messages WHERE channel_id = ?1", params![channel])?;
                let edges = tx.execute("DELETE FROM parent_edges WHERE channel_id = ?1", params![channel])?;
                tx.commit()?;
                Ok((messages, edges))
            })
            .await?;

        info!(
            channel = %hex::encode(channel_id),
            messages,
            edges,
            "Removed channel messages"
        );
        record_counter(CHANNELS_PURGED, 1);
        Ok(())
    }

    /// Distinct channels that have at least one stored message, sorted
    pub async fn get_channel_ids(&self) -> StoreResult<Vec<ChannelId>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT DISTINCT channel_id FROM messages ORDER BY channel_id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<ChannelId>, _>>()?;
            Ok(ids)
        })
        .await
    }
}

/// Where an ordered scan starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scan {
    /// All messages at or above a height, ascending
    FromHeight(i64),
    /// The anchor and everything after it, ascending
    From { height: i64, hash: Hash },
    /// Everything strictly before the anchor, descending
    Before { height: i64, hash: Hash },
}

/// Height of `hash` within the channel, if stored there
pub(crate) fn anchor_height(conn: &Connection, channel_id: &[u8], hash: &[u8]) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT height FROM messages WHERE channel_id = ?1 AND hash = ?2",
        params![channel_id, hash],
        |row| row.get(0),
    )
    .optional()
}

/// Fetch up to `fetch` abbreviated messages in scan order
pub(crate) fn scan_ordered(
    conn: &Connection,
    channel_id: &[u8],
    scan: &Scan,
    fetch: i64,
) -> StoreResult<Vec<AbbreviatedMessage>> {
    let rows = match scan {
        Scan::FromHeight(height) => scan_rows(
            conn,
            "SELECT hash, parents FROM messages
             WHERE channel_id = ?1 AND height >= ?2
             ORDER BY height ASC, hash ASC
             LIMIT ?3",
            params![channel_id, height, fetch],
        )?,
        Scan::From { height, hash } => scan_rows(
            conn,
            "SELECT hash, parents FROM messages
             WHERE channel_id = ?1 AND (height > ?2 OR (height = ?2 AND hash >= ?3))
             ORDER BY height ASC, hash ASC
             LIMIT ?4",
            params![channel_id, height, hash, fetch],
        )?,
        Scan::Before { height, hash } => scan_rows(
            conn,
            "SELECT hash, parents FROM messages
             WHERE channel_id = ?1 AND (height < ?2 OR (height = ?2 AND hash < ?3))
             ORDER BY height DESC, hash DESC
             LIMIT ?4",
            params![channel_id, height, hash, fetch],
        )?,
    };

    rows.into_iter()
        .map(|(hash, parents)| {
            Ok(AbbreviatedMessage { hash, parents: decode_hash_list(&parents)? })
        })
        .collect()
}

fn scan_rows<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> rusqlite::Result<Vec<(Hash, Vec<u8>)>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params, abbreviated_row)?.collect();
    rows
}

fn abbreviated_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Hash, Vec<u8>)> {
    Ok((row.get(0)?, row.get(1)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::StoreError;
    use crate::model::Message;

    fn msg(hash: &[u8], parents: &[&[u8]], height: u64) -> Message {
        Message::new(
            b"chan".to_vec(),
            hash.to_vec(),
            parents.iter().map(|p| p.to_vec()).collect(),
            height,
            [b"body-".as_slice(), hash].concat(),
        )
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();

        assert!(store.has_message(b"chan", b"a").await.unwrap());
        assert!(!store.has_message(b"other", b"a").await.unwrap());
        assert_eq!(store.get_message(b"chan", b"a").await.unwrap(), Some(b"body-a".to_vec()));
        assert_eq!(store.get_message(b"chan", b"zz").await.unwrap(), None);
        assert_eq!(store.get_message_count(b"chan").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_same_hash() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();

        let mut replacement = msg(b"a", &[], 0);
        replacement.body = b"second".to_vec();
        store.add_message(&replacement).await.unwrap();

        assert_eq!(store.get_message_count(b"chan").await.unwrap(), 1);
        assert_eq!(store.get_message(b"chan", b"a").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_oversized_parent_writes_nothing() {
        let store = DagStore::open_temporary().await.unwrap();
        let long = vec![7u8; 256];
        let bad = Message::new(b"chan".to_vec(), b"b".to_vec(), vec![long], 1, b"x".to_vec());

        let result = store.add_message(&bad).await;
        assert!(matches!(result, Err(StoreError::HashTooLong { len: 256 })));
        assert_eq!(store.get_message_count(b"chan").await.unwrap(), 0);
        assert_eq!(store.get_leaf_hashes(b"chan").await.unwrap(), Vec::<Hash>::new());
    }

    #[tokio::test]
    async fn test_height_beyond_storage_range() {
        let store = DagStore::open_temporary().await.unwrap();
        let result = store.add_message(&msg(b"a", &[b"p"], u64::MAX)).await;
        assert!(matches!(result, Err(StoreError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_leaves_follow_edges() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();
        assert_eq!(store.get_leaf_hashes(b"chan").await.unwrap(), vec![b"a".to_vec()]);

        store.add_message(&msg(b"c", &[b"a"], 1)).await.unwrap();
        store.add_message(&msg(b"b", &[b"a"], 1)).await.unwrap();
        assert_eq!(
            store.get_leaf_hashes(b"chan").await.unwrap(),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_edge_to_unknown_parent_is_kept() {
        let store = DagStore::open_temporary().await.unwrap();

        // Child arrives before its parent
        store.add_message(&msg(b"b", &[b"a"], 1)).await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();

        assert_eq!(store.get_leaf_hashes(b"chan").await.unwrap(), vec![b"b".to_vec()]);
    }

    #[tokio::test]
    async fn test_get_messages_small_batches() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: Some(dir.path().join("dag.db")),
            lookup_batch_size: 2,
            ..Default::default()
        };
        let store = DagStore::open(config).await.unwrap();

        for (i, hash) in [b"m1", b"m2", b"m3", b"m4", b"m5"].iter().enumerate() {
            let parents: Vec<&[u8]> = if i == 0 { vec![] } else { vec![b"m1".as_slice()] };
            store.add_message(&msg(*hash, &parents, (i > 0) as u64)).await.unwrap();
        }

        let wanted: Vec<&[u8]> = vec![b"m5", b"nope", b"m1", b"m5", b"m3", b"m2", b"m4"];
        let found = store.get_messages(b"chan", &wanted).await.unwrap();

        assert_eq!(found.len(), wanted.len());
        for (hash, payload) in wanted.iter().zip(&found) {
            if *hash == b"nope" {
                assert!(payload.is_none());
            } else {
                assert_eq!(payload.as_deref(), Some([b"body-".as_slice(), *hash].concat().as_slice()));
            }
        }
    }

    #[tokio::test]
    async fn test_get_messages_empty_and_other_channel() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();

        let none: Vec<Hash> = Vec::new();
        assert!(store.get_messages(b"chan", &none).await.unwrap().is_empty());
        assert_eq!(store.get_messages(b"other", &[b"a"]).await.unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_typed_lookups() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();

        let one: Option<Vec<u8>> = store.get_message_as(b"chan", b"a").await.unwrap();
        assert_eq!(one, Some(b"body-a".to_vec()));

        let many: Vec<Option<Vec<u8>>> = store.get_messages_as(b"chan", &[b"x", b"a"]).await.unwrap();
        assert_eq!(many, vec![None, Some(b"body-a".to_vec())]);
    }

    #[tokio::test]
    async fn test_remove_channel_messages() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();
        store.add_message(&msg(b"b", &[b"a"], 1)).await.unwrap();
        let other = Message::new(b"other".to_vec(), b"x".to_vec(), vec![], 0, b"x".to_vec());
        store.add_message(&other).await.unwrap();

        store.remove_channel_messages(b"chan").await.unwrap();

        assert_eq!(store.get_message_count(b"chan").await.unwrap(), 0);
        assert!(store.get_leaf_hashes(b"chan").await.unwrap().is_empty());
        assert_eq!(store.get_channel_ids().await.unwrap(), vec![b"other".to_vec()]);

        // Re-adding a root after purge makes it a leaf again
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();
        assert_eq!(store.get_leaf_hashes(b"chan").await.unwrap(), vec![b"a".to_vec()]);
    }

    #[tokio::test]
    async fn test_offsets() {
        let store = DagStore::open_temporary().await.unwrap();
        store.add_message(&msg(b"a", &[], 0)).await.unwrap();
        store.add_message(&msg(b"c", &[b"a"], 1)).await.unwrap();
        store.add_message(&msg(b"b", &[b"a"], 1)).await.unwrap();
        store.add_message(&msg(b"d", &[b"b", b"c"], 2)).await.unwrap();

        let forward = store.get_hashes_at_offset(b"chan", 1, 2).await.unwrap();
        assert_eq!(forward, vec![b"b".to_vec(), b"c".to_vec()]);

        let reverse = store.get_reverse_hashes_at_offset(b"chan", 0, 10).await.unwrap();
        assert_eq!(reverse, vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);

        assert!(store.get_hashes_at_offset(b"chan", 10, 2).await.unwrap().is_empty());
        assert_eq!(store.get_hashes_at_offset(b"chan", 0, usize::MAX).await.unwrap().len(), 4);
    }
}
