//! Cursor-based pagination over the CRDT order
//!
//! A query resumes from a previously seen message (`Cursor::Hash`) in
//! either direction, or from a height (`Cursor::Height`, forward only).
//! Each page carries the cursors needed to continue:
//!
//! - `backward_hash`: query backward from here to see older messages
//! - `forward_hash`: query forward from here to see newer messages
//!
//! A `None` cursor means there is nothing more in that direction.

pub mod page;

pub use page::{paginate_backward, paginate_forward};

use crate::error::{StoreError, StoreResult};
use crate::metrics::{record_counter, QUERIES_TOTAL};
use crate::model::Hash;
use crate::store::messages::{anchor_height, scan_ordered, Scan};
use crate::store::sql_store::sql_count;
use crate::store::DagStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a page starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
    /// A message already seen by the caller
    Hash(Hash),
    /// A height; only valid for forward queries
    Height(u64),
}

/// A message reduced to its identity and parent links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbbreviatedMessage {
    pub hash: Hash,
    pub parents: Vec<Hash>,
}

/// One page of the CRDT order, ascending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    pub messages: Vec<AbbreviatedMessage>,
    pub backward_hash: Option<Hash>,
    pub forward_hash: Option<Hash>,
}

impl QueryPage {
    /// Page with no messages and no cursors
    pub fn empty() -> Self {
        Self::default()
    }
}

impl DagStore {
    /// Fetch up to `limit` messages of a channel starting at `cursor`.
    ///
    /// Forward from a hash, the page includes the anchor itself. Backward
    /// from a hash, the page holds the messages strictly before it. An
    /// anchor hash not stored in the channel yields an empty page, and a
    /// backward query from a height is rejected without touching storage.
    pub async fn query(
        &self,
        channel_id: &[u8],
        cursor: Cursor,
        is_backward: bool,
        limit: usize,
    ) -> StoreResult<QueryPage> {
        if is_backward && matches!(cursor, Cursor::Height(_)) {
            return Err(StoreError::Unsupported(
                "backward pagination from a height cursor".to_string(),
            ));
        }

        let channel = channel_id.to_vec();
        let fetch = sql_count(limit.saturating_add(1));

        let page = self
            .with_conn(move |conn| {
                let (scan, anchor) = match cursor {
                    Cursor::Height(height) => match i64::try_from(height) {
                        Ok(height) => (Scan::FromHeight(height), None),
                        // No stored height can reach it
                        Err(_) => return Ok(QueryPage::empty()),
                    },
                    Cursor::Hash(hash) => match anchor_height(conn, &channel, &hash)? {
                        None => return Ok(QueryPage::empty()),
                        Some(height) if is_backward => {
                            (Scan::Before { height, hash: hash.clone() }, Some(hash))
                        }
                        Some(height) => (Scan::From { height, hash }, None),
                    },
                };

                let rows = scan_ordered(conn, &channel, &scan, fetch)?;
                Ok(match anchor {
                    Some(anchor) => paginate_backward(rows, limit, anchor),
                    None => paginate_forward(rows, limit),
                })
            })
            .await?;

        debug!(
            channel = %hex::encode(channel_id),
            backward = is_backward,
            limit,
            returned = page.messages.len(),
            "Executed query"
        );
        record_counter(QUERIES_TOTAL, 1);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    async fn diamond_store() -> DagStore {
        let store = DagStore::open_temporary().await.unwrap();
        let chan = b"chan".to_vec();
        let a = Message::new(chan.clone(), b"a".to_vec(), vec![], 0, b"A".to_vec());
        let b = Message::new(chan.clone(), b"b".to_vec(), vec![b"a".to_vec()], 1, b"B".to_vec());
        let c = Message::new(chan.clone(), b"c".to_vec(), vec![b"a".to_vec()], 1, b"C".to_vec());
        let d = Message::new(chan, b"d".to_vec(), vec![b"b".to_vec(), b"c".to_vec()], 2, b"D".to_vec());
        for msg in [&d, &c, &a, &b] {
            store.add_message(msg).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_backward_height_unsupported() {
        let store = diamond_store().await;
        let result = store.query(b"chan", Cursor::Height(1), true, 2).await;
        assert!(matches!(result, Err(StoreError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_parents_decoded() {
        let store = diamond_store().await;
        let page = store.query(b"chan", Cursor::Height(2), false, 10).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].hash, b"d".to_vec());
        assert_eq!(page.messages[0].parents, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[tokio::test]
    async fn test_unknown_anchor_backward() {
        let store = diamond_store().await;
        let page = store.query(b"chan", Cursor::Hash(b"zz".to_vec()), true, 2).await.unwrap();
        assert_eq!(page, QueryPage::empty());
    }

    #[tokio::test]
    async fn test_anchor_from_other_channel() {
        let store = diamond_store().await;
        let page = store.query(b"other", Cursor::Hash(b"a".to_vec()), false, 2).await.unwrap();
        assert_eq!(page, QueryPage::empty());
    }

    #[tokio::test]
    async fn test_height_beyond_stored_range_is_empty() {
        let store = diamond_store().await;
        let page = store.query(b"chan", Cursor::Height(u64::MAX), false, 2).await.unwrap();
        assert_eq!(page, QueryPage::empty());

        let page = store.query(b"chan", Cursor::Height(3), false, 2).await.unwrap();
        assert_eq!(page, QueryPage::empty());
    }
}
