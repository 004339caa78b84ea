//! Test fixtures for messages and stores

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::model::{Hash, Message};
use crate::store::DagStore;
use std::path::Path;

/// Channel used by the default fixtures
pub const TEST_CHANNEL: &[u8] = b"test-channel";

/// Builder for test messages
///
/// Height defaults to 0 for a root and 1 otherwise; set it explicitly for
/// deeper messages.
pub struct TestMessageBuilder {
    channel_id: Vec<u8>,
    hash: Hash,
    parents: Vec<Hash>,
    height: Option<u64>,
    body: Option<Vec<u8>>,
}

impl TestMessageBuilder {
    pub fn new(hash: impl AsRef<[u8]>) -> Self {
        Self {
            channel_id: TEST_CHANNEL.to_vec(),
            hash: hash.as_ref().to_vec(),
            parents: Vec::new(),
            height: None,
            body: None,
        }
    }

    pub fn channel(mut self, channel_id: impl AsRef<[u8]>) -> Self {
        self.channel_id = channel_id.as_ref().to_vec();
        self
    }

    pub fn parent(mut self, parent: impl AsRef<[u8]>) -> Self {
        self.parents.push(parent.as_ref().to_vec());
        self
    }

    pub fn height(mut self, height: u64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn build(self) -> Message {
        let height = self.height.unwrap_or(if self.parents.is_empty() { 0 } else { 1 });
        let body = self.body.unwrap_or_else(|| body_for(&self.hash));
        Message::new(self.channel_id, self.hash, self.parents, height, body)
    }
}

/// Default body of a fixture message
pub fn body_for(hash: &[u8]) -> Vec<u8> {
    [b"body:".as_slice(), hash].concat()
}

/// The four-message diamond in `channel`:
///
/// ```text
///     a (0)
///    /     \
///  b (1)  c (1)
///    \     /
///     d (2)
/// ```
///
/// Returned in CRDT order `a, b, c, d`.
pub fn diamond(channel: &[u8]) -> Vec<Message> {
    prefixed_diamond(channel, "")
}

/// [`diamond`] with every hash prefixed by `prefix`.
///
/// Hashes are unique across the whole store, so a second channel seeded in
/// the same store needs its own prefix.
pub fn prefixed_diamond(channel: &[u8], prefix: &str) -> Vec<Message> {
    let h = |name: &str| format!("{}{}", prefix, name);
    vec![
        TestMessageBuilder::new(h("a")).channel(channel).build(),
        TestMessageBuilder::new(h("b")).channel(channel).parent(h("a")).build(),
        TestMessageBuilder::new(h("c")).channel(channel).parent(h("a")).build(),
        TestMessageBuilder::new(h("d")).channel(channel).parent(h("b")).parent(h("c")).height(2).build(),
    ]
}

/// A single chain of `len` messages with hashes `m0000`, `m0001`, ...
pub fn linear_chain(channel: &[u8], len: usize) -> Vec<Message> {
    (0..len)
        .map(|i| {
            let mut builder = TestMessageBuilder::new(chain_hash(i)).channel(channel).height(i as u64);
            if i > 0 {
                builder = builder.parent(chain_hash(i - 1));
            }
            builder.build()
        })
        .collect()
}

/// Hash of the `i`th message of [`linear_chain`]
pub fn chain_hash(i: usize) -> Hash {
    format!("m{:04}", i).into_bytes()
}

/// Open a store backed by a file in `dir`
pub async fn open_store_in(dir: &Path) -> StoreResult<DagStore> {
    DagStore::open(StoreConfig::with_path(dir.join("dagstore.db"))).await
}

/// Insert messages in the given order
pub async fn add_all(store: &DagStore, messages: &[Message]) -> StoreResult<()> {
    for message in messages {
        store.add_message(message).await?;
    }
    Ok(())
}
