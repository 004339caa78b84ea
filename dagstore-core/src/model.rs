//! Message and entity capabilities
//!
//! The store never inspects payloads. Callers hand it objects that can
//! produce their own bytes and get bytes back, optionally reconstructed
//! through [`FromPayload`] or [`Entity`].

use crate::error::StoreResult;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Message hash (opaque, globally unique)
pub type Hash = Vec<u8>;

/// Channel identifier (opaque)
pub type ChannelId = Vec<u8>;

/// A message that can be persisted in a channel DAG
///
/// `height` must be 0 for a root and `1 + max(parent heights)` otherwise.
/// The store persists it as given.
pub trait DagMessage: Send + Sync {
    fn channel_id(&self) -> &[u8];

    fn hash(&self) -> &[u8];

    fn height(&self) -> u64;

    fn parents(&self) -> &[Hash];

    /// Serialized message body
    fn to_payload(&self) -> StoreResult<Vec<u8>>;
}

/// Reconstruct a message from its stored payload
pub trait FromPayload: Sized {
    fn from_payload(payload: &[u8]) -> StoreResult<Self>;
}

/// An auxiliary object kept in the entity store
pub trait Entity: Sized {
    fn to_bytes(&self) -> StoreResult<Vec<u8>>;

    fn from_bytes(bytes: &[u8]) -> StoreResult<Self>;
}

impl Entity for Vec<u8> {
    fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(self.clone())
    }

    fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

/// Stores any serde type as a JSON entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize + DeserializeOwned> Entity for Json<T> {
    fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(Json(serde_json::from_slice(bytes)?))
    }
}

/// Owned message whose payload is its body bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub channel_id: ChannelId,
    pub hash: Hash,
    pub parents: Vec<Hash>,
    pub height: u64,
    pub body: Vec<u8>,
}

impl Message {
    pub fn new(
        channel_id: impl Into<ChannelId>,
        hash: impl Into<Hash>,
        parents: Vec<Hash>,
        height: u64,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            hash: hash.into(),
            parents,
            height,
            body: body.into(),
        }
    }
}

impl DagMessage for Message {
    fn channel_id(&self) -> &[u8] {
        &self.channel_id
    }

    fn hash(&self) -> &[u8] {
        &self.hash
    }

    fn height(&self) -> u64 {
        self.height
    }

    fn parents(&self) -> &[Hash] {
        &self.parents
    }

    fn to_payload(&self) -> StoreResult<Vec<u8>> {
        Ok(self.body.clone())
    }
}

/// Payload as raw bytes
impl FromPayload for Vec<u8> {
    fn from_payload(payload: &[u8]) -> StoreResult<Self> {
        Ok(payload.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Identity {
        name: String,
        key: Vec<u8>,
    }

    #[test]
    fn test_message_payload_is_body() {
        let msg = Message::new(b"chan".to_vec(), b"h1".to_vec(), vec![], 0, b"hello".to_vec());
        assert_eq!(msg.to_payload().unwrap(), b"hello".to_vec());
        assert_eq!(DagMessage::channel_id(&msg), b"chan");
        assert!(DagMessage::parents(&msg).is_empty());
    }

    #[test]
    fn test_json_entity_roundtrip() {
        let identity = Json(Identity { name: "alice".to_string(), key: vec![1, 2, 3] });
        let bytes = identity.to_bytes().unwrap();
        let restored = Json::<Identity>::from_bytes(&bytes).unwrap();
        assert_eq!(restored, identity);
    }

    #[test]
    fn test_json_entity_rejects_garbage() {
        let result = Json::<Identity>::from_bytes(b"not json");
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }
}
