//! Hash list codec
//!
//! Parent lists are stored in a single BLOB column. Each hash is written as
//! one length byte followed by the hash bytes, so hashes of any length up to
//! 255 bytes can share a buffer:
//!
//! ```text
//! [len0][hash0 ...][len1][hash1 ...]...
//! ```

use crate::error::{StoreError, StoreResult};
use crate::model::Hash;

/// Largest hash the one-byte length prefix can describe
pub const MAX_HASH_LEN: usize = u8::MAX as usize;

/// Encode an ordered list of hashes.
///
/// Fails with [`StoreError::HashTooLong`] if any element exceeds
/// [`MAX_HASH_LEN`] bytes.
pub fn encode_hash_list<H: AsRef<[u8]>>(hashes: &[H]) -> StoreResult<Vec<u8>> {
    let total: usize = hashes.iter().map(|h| h.as_ref().len() + 1).sum();
    let mut buf = Vec::with_capacity(total);

    for hash in hashes {
        let hash = hash.as_ref();
        let len = u8::try_from(hash.len())
            .map_err(|_| StoreError::HashTooLong { len: hash.len() })?;
        buf.push(len);
        buf.extend_from_slice(hash);
    }

    Ok(buf)
}

/// Decode a buffer produced by [`encode_hash_list`].
pub fn decode_hash_list(buf: &[u8]) -> StoreResult<Vec<Hash>> {
    let mut hashes = Vec::new();
    let mut pos = 0;

    while pos < buf.len() {
        let len = buf[pos] as usize;
        pos += 1;

        let end = pos + len;
        if end > buf.len() {
            return Err(StoreError::CorruptedData(format!(
                "hash list truncated: element at offset {} wants {} bytes, {} remain",
                pos - 1,
                len,
                buf.len() - pos
            )));
        }

        hashes.push(buf[pos..end].to_vec());
        pos = end;
    }

    Ok(hashes)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_roundtrip(
            hashes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..=255), 0..20),
        ) {
            let encoded = encode_hash_list(&hashes).unwrap();
            prop_assert_eq!(decode_hash_list(&encoded).unwrap(), hashes);
        }

        #[test]
        fn prop_encoded_length(
            hashes in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..20),
        ) {
            let encoded = encode_hash_list(&hashes).unwrap();
            let expected: usize = hashes.iter().map(|h| h.len() + 1).sum();
            prop_assert_eq!(encoded.len(), expected);
        }
    }
}
