//! Turning fetched rows into a page plus continuation cursors
//!
//! Both functions receive up to `limit + 1` rows in scan order. The extra
//! row only signals that more data exists in that direction.

use super::{AbbreviatedMessage, QueryPage};
use crate::model::Hash;

/// Build a forward page from rows in ascending CRDT order.
///
/// `backward_hash` is the first message of the page. `forward_hash` is the
/// first message past the page, if one was fetched.
pub fn paginate_forward(mut rows: Vec<AbbreviatedMessage>, limit: usize) -> QueryPage {
    let forward_hash = if rows.len() > limit {
        rows.truncate(limit + 1);
        rows.pop().map(|extra| extra.hash)
    } else {
        None
    };

    QueryPage {
        backward_hash: rows.first().map(|m| m.hash.clone()),
        forward_hash,
        messages: rows,
    }
}

/// Build a backward page from rows in descending CRDT order, strictly
/// before `anchor`.
///
/// The page is returned ascending. `backward_hash` is set only when older
/// messages remain: it is the earliest message of the page, or the anchor
/// when the page is empty. `forward_hash` is always the anchor.
pub fn paginate_backward(mut rows: Vec<AbbreviatedMessage>, limit: usize, anchor: Hash) -> QueryPage {
    let more = rows.len() > limit;
    rows.truncate(limit);
    rows.reverse();

    let backward_hash = if more {
        Some(rows.first().map_or_else(|| anchor.clone(), |m| m.hash.clone()))
    } else {
        None
    };

    QueryPage {
        backward_hash,
        forward_hash: Some(anchor),
        messages: rows,
    }
}
