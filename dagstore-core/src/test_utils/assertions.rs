//! Assertions for pages and hash lists

use crate::model::Hash;
use crate::query::QueryPage;

/// Render hashes as text for readable failure messages
pub fn hash_strings(hashes: &[Hash]) -> Vec<String> {
    hashes.iter().map(|h| String::from_utf8_lossy(h).into_owned()).collect()
}

/// Hashes of a page's messages, as text
pub fn page_hashes(page: &QueryPage) -> Vec<String> {
    page.messages.iter().map(|m| String::from_utf8_lossy(&m.hash).into_owned()).collect()
}

/// Assert a page's messages and both continuation cursors
pub fn assert_page(page: &QueryPage, expected: &[&str], backward: Option<&str>, forward: Option<&str>) {
    assert_eq!(page_hashes(page), expected, "page messages");
    assert_eq!(
        page.backward_hash.as_deref(),
        backward.map(str::as_bytes),
        "backward cursor of page {:?}",
        expected
    );
    assert_eq!(
        page.forward_hash.as_deref(),
        forward.map(str::as_bytes),
        "forward cursor of page {:?}",
        expected
    );
}

/// Assert a hash list equals the given text hashes, in order
pub fn assert_hashes(actual: &[Hash], expected: &[&str]) {
    assert_eq!(hash_strings(actual), expected);
}
