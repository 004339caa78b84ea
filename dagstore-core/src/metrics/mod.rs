//! Operation counters
//!
//! Recorded through the `metrics` facade; they are no-ops until the host
//! application installs a recorder. Descriptions are registered the first
//! time a store is opened, so the recorder must be installed before that.

use metrics::{counter, describe_counter};
use std::sync::Once;

static DESCRIBED: Once = Once::new();

pub const MESSAGES_ADDED: &str = "dagstore.messages.added";
pub const CHANNELS_PURGED: &str = "dagstore.channels.purged";
pub const QUERIES_TOTAL: &str = "dagstore.queries.total";
pub const LOOKUP_BATCHES: &str = "dagstore.lookups.batches";
pub const ENTITIES_STORED: &str = "dagstore.entities.stored";
pub const STORE_WIPED: &str = "dagstore.store.wiped";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(MESSAGES_ADDED, "Messages inserted or replaced");
    describe_counter!(CHANNELS_PURGED, "Channels removed with all their messages");
    describe_counter!(QUERIES_TOTAL, "Cursor queries executed");
    describe_counter!(LOOKUP_BATCHES, "Round trips issued by batched message lookups");
    describe_counter!(ENTITIES_STORED, "Entities inserted or replaced");
    describe_counter!(STORE_WIPED, "Destructive wipes caused by an old schema version");
}

/// Run [`init_metrics`] once per process
pub(crate) fn describe_once() {
    DESCRIBED.call_once(init_metrics);
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        init_metrics();
        record_counter(MESSAGES_ADDED, 1);
        record_counter(LOOKUP_BATCHES, 3);
    }

    #[tokio::test]
    async fn test_open_registers_descriptions() {
        let store = crate::DagStore::open_temporary().await.unwrap();
        assert!(DESCRIBED.is_completed());

        // Later opens do not describe again
        describe_once();
        store.close().await.unwrap();
    }
}
