//! Fuzz target for snapshot file parsing.
//!
//! Snapshot files are user supplied on `keyshelf import`, so parsing must
//! reject malformed documents with an error and never panic.
//!
//! Run with: `cargo +nightly fuzz run fuzz_snapshot_file`

#![no_main]

use keyshelf::SnapshotFile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(file) = serde_json::from_slice::<SnapshotFile>(data) else {
        return;
    };
    let rows = file.rows.len();
    let store = file.store.clone();

    // Duplicate keys collapse, so the map never grows past the row list
    let snapshot = file.into_snapshot();
    assert!(snapshot.len() <= rows);

    let json = serde_json::to_vec(&SnapshotFile::new(store, keyshelf::Timestamp::ZERO, snapshot))
        .expect("snapshot serializes");
    assert!(serde_json::from_slice::<SnapshotFile>(&json).is_ok());
});
