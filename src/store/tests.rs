//! Tests for the store module.

use super::*;
use crate::clock::ManualClock;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::AtomicUsize;
use tempfile::TempDir;

const START: Timestamp = Timestamp::from_micros(1_700_000_000_000_000);

async fn open(options: StoreOptions) -> Store {
    let engine = Engine::memory().unwrap();
    engine.init("test", options).await.unwrap()
}

async fn scores() -> Store {
    let store = open(StoreOptions::new().index(IndexDef::new("byPoints", "points"))).await;
    for (name, points) in [("ann", 15), ("bob", 16), ("cy", 17), ("di", 20)] {
        store.set(name, json!({"points": points})).await.unwrap();
    }
    store
}

fn points(result: &IndexResult) -> Vec<i64> {
    result
        .records()
        .iter()
        .map(|record| record.value["points"].as_i64().unwrap())
        .collect()
}

fn keys_of(records: &[Record]) -> Vec<Key> {
    records.iter().map(|record| record.key.clone()).collect()
}

// =============================================================================
// Point operations
// =============================================================================

#[tokio::test]
async fn test_rick_scenario() {
    let store = open(StoreOptions::new()).await;

    store
        .set("rick", json!({"id": 5473, "slug": "rick-and-morty"}))
        .await
        .unwrap();
    assert!(store.has("rick").await.unwrap());

    store.update("rick", json!({"id": 42})).await.unwrap();
    assert_eq!(
        store.get("rick").await.unwrap(),
        Some(json!({"id": 42, "slug": "rick-and-morty"}))
    );

    store.rm("rick").await.unwrap();
    assert!(!store.has("rick").await.unwrap());

    let err = store.update("rick", json!({"id": 1})).await.unwrap_err();
    assert!(matches!(err, Error::NoSuchEntry { .. }));
    let msg = err.to_string();
    assert!(msg.contains("string") && msg.contains("rick"), "{msg}");
}

#[tokio::test]
async fn test_missing_keys() {
    let store = open(StoreOptions::new()).await;
    assert_eq!(store.get("nope").await.unwrap(), None);
    assert!(!store.has("nope").await.unwrap());
    assert!(matches!(
        store.rm(7).await.unwrap_err(),
        Error::NoSuchEntry { key: Key::Int(7) }
    ));
    assert_eq!(store.consume("nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_int_and_string_keys_are_distinct() {
    let store = open(StoreOptions::new()).await;
    store.set(1, json!("int")).await.unwrap();
    store.set("1", json!("str")).await.unwrap();
    assert_eq!(store.get(1).await.unwrap(), Some(json!("int")));
    assert_eq!(store.get("1").await.unwrap(), Some(json!("str")));
    assert_eq!(store.length().await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_merges_and_restamps() {
    let store = open(StoreOptions::new()).await;
    store
        .set("k", json!({"tags": ["a"], "meta": {"x": 1, "y": 2}, "n": 1}))
        .await
        .unwrap();
    let before = store.get_entry("k").await.unwrap().unwrap();

    let merged = store
        .update("k", json!({"tags": ["b"], "meta": {"y": 3}, "n": "one"}))
        .await
        .unwrap();
    assert_eq!(
        merged,
        json!({"tags": ["a", "b"], "meta": {"x": 1, "y": 3}, "n": "one"})
    );

    let after = store.get_entry("k").await.unwrap().unwrap();
    assert_eq!(after.value, merged);
    assert!(after.timestamp > before.timestamp);
}

#[tokio::test]
async fn test_update_with_closure() {
    let store = open(StoreOptions::new()).await;
    store.set("counter", json!({"count": 1})).await.unwrap();

    for _ in 0..3 {
        store
            .update(
                "counter",
                Update::with(|entry| {
                    let count = entry.value["count"].as_i64().unwrap_or(0);
                    Ok(Patch::value(json!({"count": count + 1})))
                }),
            )
            .await
            .unwrap();
    }
    assert_eq!(store.get("counter").await.unwrap(), Some(json!({"count": 4})));

    // A failing closure leaves the entry untouched
    let err = store
        .update(
            "counter",
            Update::with(|_| Err(Error::InvalidKey("nope".into()))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));
    assert_eq!(store.get("counter").await.unwrap(), Some(json!({"count": 4})));
}

#[tokio::test]
async fn test_set_once() {
    let store = open(StoreOptions::new()).await;
    store
        .set_once(json!(1), Some(Key::from("k")), EntryOptions::default())
        .await
        .unwrap();
    let err = store
        .set_once(json!(2), Some(Key::from("k")), EntryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PreexistingKey { .. }));
    assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_consume_deletes_without_default() {
    let store = open(StoreOptions::new()).await;
    store.set("token", json!("abc")).await.unwrap();
    assert_eq!(store.consume("token").await.unwrap(), Some(json!("abc")));
    assert!(!store.has("token").await.unwrap());
    assert_eq!(store.consume("token").await.unwrap(), None);
}

#[tokio::test]
async fn test_consume_resets_to_default() {
    let store = open(StoreOptions::new().consume_default(json!(0))).await;
    store.set("hits", json!(5)).await.unwrap();
    assert_eq!(store.consume("hits").await.unwrap(), Some(json!(5)));
    assert_eq!(store.get("hits").await.unwrap(), Some(json!(0)));
    assert_eq!(store.consume("hits").await.unwrap(), Some(json!(0)));
}

// =============================================================================
// Key policies
// =============================================================================

#[tokio::test]
async fn test_explicit_policy_requires_key() {
    let store = open(StoreOptions::new()).await;
    assert!(matches!(
        store.add(json!(1)).await.unwrap_err(),
        Error::MissingKey
    ));
}

#[tokio::test]
async fn test_autoincrement_counter_persists() {
    let engine = Engine::memory().unwrap();
    let store = engine
        .init("auto", StoreOptions::new().autoincrement(true))
        .await
        .unwrap();
    assert_eq!(store.add(json!("a")).await.unwrap(), Key::Int(1));
    assert_eq!(store.add(json!("b")).await.unwrap(), Key::Int(2));
    store.set(10, json!("c")).await.unwrap();
    assert_eq!(store.add(json!("d")).await.unwrap(), Key::Int(11));

    let reopened = engine
        .init("auto", StoreOptions::new().autoincrement(true))
        .await
        .unwrap();
    assert_eq!(reopened.add(json!("e")).await.unwrap(), Key::Int(12));
}

#[tokio::test]
async fn test_keypath_policy() {
    let store = open(StoreOptions::new().keypath("user.id")).await;
    let key = store.add(json!({"user": {"id": "u1"}})).await.unwrap();
    assert_eq!(key, Key::from("u1"));
    assert!(store.has("u1").await.unwrap());

    assert!(matches!(
        store.set("u2", json!({"user": {"id": "u2"}})).await.unwrap_err(),
        Error::InvalidKey(_)
    ));
    assert!(matches!(
        store.add(json!({"user": {}})).await.unwrap_err(),
        Error::InvalidKey(_)
    ));
    // Only i64 numbers are keys
    assert!(matches!(
        store.add(json!({"user": {"id": 1.5}})).await.unwrap_err(),
        Error::InvalidKey(_)
    ));
    assert_eq!(store.add(json!({"user": {"id": 7}})).await.unwrap(), Key::Int(7));
}

#[tokio::test]
async fn test_autoincrement_with_keypath_is_rejected() {
    let engine = Engine::memory().unwrap();
    let err = engine
        .init("x", StoreOptions::new().autoincrement(true).keypath("id"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidKey(_)));
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn test_expired_entries_are_invisible_and_swept() {
    let clock = Arc::new(ManualClock::new(START));
    let store = open(StoreOptions::new().clock(Arc::clone(&clock))).await;

    store
        .set_with_ttl("session", json!("s"), Duration::from_secs(10))
        .await
        .unwrap();
    store.set("keep", json!("k")).await.unwrap();
    assert_eq!(store.get("session").await.unwrap(), Some(json!("s")));

    clock.advance(Duration::from_secs(9));
    assert!(store.has("session").await.unwrap());

    // Expiry is inclusive: expiry == now is already expired
    clock.advance(Duration::from_secs(1));
    assert_eq!(store.get("session").await.unwrap(), None);
    assert!(!store.has("session").await.unwrap());
    assert_eq!(store.length().await.unwrap(), 1);
    assert_eq!(keys_of(&store.values(false).await.unwrap()), vec![Key::from("keep")]);

    let info = store.engine().describe("test").unwrap().unwrap();
    assert_eq!(info.rows, 1);
}

#[tokio::test]
async fn test_sweep_reports_removed_rows() {
    let clock = Arc::new(ManualClock::new(START));
    let store = open(
        StoreOptions::new()
            .clock(Arc::clone(&clock))
            .index(IndexDef::new("byN", "n")),
    )
    .await;
    for i in 0..3 {
        store
            .put(
                json!({"n": i}),
                Some(Key::Int(i)),
                EntryOptions::expiring_at(START.saturating_add(Duration::from_secs(1))),
            )
            .await
            .unwrap();
    }
    store.set(99, json!({"n": 99})).await.unwrap();

    assert_eq!(store.sweep().await.unwrap(), 0);
    clock.advance(Duration::from_secs(5));
    let before = store.last_modified();
    assert_eq!(store.sweep().await.unwrap(), 3);
    assert!(store.last_modified() > before);

    let all = store.index("byN", IndexQuery::all()).await.unwrap();
    assert_eq!(keys_of(all.records()), vec![Key::Int(99)]);
}

#[tokio::test]
async fn test_update_keeps_and_patches_expiry() {
    let clock = Arc::new(ManualClock::new(START));
    let store = open(StoreOptions::new().clock(Arc::clone(&clock))).await;
    store
        .set_with_ttl("k", json!({"a": 1}), Duration::from_secs(10))
        .await
        .unwrap();

    store.update("k", json!({"b": 2})).await.unwrap();
    let entry = store.get_entry("k").await.unwrap().unwrap();
    let expiry = START.saturating_add(Duration::from_secs(10));
    assert_eq!(entry.options.expiry, Some(expiry));

    let later = START.saturating_add(Duration::from_secs(60));
    store
        .update("k", Patch::options(EntryOptions::expiring_at(later)))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(30));
    assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1, "b": 2})));
}

#[tokio::test]
async fn test_set_once_over_expired_row() {
    let clock = Arc::new(ManualClock::new(START));
    let store = open(StoreOptions::new().clock(Arc::clone(&clock))).await;
    store
        .set_with_ttl("k", json!(1), Duration::from_secs(1))
        .await
        .unwrap();
    clock.advance(Duration::from_secs(2));
    store
        .set_once(json!(2), Some(Key::from("k")), EntryOptions::default())
        .await
        .unwrap();
    assert_eq!(store.get("k").await.unwrap(), Some(json!(2)));
}

// =============================================================================
// Index queries
// =============================================================================

#[tokio::test]
async fn test_index_range_correctness() {
    let store = scores().await;

    let above = store.index("byPoints", IndexQuery::above(17, false)).await.unwrap();
    assert_eq!(points(&above), vec![20]);

    let above_incl = store.index("byPoints", IndexQuery::above(17, true)).await.unwrap();
    assert_eq!(points(&above_incl), vec![17, 20]);

    let between = store.index("byPoints", IndexQuery::between(16, 20)).await.unwrap();
    assert_eq!(points(&between), vec![17]);

    let inclusive = store
        .index(
            "byPoints",
            IndexQuery::mode(QueryMode::Range {
                lower: json!(16),
                upper: json!(20),
                lower_inclusive: true,
                upper_inclusive: true,
            }),
        )
        .await
        .unwrap();
    assert_eq!(points(&inclusive), vec![16, 17, 20]);

    let below = store.index("byPoints", IndexQuery::below(16, true)).await.unwrap();
    assert_eq!(points(&below), vec![15, 16]);

    let only = store.index("byPoints", IndexQuery::only(17)).await.unwrap();
    assert_eq!(keys_of(only.records()), vec![Key::from("cy")]);

    let inverted = store.index("byPoints", IndexQuery::between(20, 15)).await.unwrap();
    assert!(inverted.records().is_empty());
}

#[tokio::test]
async fn test_index_reverse_and_ties() {
    let store = open(StoreOptions::new().index(IndexDef::new("byN", "n"))).await;
    store.set("a", json!({"n": 1})).await.unwrap();
    store.set("b", json!({"n": 1})).await.unwrap();
    store.set("c", json!({"n": 0})).await.unwrap();
    store.set("skip", json!({"other": true})).await.unwrap();

    let forward = store.index("byN", IndexQuery::all()).await.unwrap();
    assert_eq!(
        keys_of(forward.records()),
        vec![Key::from("c"), Key::from("a"), Key::from("b")]
    );

    let reverse = store.index("byN", IndexQuery::all().reverse(true)).await.unwrap();
    assert_eq!(
        keys_of(reverse.records()),
        vec![Key::from("b"), Key::from("a"), Key::from("c")]
    );
}

#[tokio::test]
async fn test_index_pagination() {
    let store = scores().await;

    let first = store
        .index("byPoints", IndexQuery::all().page(PageRequest::new(1).sz(3)))
        .await
        .unwrap();
    let IndexResult::Page(first) = first else {
        panic!("expected a page");
    };
    assert_eq!(first.items.len(), 3);
    assert!(first.has_next);

    let second = store
        .index("byPoints", IndexQuery::all().page(PageRequest::new(2).sz(3)))
        .await
        .unwrap();
    assert_eq!(points(&second), vec![20]);
    assert!(matches!(second, IndexResult::Page(Page { has_next: false, .. })));

    let offset = store
        .index(
            "byPoints",
            IndexQuery::above(15, false).page(PageRequest::new(1).sz(2).offset(1)),
        )
        .await
        .unwrap();
    assert_eq!(points(&offset), vec![17, 20]);
}

#[tokio::test]
async fn test_multi_entry_index() {
    let store = open(StoreOptions::new().index(IndexDef::new("byTag", "tags").multi_entry())).await;
    store.set("a", json!({"tags": ["x", "y", "y"]})).await.unwrap();
    store.set("b", json!({"tags": ["y"]})).await.unwrap();
    store.set("c", json!({"tags": []})).await.unwrap();

    let y = store.index("byTag", IndexQuery::only("y")).await.unwrap();
    assert_eq!(keys_of(y.records()), vec![Key::from("a"), Key::from("b")]);
    let x = store.index("byTag", IndexQuery::only("x")).await.unwrap();
    assert_eq!(keys_of(x.records()), vec![Key::from("a")]);

    store.update("b", json!({"tags": ["x"]})).await.unwrap();
    let x = store.index("byTag", IndexQuery::only("x")).await.unwrap();
    assert_eq!(keys_of(x.records()), vec![Key::from("a"), Key::from("b")]);
}

#[tokio::test]
async fn test_unique_index() {
    let store = open(StoreOptions::new().index(IndexDef::new("bySlug", "slug").unique())).await;
    store.set("a", json!({"slug": "x"})).await.unwrap();
    store.set("a", json!({"slug": "x", "v": 2})).await.unwrap();

    let err = store.set("b", json!({"slug": "x"})).await.unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation { ref index, .. } if index == "bySlug"));
    assert!(!store.has("b").await.unwrap());

    store.set("b", json!({"slug": "y"})).await.unwrap();
    assert_eq!(store.length().await.unwrap(), 2);
}

#[tokio::test]
async fn test_unknown_index_and_bad_query_value() {
    let store = scores().await;
    assert!(matches!(
        store.index("byNothing", IndexQuery::all()).await.unwrap_err(),
        Error::NoSuchIndex(_)
    ));
    assert!(matches!(
        store.index("byPoints", IndexQuery::only(json!(null))).await.unwrap_err(),
        Error::InvalidKey(_)
    ));
}

#[tokio::test]
async fn test_reserved_timestamp_index_is_queryable() {
    let store = scores().await;
    let all = store.index("byTimestamp", IndexQuery::all()).await.unwrap();
    assert_eq!(all.records(), store.values(false).await.unwrap().as_slice());
}

#[tokio::test]
async fn test_indexes_are_sorted_and_include_reserved() {
    let store = open(StoreOptions::new().index(IndexDef::new("bySlug", "slug"))).await;
    assert_eq!(
        store.indexes().await.unwrap(),
        vec!["byExpiry", "bySlug", "byTimestamp"]
    );
}

// =============================================================================
// Natural order and pages
// =============================================================================

#[tokio::test]
async fn test_values_follow_write_order() {
    let store = open(StoreOptions::new()).await;
    for key in ["a", "b", "c"] {
        store.set(key, json!(key)).await.unwrap();
    }
    store.update("a", json!("a2")).await.unwrap();

    let keys = store.keys(false).await.unwrap();
    assert_eq!(keys, vec![Key::from("b"), Key::from("c"), Key::from("a")]);
    let reversed = store.keys(true).await.unwrap();
    assert_eq!(reversed, vec![Key::from("a"), Key::from("c"), Key::from("b")]);
}

#[tokio::test]
async fn test_page_through_natural_order() {
    let store = open(StoreOptions::new().page_sz(10)).await;
    for i in 0..25 {
        store.set(i, json!(i)).await.unwrap();
    }

    let p1 = store.page(1, PageOptions::default()).await.unwrap();
    let p3 = store.page(3, PageOptions::default()).await.unwrap();
    assert_eq!(p1.items.len(), 10);
    assert!(p1.has_next);
    assert_eq!(p3.items.len(), 5);
    assert!(!p3.has_next);
    assert_eq!(p1.items[0].key, Key::Int(0));

    let last_first = store
        .page(
            1,
            PageOptions {
                reverse: true,
                sz: Some(2),
                offset: 0,
            },
        )
        .await
        .unwrap();
    assert_eq!(keys_of(&last_first.items), vec![Key::Int(24), Key::Int(23)]);

    assert!(matches!(
        store.page(0, PageOptions::default()).await.unwrap_err(),
        Error::InvalidPage(0)
    ));
}

// =============================================================================
// Middleware
// =============================================================================

/// Resolves `@name` through an `alias:name` row and records the last read.
struct Alias {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl GetMiddleware for Alias {
    async fn resolve(&self, store: &Store, key: Key) -> Result<Key> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Key::Str(name) = &key else {
            return Ok(key);
        };
        let Some(alias) = name.strip_prefix('@') else {
            return Ok(key);
        };
        let target = match store.get(format!("alias:{alias}")).await? {
            Some(Value::String(target)) => Key::Str(target),
            _ => key.clone(),
        };
        store.set("lastRead", json!(alias)).await?;
        Ok(target)
    }
}

#[tokio::test]
async fn test_middleware_can_reenter_store() {
    let calls = Arc::new(AtomicUsize::new(0));
    let store = open(StoreOptions::new().get_middleware(Alias {
        calls: Arc::clone(&calls),
    }))
    .await;
    store.set("alias:me", json!("user:1")).await.unwrap();
    store.set("user:1", json!({"name": "Rick"})).await.unwrap();

    assert_eq!(store.get("@me").await.unwrap(), Some(json!({"name": "Rick"})));
    // The nested get inside the middleware bypassed it
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_entry("lastRead").await.unwrap().unwrap().value, json!("me"));

    // The guard is released afterwards
    store.get("plain").await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // has and get_entry never run the middleware
    assert!(!store.has("@me").await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Parks on `@slow` until released; resolves `@me` to `user:1`.
struct Gate {
    entered: Arc<tokio::sync::Notify>,
    release: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl GetMiddleware for Gate {
    async fn resolve(&self, _store: &Store, key: Key) -> Result<Key> {
        match &key {
            Key::Str(name) if name == "@slow" => {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(Key::from("slow-target"))
            }
            Key::Str(name) if name == "@me" => Ok(Key::from("user:1")),
            _ => Ok(key),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_get_runs_middleware_while_another_is_pending() {
    let entered = Arc::new(tokio::sync::Notify::new());
    let release = Arc::new(tokio::sync::Notify::new());
    let store = open(StoreOptions::new().get_middleware(Gate {
        entered: Arc::clone(&entered),
        release: Arc::clone(&release),
    }))
    .await;
    store.set("user:1", json!("rick")).await.unwrap();
    store.set("slow-target", json!("resolved")).await.unwrap();

    let slow = tokio::spawn({
        let store = store.clone();
        async move { store.get("@slow").await }
    });
    entered.notified().await;

    // The pending call must not switch the middleware off for other callers
    assert_eq!(store.get("@me").await.unwrap(), Some(json!("rick")));
    assert_eq!(store.clone().get("@me").await.unwrap(), Some(json!("rick")));

    release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), Some(json!("resolved")));
}

// =============================================================================
// Snapshots
// =============================================================================

#[tokio::test]
async fn test_export_import_roundtrip() {
    let source = scores().await;
    source
        .set_with_ttl("temp", json!({"points": 1}), Duration::from_secs(3600))
        .await
        .unwrap();
    let snapshot = source.export().await.unwrap();
    assert_eq!(snapshot.len(), 5);

    // Same store: replace with its own export
    assert_eq!(source.import(snapshot.clone(), false).await.unwrap(), 5);
    assert_eq!(source.export().await.unwrap(), snapshot);

    // Another store keeps timestamps and options verbatim and rebuilds indexes
    let target = open(StoreOptions::new().index(IndexDef::new("byPoints", "points"))).await;
    target.set("stale", json!({"points": 99})).await.unwrap();
    target.import(snapshot.clone(), false).await.unwrap();
    assert_eq!(target.export().await.unwrap(), snapshot);
    let above = target.index("byPoints", IndexQuery::above(17, false)).await.unwrap();
    assert_eq!(points(&above), vec![20]);
}

#[tokio::test]
async fn test_import_merge_overwrites_on_collision() {
    let source = open(StoreOptions::new()).await;
    source.set("a", json!(1)).await.unwrap();
    source.set("b", json!(2)).await.unwrap();
    let snapshot = source.export().await.unwrap();

    let target = open(StoreOptions::new()).await;
    target.set("b", json!("old")).await.unwrap();
    target.set("c", json!(3)).await.unwrap();
    target.import(snapshot, true).await.unwrap();

    assert_eq!(target.get("a").await.unwrap(), Some(json!(1)));
    assert_eq!(target.get("b").await.unwrap(), Some(json!(2)));
    assert_eq!(target.get("c").await.unwrap(), Some(json!(3)));
}

#[tokio::test]
async fn test_snapshot_files() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("scores.json");
    let source = scores().await;
    assert_eq!(source.export_to_file(&path).await.unwrap(), 4);

    let target = open(StoreOptions::new()).await;
    assert_eq!(target.import_from_file(&path, false).await.unwrap(), 4);
    assert_eq!(target.export().await.unwrap(), source.export().await.unwrap());
}

// =============================================================================
// Notification and lifecycle
// =============================================================================

#[tokio::test]
async fn test_notification_reaches_other_handles() {
    let engine = Engine::memory().unwrap();
    let a = engine.init("shared", StoreOptions::new()).await.unwrap();
    let b = engine.init("shared", StoreOptions::new()).await.unwrap();
    let mut rx = b.changes();
    assert_eq!(b.last_modified(), Timestamp::ZERO);

    a.set("k", json!(1)).await.unwrap();
    let seen = rx.recv().await.unwrap();
    assert_eq!(b.last_modified(), seen);
    assert_eq!(a.last_modified(), seen);
    assert_eq!(a.get_entry("k").await.unwrap().unwrap().timestamp, seen);
}

#[tokio::test]
async fn test_no_notification_without_change() {
    let store = open(StoreOptions::new()).await;
    assert_eq!(store.clear().await.unwrap(), 0);
    assert!(store.rm("missing").await.is_err());
    assert_eq!(store.consume("missing").await.unwrap(), None);
    store.get("missing").await.unwrap();
    assert_eq!(store.last_modified(), Timestamp::ZERO);

    store.set("k", json!(1)).await.unwrap();
    let after_set = store.last_modified();
    assert!(after_set > Timestamp::ZERO);
    assert_eq!(store.clear().await.unwrap(), 1);
    assert!(store.last_modified() > after_set);
}

#[tokio::test]
async fn test_close_rejects_operations() {
    let engine = Engine::memory().unwrap();
    let store = engine.init("c", StoreOptions::new()).await.unwrap();
    store.set("k", json!(1)).await.unwrap();
    let other = store.clone();
    let mut rx = store.changes();
    store.close();
    store.close();

    assert!(other.is_closed());
    assert!(matches!(
        other.get("k").await.unwrap_err(),
        Error::Closed(ref id) if id == "c"
    ));
    assert!(rx.recv().await.is_err());

    // Data survives a close
    let reopened = engine.init("c", StoreOptions::new()).await.unwrap();
    assert_eq!(reopened.get("k").await.unwrap(), Some(json!(1)));
}

#[tokio::test]
async fn test_delete_destroys_store() {
    let engine = Engine::memory().unwrap();
    let a = engine
        .init("gone", StoreOptions::new().index(IndexDef::new("byN", "n")))
        .await
        .unwrap();
    let b = engine.init("gone", StoreOptions::new()).await.unwrap();
    a.set("k", json!({"n": 1})).await.unwrap();

    a.delete().await.unwrap();
    assert!(a.is_closed());
    assert!(matches!(b.get("k").await.unwrap_err(), Error::Closed(_)));
    assert!(engine.describe("gone").unwrap().is_none());
    assert!(!engine.stores().unwrap().contains(&"gone".to_string()));

    let fresh = engine.init("gone", StoreOptions::new()).await.unwrap();
    assert!(!fresh.has("k").await.unwrap());
    assert_eq!(fresh.indexes().await.unwrap(), vec!["byExpiry", "byTimestamp"]);
}
