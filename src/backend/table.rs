//! Row and index tables of one store.
//!
//! Each store owns a rows table (`rows/<id>`: encoded key -> entry JSON) and
//! one ordered table per index (`index/<id>/<name>`: value | timestamp | key
//! -> encoded key). Index rows are never written directly by callers; they
//! are recomputed from the entry on every put and remove.

use super::catalog::{self, CATALOG_TABLE, SchemaRecord};
use super::encoding::{
    decode_key, encode_index_value, encode_timestamp, index_entry_key, prefix_successor,
};
use crate::constants::{BY_EXPIRY, BY_TIMESTAMP, INDEX_TABLE_PREFIX, ROWS_TABLE_PREFIX};
use crate::error::{Error, Result};
use crate::types::{Entry, IndexDef, Key, Record, Timestamp};
use crate::value::lookup;
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, StorageError, Table, TableDefinition, WriteTransaction,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

/// Untyped byte table definition for a runtime table name.
pub(crate) fn bytes_table(name: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(name)
}

/// Physical table names of one store.
#[derive(Debug, Clone)]
pub(crate) struct TableLayout {
    identifier: String,
}

impl TableLayout {
    pub(crate) fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    pub(crate) fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn rows_name(&self) -> String {
        format!("{ROWS_TABLE_PREFIX}{}", self.identifier)
    }

    pub(crate) fn index_name(&self, index: &str) -> String {
        format!("{INDEX_TABLE_PREFIX}{}/{index}", self.identifier)
    }
}

/// Encoded index keys of `entry` under `def`.
///
/// Rows whose path does not resolve to an indexable value yield nothing.
/// Multi-entry indexes yield one key per distinct indexable element.
pub(crate) fn index_values(def: &IndexDef, entry: &Entry) -> Vec<Vec<u8>> {
    match def.name.as_str() {
        BY_EXPIRY => entry.options.expiry.map(encode_timestamp).into_iter().collect(),
        BY_TIMESTAMP => vec![encode_timestamp(entry.timestamp)],
        _ => match lookup(&entry.value, &def.path) {
            Some(Value::Array(items)) if def.multi_entry => {
                let mut keys: Vec<Vec<u8>> = items.iter().filter_map(encode_index_value).collect();
                keys.sort();
                keys.dedup();
                keys
            },
            Some(value) => encode_index_value(value).into_iter().collect(),
            None => Vec::new(),
        },
    }
}

// =============================================================================
// Ranges and scan windows
// =============================================================================

/// Bounds over composite index keys, built from encoded index values.
#[derive(Debug, Clone)]
pub(crate) struct IndexRange {
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    empty: bool,
}

impl IndexRange {
    pub(crate) const fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
            empty: false,
        }
    }

    /// Range over index values between `lower` and `upper`.
    ///
    /// Every composite key starting with an encoded value `v` sorts at or
    /// after `v` and before `prefix_successor(v)`, so value bounds map onto
    /// plain byte bounds.
    pub(crate) fn between(lower: Bound<Vec<u8>>, upper: Bound<Vec<u8>>) -> Self {
        let mut empty = false;
        let lower = match lower {
            Bound::Included(v) => Bound::Included(v),
            Bound::Excluded(v) => match prefix_successor(&v) {
                Some(next) => Bound::Included(next),
                None => {
                    empty = true;
                    Bound::Unbounded
                },
            },
            Bound::Unbounded => Bound::Unbounded,
        };
        let upper = match upper {
            Bound::Included(v) => prefix_successor(&v).map_or(Bound::Unbounded, Bound::Excluded),
            Bound::Excluded(v) => Bound::Excluded(v),
            Bound::Unbounded => Bound::Unbounded,
        };
        if let (Bound::Included(lo), Bound::Excluded(hi)) = (&lower, &upper)
            && lo >= hi
        {
            empty = true;
        }
        Self {
            lower,
            upper,
            empty,
        }
    }

    /// Range over the rows whose index value equals `value`.
    pub(crate) fn only(value: Vec<u8>) -> Self {
        Self::between(Bound::Included(value.clone()), Bound::Included(value))
    }

    fn bounds(&self) -> (Bound<&[u8]>, Bound<&[u8]>) {
        (
            self.lower.as_ref().map(Vec::as_slice),
            self.upper.as_ref().map(Vec::as_slice),
        )
    }
}

/// Which slice of an ordered scan to return.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScanWindow {
    pub(crate) skip: usize,
    pub(crate) take: Option<usize>,
}

/// Rows returned by a scan plus whether more live rows follow the window.
#[derive(Debug, Default)]
pub(crate) struct ScanOutput {
    pub(crate) records: Vec<Record>,
    pub(crate) has_next: bool,
}

pub(crate) fn read_entry<T>(rows: &T, pk: &[u8]) -> Result<Option<Entry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    match rows.get(pk)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

/// Walks `index` in order, resolving each index row to its live entry.
pub(crate) fn scan_index<I, R>(
    index: &I,
    rows: &R,
    range: &IndexRange,
    reverse: bool,
    now: Timestamp,
    window: ScanWindow,
) -> Result<ScanOutput>
where
    I: ReadableTable<&'static [u8], &'static [u8]>,
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    if range.empty {
        return Ok(ScanOutput::default());
    }
    let iter = index
        .range::<&[u8]>(range.bounds())?
        .map(|item| item.map(|(_, pk)| pk.value().to_vec()));
    if reverse {
        collect_window(iter.rev(), rows, now, window)
    } else {
        collect_window(iter, rows, now, window)
    }
}

fn collect_window<It, R>(
    pks: It,
    rows: &R,
    now: Timestamp,
    window: ScanWindow,
) -> Result<ScanOutput>
where
    It: Iterator<Item = std::result::Result<Vec<u8>, StorageError>>,
    R: ReadableTable<&'static [u8], &'static [u8]>,
{
    let mut out = ScanOutput::default();
    let mut skipped = 0;
    for pk in pks {
        let pk = pk?;
        let Some(entry) = read_entry(rows, &pk)? else {
            continue;
        };
        if !entry.is_live(now) {
            continue;
        }
        if skipped < window.skip {
            skipped += 1;
            continue;
        }
        if window.take.is_some_and(|take| out.records.len() >= take) {
            out.has_next = true;
            break;
        }
        out.records.push(Record {
            key: decode_key(&pk)?,
            value: entry.value,
        });
    }
    Ok(out)
}

/// Range of the expiry index holding rows expired at `now`.
fn expired_range(now: Timestamp) -> IndexRange {
    IndexRange::between(Bound::Unbounded, Bound::Included(encode_timestamp(now)))
}

/// Counts index rows in `range` (no liveness check).
fn count_range<I>(index: &I, range: &IndexRange) -> Result<u64>
where
    I: ReadableTable<&'static [u8], &'static [u8]>,
{
    if range.empty {
        return Ok(0);
    }
    let mut count = 0;
    for item in index.range::<&[u8]>(range.bounds())? {
        item?;
        count += 1;
    }
    Ok(count)
}

// =============================================================================
// Read side
// =============================================================================

/// Snapshot view of one store inside a read transaction.
pub(crate) struct RowReader {
    txn: ReadTransaction,
    rows: ReadOnlyTable<&'static [u8], &'static [u8]>,
    schema: SchemaRecord,
    layout: TableLayout,
}

impl RowReader {
    /// Opens a read snapshot; fails with [`Error::Closed`] if the store
    /// has been deleted.
    pub(crate) fn open(db: &Database, layout: &TableLayout) -> Result<Self> {
        let txn = db.begin_read()?;
        let schema = {
            let catalog = txn.open_table(CATALOG_TABLE)?;
            catalog::load(&catalog, layout.identifier())?
                .ok_or_else(|| Error::Closed(layout.identifier().to_string()))?
        };
        let rows = txn.open_table(bytes_table(&layout.rows_name()))?;
        Ok(Self {
            txn,
            rows,
            schema,
            layout: layout.clone(),
        })
    }

    pub(crate) const fn schema(&self) -> &SchemaRecord {
        &self.schema
    }

    pub(crate) fn get(&self, pk: &[u8]) -> Result<Option<Entry>> {
        read_entry(&self.rows, pk)
    }

    fn index_table(&self, name: &str) -> Result<ReadOnlyTable<&'static [u8], &'static [u8]>> {
        if !self.schema.has_index(name) {
            return Err(Error::NoSuchIndex(name.to_string()));
        }
        Ok(self.txn.open_table(bytes_table(&self.layout.index_name(name)))?)
    }

    pub(crate) fn scan(
        &self,
        index: &str,
        range: &IndexRange,
        reverse: bool,
        now: Timestamp,
        window: ScanWindow,
    ) -> Result<ScanOutput> {
        let table = self.index_table(index)?;
        scan_index(&table, &self.rows, range, reverse, now, window)
    }

    /// True if at least one row has expired at `now`.
    pub(crate) fn has_expired(&self, now: Timestamp) -> Result<bool> {
        let range = expired_range(now);
        let table = self.index_table(BY_EXPIRY)?;
        Ok(table.range::<&[u8]>(range.bounds())?.next().is_some())
    }

    /// Rows that are live at `now`.
    pub(crate) fn count_live(&self, now: Timestamp) -> Result<u64> {
        let total = self.rows.len()?;
        let expired = count_range(&self.index_table(BY_EXPIRY)?, &expired_range(now))?;
        Ok(total.saturating_sub(expired))
    }

    /// Every live row, ordered by key.
    pub(crate) fn entries(&self, now: Timestamp) -> Result<BTreeMap<Key, Entry>> {
        let mut out = BTreeMap::new();
        for item in self.rows.iter()? {
            let (pk, json) = item?;
            let entry: Entry = serde_json::from_slice(json.value())?;
            if entry.is_live(now) {
                out.insert(decode_key(pk.value())?, entry);
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Write side
// =============================================================================

/// Rows table plus every index table of one store, open for writing.
pub(crate) struct RowWriter<'txn> {
    rows: Table<'txn, &'static [u8], &'static [u8]>,
    indexes: Vec<(IndexDef, Table<'txn, &'static [u8], &'static [u8]>)>,
}

impl<'txn> RowWriter<'txn> {
    pub(crate) fn open(
        txn: &'txn WriteTransaction,
        layout: &TableLayout,
        schema: &SchemaRecord,
    ) -> Result<Self> {
        let rows = txn.open_table(bytes_table(&layout.rows_name()))?;
        let mut indexes = Vec::with_capacity(schema.indexes.len());
        for def in &schema.indexes {
            let table = txn.open_table(bytes_table(&layout.index_name(&def.name)))?;
            indexes.push((def.clone(), table));
        }
        Ok(Self { rows, indexes })
    }

    pub(crate) fn get(&self, pk: &[u8]) -> Result<Option<Entry>> {
        read_entry(&self.rows, pk)
    }

    /// Live entry at `pk`, if any.
    pub(crate) fn get_live(&self, pk: &[u8], now: Timestamp) -> Result<Option<Entry>> {
        Ok(self.get(pk)?.filter(|entry| entry.is_live(now)))
    }

    /// Inserts or overwrites the row at `pk`, keeping every index in step.
    ///
    /// Fails with [`Error::ConstraintViolation`] before touching anything if
    /// a unique index already maps one of the new values to another key.
    pub(crate) fn put(&mut self, pk: &[u8], entry: &Entry) -> Result<Option<Entry>> {
        for (def, table) in &self.indexes {
            if !def.unique {
                continue;
            }
            for value in index_values(def, entry) {
                if held_by_other(table, &value, pk)? {
                    return Err(Error::ConstraintViolation {
                        index: def.name.clone(),
                        key: decode_key(pk)?,
                    });
                }
            }
        }

        let previous = self.get(pk)?;
        if let Some(old) = &previous {
            self.unindex(pk, old)?;
        }
        let json = serde_json::to_vec(entry)?;
        self.rows.insert(pk, json.as_slice())?;
        for (def, table) in &mut self.indexes {
            for value in index_values(def, entry) {
                let composite = index_entry_key(&value, entry.timestamp, pk);
                table.insert(composite.as_slice(), pk)?;
            }
        }
        Ok(previous)
    }

    /// Removes the row at `pk` and its index rows.
    pub(crate) fn remove(&mut self, pk: &[u8]) -> Result<Option<Entry>> {
        let removed = match self.rows.remove(pk)? {
            Some(guard) => Some(serde_json::from_slice::<Entry>(guard.value())?),
            None => None,
        };
        if let Some(old) = &removed {
            self.unindex(pk, old)?;
        }
        Ok(removed)
    }

    fn unindex(&mut self, pk: &[u8], entry: &Entry) -> Result<()> {
        for (def, table) in &mut self.indexes {
            for value in index_values(def, entry) {
                let composite = index_entry_key(&value, entry.timestamp, pk);
                table.remove(composite.as_slice())?;
            }
        }
        Ok(())
    }

    /// Deletes every row whose expiry is at or before `now`.
    pub(crate) fn sweep(&mut self, now: Timestamp) -> Result<usize> {
        let range = expired_range(now);
        let mut expired = Vec::new();
        if let Some((_, table)) = self.indexes.iter().find(|(def, _)| def.name == BY_EXPIRY) {
            for item in table.range::<&[u8]>(range.bounds())? {
                let (_, pk) = item?;
                expired.push(pk.value().to_vec());
            }
        }
        for pk in &expired {
            self.remove(pk)?;
        }
        Ok(expired.len())
    }

    /// Removes every row and index row, returning the number of rows.
    pub(crate) fn clear(&mut self) -> Result<u64> {
        let count = self.rows.len()?;
        clear_table(&mut self.rows)?;
        for (_, table) in &mut self.indexes {
            clear_table(table)?;
        }
        Ok(count)
    }

    pub(crate) fn len(&self) -> Result<u64> {
        Ok(self.rows.len()?)
    }

    /// Every row, ordered by key, including expired ones.
    pub(crate) fn entries(&self) -> Result<Vec<(Key, Entry)>> {
        let mut out = Vec::new();
        for item in self.rows.iter()? {
            let (pk, json) = item?;
            out.push((decode_key(pk.value())?, serde_json::from_slice(json.value())?));
        }
        Ok(out)
    }
}

/// True if the index maps `value` to a key other than `pk`.
fn held_by_other<I>(index: &I, value: &[u8], pk: &[u8]) -> Result<bool>
where
    I: ReadableTable<&'static [u8], &'static [u8]>,
{
    let range = IndexRange::only(value.to_vec());
    for item in index.range::<&[u8]>(range.bounds())? {
        let (_, owner) = item?;
        if owner.value() != pk {
            return Ok(true);
        }
    }
    Ok(false)
}

fn clear_table(table: &mut Table<'_, &'static [u8], &'static [u8]>) -> Result<()> {
    // Collect all keys first to avoid iterator invalidation
    let keys: Vec<Vec<u8>> = table
        .iter()?
        .map(|item| item.map(|(key, _)| key.value().to_vec()))
        .collect::<std::result::Result<_, _>>()?;
    for key in keys {
        table.remove(key.as_slice())?;
    }
    Ok(())
}

// =============================================================================
// Schema changes (only inside the open/upgrade transaction)
// =============================================================================

/// Creates the index table for `def` and fills it from the existing rows.
pub(crate) fn build_index(
    txn: &WriteTransaction,
    layout: &TableLayout,
    def: &IndexDef,
) -> Result<usize> {
    let rows = txn.open_table(bytes_table(&layout.rows_name()))?;
    let mut index = txn.open_table(bytes_table(&layout.index_name(&def.name)))?;
    let mut owners: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
    let mut written = 0;
    for item in rows.iter()? {
        let (pk, json) = item?;
        let pk = pk.value();
        let entry: Entry = serde_json::from_slice(json.value())?;
        for value in index_values(def, &entry) {
            if def.unique
                && let Some(owner) = owners.insert(value.clone(), pk.to_vec())
                && owner != pk
            {
                return Err(Error::ConstraintViolation {
                    index: def.name.clone(),
                    key: decode_key(pk)?,
                });
            }
            let composite = index_entry_key(&value, entry.timestamp, pk);
            index.insert(composite.as_slice(), pk)?;
            written += 1;
        }
    }
    Ok(written)
}

/// Drops the index table of `name`.
pub(crate) fn drop_index(txn: &WriteTransaction, layout: &TableLayout, name: &str) -> Result<bool> {
    Ok(txn.delete_table(bytes_table(&layout.index_name(name)))?)
}

/// Drops the rows table and every index table of a store.
pub(crate) fn drop_store(
    txn: &WriteTransaction,
    layout: &TableLayout,
    schema: &SchemaRecord,
) -> Result<()> {
    for def in &schema.indexes {
        drop_index(txn, layout, &def.name)?;
    }
    txn.delete_table(bytes_table(&layout.rows_name()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::encoding::encode_key;
    use crate::types::{EntryOptions, KeyPolicy};
    use redb::backends::InMemoryBackend;
    use serde_json::json;

    fn memory_db() -> Database {
        Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .unwrap()
    }

    fn schema(indexes: Vec<IndexDef>) -> SchemaRecord {
        let mut record = SchemaRecord::new(1, KeyPolicy::Explicit);
        record.indexes = vec![IndexDef::by_expiry(), IndexDef::by_timestamp()];
        record.indexes.extend(indexes);
        record
    }

    fn entry(value: Value, ts: u64) -> Entry {
        Entry {
            value,
            options: EntryOptions::default(),
            timestamp: Timestamp::from_micros(ts),
        }
    }

    #[test]
    fn test_index_values_multi_entry_dedups() {
        let def = IndexDef::new("byTag", "tags").multi_entry();
        let e = entry(json!({"tags": ["a", "b", "a", {"x": 1}]}), 1);
        assert_eq!(index_values(&def, &e).len(), 2);

        let compound = IndexDef::new("byTags", "tags");
        assert_eq!(index_values(&compound, &entry(json!({"tags": ["a", "b"]}), 1)).len(), 1);
    }

    #[test]
    fn test_index_values_reserved() {
        let mut e = entry(json!("v"), 7);
        assert!(index_values(&IndexDef::by_expiry(), &e).is_empty());
        e.options.expiry = Some(Timestamp::from_micros(9));
        assert_eq!(
            index_values(&IndexDef::by_expiry(), &e),
            vec![encode_timestamp(Timestamp::from_micros(9))]
        );
        assert_eq!(
            index_values(&IndexDef::by_timestamp(), &e),
            vec![encode_timestamp(Timestamp::from_micros(7))]
        );
    }

    #[test]
    fn test_put_keeps_indexes_in_step() {
        let db = memory_db();
        let layout = TableLayout::new("t");
        let record = schema(vec![IndexDef::new("byN", "n")]);
        let pk = encode_key(&Key::from("a"));

        let txn = db.begin_write().unwrap();
        {
            let mut writer = RowWriter::open(&txn, &layout, &record).unwrap();
            writer.put(&pk, &entry(json!({"n": 1}), 1)).unwrap();
            writer.put(&pk, &entry(json!({"n": 2}), 2)).unwrap();
            let by_n = &writer.indexes[2].1;
            assert_eq!(count_range(by_n, &IndexRange::full()).unwrap(), 1);
            let only_two = IndexRange::only(encode_index_value(&json!(2)).unwrap());
            assert_eq!(count_range(by_n, &only_two).unwrap(), 1);

            writer.remove(&pk).unwrap();
            for (_, table) in &writer.indexes {
                assert_eq!(count_range(table, &IndexRange::full()).unwrap(), 0);
            }
        }
        txn.commit().unwrap();
    }

    #[test]
    fn test_unique_index_rejects_second_owner() {
        let db = memory_db();
        let layout = TableLayout::new("u");
        let record = schema(vec![IndexDef::new("bySlug", "slug").unique()]);

        let txn = db.begin_write().unwrap();
        let mut writer = RowWriter::open(&txn, &layout, &record).unwrap();
        let a = encode_key(&Key::from("a"));
        let b = encode_key(&Key::from("b"));
        writer.put(&a, &entry(json!({"slug": "x"}), 1)).unwrap();
        // Same key may rewrite its own value
        writer.put(&a, &entry(json!({"slug": "x"}), 2)).unwrap();
        let err = writer.put(&b, &entry(json!({"slug": "x"}), 3)).unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation { .. }));
    }

    #[test]
    fn test_empty_and_inverted_ranges() {
        let v = |n: i32| encode_index_value(&json!(n)).unwrap();
        assert!(IndexRange::between(Bound::Included(v(5)), Bound::Excluded(v(5))).empty);
        assert!(IndexRange::between(Bound::Included(v(9)), Bound::Included(v(1))).empty);
        assert!(!IndexRange::between(Bound::Included(v(1)), Bound::Included(v(1))).empty);
    }
}
