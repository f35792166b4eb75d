//! Blocking store operations.
//!
//! These run on the tokio blocking pool via [`Store::run`](super::Store).

use super::query::{IndexQuery, IndexResult, PageRequest};
use super::snapshot::Snapshot;
use super::sweep::Mutation;
use super::{StoreInner, Update};
use crate::backend::catalog::{self, CATALOG_TABLE, SchemaRecord};
use crate::backend::encoding::encode_key;
use crate::backend::table::{IndexRange, ScanWindow, drop_store};
use crate::constants::BY_TIMESTAMP;
use crate::error::{Error, Result};
use crate::types::{Entry, EntryOptions, Key, KeyPolicy, Page, Record};
use crate::value::{lookup, merge};
use serde_json::Value;
use tracing::info;

/// Picks the key of a new row according to the store's key policy.
fn resolve_key(schema: &mut SchemaRecord, key: Option<Key>, value: &Value) -> Result<Key> {
    match (&schema.key_policy, key) {
        (KeyPolicy::Explicit, Some(key)) => Ok(key),
        (KeyPolicy::Explicit, None) => Err(Error::MissingKey),
        (KeyPolicy::AutoIncrement, Some(key)) => {
            if let Key::Int(i) = key
                && i >= schema.next_key
            {
                schema.next_key = i.saturating_add(1);
            }
            Ok(key)
        },
        (KeyPolicy::AutoIncrement, None) => {
            let key = schema.next_key;
            schema.next_key = key.saturating_add(1);
            Ok(Key::Int(key))
        },
        (KeyPolicy::KeyPath(path), Some(_)) => Err(Error::InvalidKey(format!(
            "keys are derived from '{path}' and cannot be given explicitly"
        ))),
        (KeyPolicy::KeyPath(path), None) => lookup(value, path)
            .and_then(Key::from_json)
            .ok_or_else(|| Error::InvalidKey(format!("no string or integer key at '{path}'"))),
    }
}

impl StoreInner {
    pub(super) fn get_entry(&self, key: &Key) -> Result<Option<Entry>> {
        let (reader, now) = self.read()?;
        Ok(reader.get(&encode_key(key))?.filter(|entry| entry.is_live(now)))
    }

    pub(super) fn has(&self, key: &Key) -> Result<bool> {
        Ok(self.get_entry(key)?.is_some())
    }

    pub(super) fn set(
        &self,
        value: Value,
        key: Option<Key>,
        options: EntryOptions,
        once: bool,
    ) -> Result<Key> {
        self.write(|m| {
            let key = resolve_key(m.schema, key, &value)?;
            let pk = encode_key(&key);
            if once && m.writer.get_live(&pk, m.now)?.is_some() {
                return Err(Error::PreexistingKey { key });
            }
            let entry = Entry {
                value,
                options,
                timestamp: m.stamp(),
            };
            m.writer.put(&pk, &entry)?;
            m.mark_changed();
            Ok(key)
        })
    }

    pub(super) fn update(&self, key: Key, update: Update) -> Result<Value> {
        self.write(|m| {
            let pk = encode_key(&key);
            let Some(current) = m.writer.get_live(&pk, m.now)? else {
                return Err(Error::NoSuchEntry { key });
            };
            let patch = match update {
                Update::Patch(patch) => patch,
                Update::With(f) => f(&current)?,
            };
            let value = match patch.value {
                Some(change) => merge(current.value, change),
                None => current.value,
            };
            let options = match patch.options {
                Some(change) => current.options.merged(change),
                None => current.options,
            };
            let entry = Entry {
                value,
                options,
                timestamp: m.stamp(),
            };
            m.writer.put(&pk, &entry)?;
            m.mark_changed();
            Ok(entry.value)
        })
    }

    pub(super) fn rm(&self, key: Key) -> Result<()> {
        self.write(|m| {
            let pk = encode_key(&key);
            if m.writer.get_live(&pk, m.now)?.is_none() {
                return Err(Error::NoSuchEntry { key });
            }
            m.writer.remove(&pk)?;
            m.stamp();
            m.mark_changed();
            Ok(())
        })
    }

    pub(super) fn consume(&self, key: &Key) -> Result<Option<Value>> {
        self.write(|m| {
            let pk = encode_key(key);
            let Some(entry) = m.writer.get_live(&pk, m.now)? else {
                return Ok(None);
            };
            match &self.consume_default {
                Some(default) => {
                    let reset = Entry {
                        value: default.clone(),
                        options: entry.options,
                        timestamp: m.stamp(),
                    };
                    m.writer.put(&pk, &reset)?;
                },
                None => {
                    m.writer.remove(&pk)?;
                    m.stamp();
                },
            }
            m.mark_changed();
            Ok(Some(entry.value))
        })
    }

    pub(super) fn clear(&self) -> Result<u64> {
        self.write(|m| {
            let removed = m.writer.clear()?;
            if removed > 0 {
                m.stamp();
                m.mark_changed();
            }
            Ok(removed)
        })
    }

    pub(super) fn length(&self) -> Result<u64> {
        let (reader, now) = self.read()?;
        reader.count_live(now)
    }

    pub(super) fn indexes(&self) -> Result<Vec<String>> {
        let (reader, _) = self.read()?;
        Ok(reader.schema().index_names())
    }

    pub(super) fn index(&self, name: &str, query: &IndexQuery) -> Result<IndexResult> {
        let range = match &query.mode {
            Some(mode) => mode.range()?,
            None => IndexRange::full(),
        };
        let window = query
            .page
            .map(|page| page.window(self.page_sz))
            .transpose()?;
        let (reader, now) = self.read()?;
        let out = reader.scan(name, &range, query.reverse, now, window.unwrap_or_default())?;
        Ok(match window {
            Some(_) => IndexResult::Page(Page {
                items: out.records,
                has_next: out.has_next,
            }),
            None => IndexResult::Rows(out.records),
        })
    }

    pub(super) fn page(&self, request: PageRequest, reverse: bool) -> Result<Page> {
        let window = request.window(self.page_sz)?;
        let (reader, now) = self.read()?;
        let out = reader.scan(BY_TIMESTAMP, &IndexRange::full(), reverse, now, window)?;
        Ok(Page {
            items: out.records,
            has_next: out.has_next,
        })
    }

    pub(super) fn values(&self, reverse: bool) -> Result<Vec<Record>> {
        let (reader, now) = self.read()?;
        let out = reader.scan(
            BY_TIMESTAMP,
            &IndexRange::full(),
            reverse,
            now,
            ScanWindow::default(),
        )?;
        Ok(out.records)
    }

    pub(super) fn keys(&self, reverse: bool) -> Result<Vec<Key>> {
        Ok(self
            .values(reverse)?
            .into_iter()
            .map(|record| record.key)
            .collect())
    }

    pub(super) fn export(&self) -> Result<Snapshot> {
        let (reader, now) = self.read()?;
        reader.entries(now)
    }

    pub(super) fn import(&self, snapshot: Snapshot, merge: bool) -> Result<usize> {
        self.write(|m| {
            let cleared = if merge { 0 } else { m.writer.clear()? };
            let mut written = 0;
            for (key, entry) in snapshot {
                if !entry.is_live(m.now) {
                    continue;
                }
                advance_counter(m, &key);
                m.writer.put(&encode_key(&key), &entry)?;
                written += 1;
            }
            if cleared > 0 || written > 0 {
                m.stamp();
                m.mark_changed();
            }
            Ok(written)
        })
    }

    pub(super) fn delete(&self) -> Result<()> {
        let txn = self.engine.database().begin_write()?;
        let schema = {
            let catalog = txn.open_table(CATALOG_TABLE)?;
            catalog::load(&catalog, &self.identifier)?
                .ok_or_else(|| Error::Closed(self.identifier.clone()))?
        };
        drop_store(&txn, &self.layout, &schema)?;
        catalog::remove(&txn, &self.identifier)?;
        txn.commit()?;
        info!(store = %self.identifier, "Deleted store");
        self.notify(self.engine.stamper().stamp(self.clock.now()));
        Ok(())
    }
}

/// Keeps the auto-increment counter ahead of imported integer keys.
fn advance_counter(m: &mut Mutation<'_, '_>, key: &Key) {
    if m.schema.key_policy == KeyPolicy::AutoIncrement
        && let Key::Int(i) = key
        && *i >= m.schema.next_key
    {
        m.schema.next_key = i.saturating_add(1);
    }
}
