//! Store open and version upgrade.
//!
//! Opening a store runs in one redb write transaction:
//!
//! 1. Load the schema record, or create it at the requested version.
//! 2. Create the reserved indexes and delete every expired row.
//! 3. Create every declared index that is missing, backfilling each from
//!    the remaining rows.
//! 4. If the stored version is older than the requested one, run the
//!    caller's migration callback against a [`MigrationContext`], then
//!    recreate any declared index the callback removed.
//! 5. Record the new version and commit.
//!
//! A failure at any step (including inside the callback) drops the
//! transaction, so the store is left exactly as it was.

use crate::backend::Engine;
use crate::backend::catalog::{self, CATALOG_TABLE, SchemaRecord};
use crate::backend::encoding::encode_key;
use crate::backend::table::{RowWriter, TableLayout, build_index, bytes_table, drop_index};
use crate::clock::{Clock, Stamper};
use crate::constants::RESERVED_INDEXES;
use crate::error::{Error, Result};
use crate::types::{Entry, IndexDef, Key, KeyPolicy, Timestamp};
use redb::WriteTransaction;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Migration callback run when an existing store is opened at a newer
/// version.
pub type MigrateFn = Box<dyn FnOnce(&mut MigrationContext<'_>) -> Result<()> + Send>;

/// What `init` asked for.
pub(crate) struct OpenPlan {
    pub version: i64,
    pub indexes: Vec<IndexDef>,
    pub key_policy: KeyPolicy,
    pub migrate: Option<MigrateFn>,
}

/// Outcome of opening a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Opened {
    pub version: u32,
    pub created: bool,
    /// Previous version when the open upgraded the store.
    pub upgraded_from: Option<u32>,
}

/// Upgrade-time view of a store.
///
/// Exists only while the migration callback runs. Every read and write goes
/// through the in-flight upgrade transaction and commits (or rolls back)
/// together with the version change.
pub struct MigrationContext<'a> {
    txn: &'a WriteTransaction,
    layout: &'a TableLayout,
    schema: &'a mut SchemaRecord,
    stamper: &'a Stamper,
    now: Timestamp,
    old_version: u32,
    new_version: u32,
}

impl<'a> MigrationContext<'a> {
    /// Version the store was at before this upgrade.
    pub const fn old_version(&self) -> u32 {
        self.old_version
    }

    pub const fn new_version(&self) -> u32 {
        self.new_version
    }

    /// Current index names, sorted, including reserved ones.
    pub fn index_names(&self) -> Vec<String> {
        self.schema.index_names()
    }

    /// Drops an index. Returns `false` if no such index exists.
    pub fn remove_index(&mut self, name: &str) -> Result<bool> {
        if RESERVED_INDEXES.contains(&name) {
            return Err(Error::ReservedIndexName(name.to_string()));
        }
        if !self.schema.has_index(name) {
            return Ok(false);
        }
        drop_index(self.txn, self.layout, name)?;
        self.schema.indexes.retain(|def| def.name != name);
        debug!(store = self.layout.identifier(), index = name, "Removed index");
        Ok(true)
    }

    /// Creates and backfills an index. Returns `false` if it already exists.
    pub fn create_index(&mut self, def: IndexDef) -> Result<bool> {
        validate_index(&def)?;
        if self.schema.has_index(&def.name) {
            return Ok(false);
        }
        let written = build_index(self.txn, self.layout, &def)?;
        debug!(store = self.layout.identifier(), index = %def.name, written, "Created index");
        self.schema.indexes.push(def);
        Ok(true)
    }

    fn writer(&self) -> Result<RowWriter<'a>> {
        RowWriter::open(self.txn, self.layout, self.schema)
    }

    /// Every live row, ordered by key.
    pub fn rows(&self) -> Result<Vec<(Key, Entry)>> {
        let now = self.now;
        let mut rows = self.writer()?.entries()?;
        rows.retain(|(_, entry)| entry.is_live(now));
        Ok(rows)
    }

    pub fn get(&self, key: &Key) -> Result<Option<Entry>> {
        self.writer()?.get_live(&encode_key(key), self.now)
    }

    /// Writes `value` at `key`, keeping the options of any existing row.
    pub fn put(&mut self, key: &Key, value: Value) -> Result<()> {
        let pk = encode_key(key);
        let timestamp = self.stamper.stamp(self.now);
        let mut writer = self.writer()?;
        let options = writer
            .get_live(&pk, self.now)?
            .map(|entry| entry.options)
            .unwrap_or_default();
        writer.put(
            &pk,
            &Entry {
                value,
                options,
                timestamp,
            },
        )?;
        Ok(())
    }

    /// Deletes the row at `key`. Returns whether a row was removed.
    pub fn delete(&mut self, key: &Key) -> Result<bool> {
        Ok(self.writer()?.remove(&encode_key(key))?.is_some())
    }

    /// Rewrites every live row's value with `f`, returning the row count.
    ///
    /// Rows keep their timestamps, so natural order is unchanged.
    pub fn update_values<F>(&mut self, mut f: F) -> Result<usize>
    where
        F: FnMut(&Key, Value) -> Result<Value>,
    {
        let rows = self.rows()?;
        let count = rows.len();
        let mut writer = self.writer()?;
        for (key, entry) in rows {
            let value = f(&key, entry.value)?;
            writer.put(
                &encode_key(&key),
                &Entry {
                    value,
                    options: entry.options,
                    timestamp: entry.timestamp,
                },
            )?;
        }
        Ok(count)
    }
}

/// Validates a requested version, converting it to the stored width.
pub(crate) fn validate_version(version: i64) -> Result<u32> {
    match u32::try_from(version) {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(Error::InvalidVersion(version)),
    }
}

pub(crate) fn validate_index(def: &IndexDef) -> Result<()> {
    if def.name.trim().is_empty() {
        return Err(Error::InvalidIndex("index name cannot be empty".into()));
    }
    if RESERVED_INDEXES.contains(&def.name.as_str()) {
        return Err(Error::ReservedIndexName(def.name.clone()));
    }
    Ok(())
}

fn validate_indexes(indexes: &[IndexDef]) -> Result<()> {
    let mut seen = HashSet::new();
    for def in indexes {
        validate_index(def)?;
        if !seen.insert(def.name.as_str()) {
            return Err(Error::InvalidIndex(format!(
                "index '{}' declared twice",
                def.name
            )));
        }
    }
    Ok(())
}

/// Opens `identifier`, creating or upgrading it as needed.
pub(crate) fn open(
    engine: &Engine,
    identifier: &str,
    plan: OpenPlan,
    clock: &dyn Clock,
) -> Result<Opened> {
    let requested = validate_version(plan.version)?;
    validate_indexes(&plan.indexes)?;

    let layout = TableLayout::new(identifier);
    let txn = engine.database().begin_write()?;
    let existing = {
        let catalog = txn.open_table(CATALOG_TABLE)?;
        catalog::load(&catalog, identifier)?
    };

    let (mut schema, created) = match existing {
        Some(record) => {
            if record.version > requested {
                return Err(Error::VersionConflict {
                    stored: record.version,
                    requested,
                });
            }
            if record.key_policy != plan.key_policy {
                warn!(
                    store = identifier,
                    stored = ?record.key_policy,
                    requested = ?plan.key_policy,
                    "Key policy differs from the stored one, keeping stored policy"
                );
            }
            (record, false)
        },
        None => (SchemaRecord::new(requested, plan.key_policy), true),
    };
    let old_version = schema.version;

    {
        let _rows = txn.open_table(bytes_table(&layout.rows_name()))?;
    }

    let reserved = [IndexDef::by_expiry(), IndexDef::by_timestamp()];
    ensure_indexes(&txn, &layout, &mut schema, reserved)?;

    // Expired rows must not reach unique checks or the callback
    let now = clock.now();
    let swept = RowWriter::open(&txn, &layout, &schema)?.sweep(now)?;
    if swept > 0 {
        debug!(store = identifier, removed = swept, "Swept expired rows before open");
    }

    ensure_indexes(&txn, &layout, &mut schema, plan.indexes.iter().cloned())?;

    let upgraded = !created && old_version < requested;
    if upgraded {
        info!(
            store = identifier,
            from = old_version,
            to = requested,
            "Upgrading store"
        );
        if let Some(migrate) = plan.migrate {
            let mut ctx = MigrationContext {
                txn: &txn,
                layout: &layout,
                schema: &mut schema,
                stamper: engine.stamper(),
                now,
                old_version,
                new_version: requested,
            };
            migrate(&mut ctx)?;
        }
        // The callback may have dropped a declared index to redefine it
        ensure_indexes(&txn, &layout, &mut schema, plan.indexes)?;
    }

    schema.version = requested;
    catalog::save(&txn, identifier, &schema)?;
    txn.commit()?;

    debug!(store = identifier, version = requested, created, "Opened store");
    Ok(Opened {
        version: requested,
        created,
        upgraded_from: upgraded.then_some(old_version),
    })
}

/// Creates and backfills each index in `defs` the schema does not have yet.
fn ensure_indexes(
    txn: &WriteTransaction,
    layout: &TableLayout,
    schema: &mut SchemaRecord,
    defs: impl IntoIterator<Item = IndexDef>,
) -> Result<()> {
    for def in defs {
        if schema.has_index(&def.name) {
            continue;
        }
        let written = build_index(txn, layout, &def)?;
        debug!(store = layout.identifier(), index = %def.name, written, "Created index");
        schema.indexes.push(def);
    }
    Ok(())
}

impl Default for OpenPlan {
    fn default() -> Self {
        Self {
            version: crate::constants::DEFAULT_VERSION,
            indexes: Vec::new(),
            key_policy: KeyPolicy::Explicit,
            migrate: None,
        }
    }
}
