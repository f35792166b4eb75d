//! Schema catalog: one record per store identifier.

use crate::constants::{CATALOG_TABLE_NAME, FIRST_AUTO_KEY};
use crate::error::Result;
use crate::types::{IndexDef, KeyPolicy};
use redb::{ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};

/// Catalog table: store identifier -> JSON [`SchemaRecord`].
pub(crate) const CATALOG_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new(CATALOG_TABLE_NAME);

/// Persisted schema of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SchemaRecord {
    pub(crate) version: u32,
    pub(crate) key_policy: KeyPolicy,
    /// Reserved indexes first, then caller indexes in creation order.
    pub(crate) indexes: Vec<IndexDef>,
    /// Next key handed out under [`KeyPolicy::AutoIncrement`].
    pub(crate) next_key: i64,
}

impl SchemaRecord {
    pub(crate) const fn new(version: u32, key_policy: KeyPolicy) -> Self {
        Self {
            version,
            key_policy,
            indexes: Vec::new(),
            next_key: FIRST_AUTO_KEY,
        }
    }

    pub(crate) fn index(&self, name: &str) -> Option<&IndexDef> {
        self.indexes.iter().find(|def| def.name == name)
    }

    pub(crate) fn has_index(&self, name: &str) -> bool {
        self.index(name).is_some()
    }

    /// Index names, sorted.
    pub(crate) fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.iter().map(|def| def.name.clone()).collect();
        names.sort();
        names
    }
}

/// Loads the schema record of `identifier` from any readable catalog table.
pub(crate) fn load<T>(catalog: &T, identifier: &str) -> Result<Option<SchemaRecord>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match catalog.get(identifier)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

/// Writes the schema record of `identifier` inside `txn`.
pub(crate) fn save(txn: &WriteTransaction, identifier: &str, record: &SchemaRecord) -> Result<()> {
    let mut catalog = txn.open_table(CATALOG_TABLE)?;
    let json = serde_json::to_vec(record)?;
    catalog.insert(identifier, json.as_slice())?;
    Ok(())
}

/// Removes the schema record of `identifier`, returning whether it existed.
pub(crate) fn remove(txn: &WriteTransaction, identifier: &str) -> Result<bool> {
    let mut catalog = txn.open_table(CATALOG_TABLE)?;
    Ok(catalog.remove(identifier)?.is_some())
}

/// All store identifiers in the catalog, sorted.
pub(crate) fn identifiers<T>(catalog: &T) -> Result<Vec<String>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut names = Vec::new();
    for item in catalog.iter()? {
        let (key, _) = item?;
        names.push(key.value().to_string());
    }
    Ok(names)
}
