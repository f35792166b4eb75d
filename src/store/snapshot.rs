//! Snapshot export and import.
//!
//! In memory a snapshot is an ordered `key -> entry` map. On disk it is a
//! JSON document holding a list of rows: JSON object keys are always
//! strings, so a map would lose the difference between `1` and `"1"`.

use crate::error::{Error, Result};
use crate::types::{Entry, Key, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Every live row of a store, ordered by key.
pub type Snapshot = BTreeMap<Key, Entry>;

/// One row in a snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub key: Key,
    #[serde(flatten)]
    pub entry: Entry,
}

/// On-disk snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Identifier of the exported store.
    pub store: String,
    pub exported_at: Timestamp,
    pub rows: Vec<SnapshotRow>,
}

impl SnapshotFile {
    pub fn new(store: impl Into<String>, exported_at: Timestamp, snapshot: Snapshot) -> Self {
        Self {
            store: store.into(),
            exported_at,
            rows: snapshot
                .into_iter()
                .map(|(key, entry)| SnapshotRow { key, entry })
                .collect(),
        }
    }

    /// Rows as a snapshot map; later duplicates of a key win.
    pub fn into_snapshot(self) -> Snapshot {
        self.rows
            .into_iter()
            .map(|row| (row.key, row.entry))
            .collect()
    }

    /// Writes the document as pretty-printed JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("creating directory {}", parent.display()), e)
            })?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| Error::io(format!("writing snapshot {}", path.display()), e))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::io(format!("reading snapshot {}", path.display()), e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
