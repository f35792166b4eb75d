//! Backing table handle over redb.
//!
//! [`Engine`] owns one redb [`Database`] and hands out [`Store`] handles for
//! named tables inside it. redb provides the transactional guarantees this
//! crate relies on: a single serialized writer, snapshot readers, and atomic
//! commit of everything written in one write transaction (including schema
//! changes made while upgrading a store).
//!
//! # Async Usage
//!
//! All redb operations are blocking. Store operations run them inside
//! `spawn_blocking`; the synchronous helpers here are meant for setup and
//! tooling.

pub(crate) mod catalog;
pub mod encoding;
pub(crate) mod table;

use crate::clock::Stamper;
use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_DB_FILE};
use crate::error::{Error, Result};
use crate::store::{Store, StoreOptions};
use crate::types::{IndexDef, KeyPolicy};
use catalog::CATALOG_TABLE;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableDatabase, ReadableTableMetadata};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use table::{TableLayout, bytes_table};

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to one backing database.
///
/// `Engine` is `Clone`; every clone and every store opened from it share the
/// same redb database. redb allows a database file to be opened once per
/// process, so open one engine per file and clone it.
#[derive(Clone)]
pub struct Engine {
    id: u64,
    db: Arc<Database>,
    stamper: Arc<Stamper>,
    location: Arc<str>,
}

/// Catalog summary of one store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
    pub identifier: String,
    pub version: u32,
    pub key_policy: KeyPolicy,
    pub indexes: Vec<IndexDef>,
    /// Physical rows, including expired rows not yet swept.
    pub rows: u64,
}

impl Engine {
    /// Opens the default database at `~/.keyshelf/keyshelf.redb`.
    ///
    /// Creates the directory and database if they don't exist.
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("failed to determine home directory".into()))?;
        Self::open(home.join(DEFAULT_DATA_DIR).join(DEFAULT_DB_FILE))
    }

    /// Opens or creates the database at the given path.
    ///
    /// Creates parent directories if needed and initializes the catalog
    /// table on first open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists before opening database
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("creating directory {}", parent.display()), e)
            })?;
        }

        let db = Database::create(path)?;
        tracing::debug!(path = %path.display(), "Opened keyshelf database");
        Self::from_database(db, path.display().to_string())
    }

    /// Creates a non-persistent database held in memory.
    pub fn memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::from_database(db, ":memory:".to_string())
    }

    /// Opens the database asynchronously.
    pub async fn open_async<P: AsRef<Path> + Send + 'static>(path: P) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::open(path))
            .await
            .map_err(|e| Error::Internal(format!("task join error: {e}")))?
    }

    fn from_database(db: Database, location: String) -> Result<Self> {
        // Initialize the catalog on first open to ensure it exists for reads
        let write_txn = db.begin_write()?;
        {
            let _catalog = write_txn.open_table(CATALOG_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
            db: Arc::new(db),
            stamper: Arc::new(Stamper::default()),
            location: location.into(),
        })
    }

    /// Opens (creating or upgrading as needed) the store `identifier`.
    ///
    /// See [`Store::init`].
    pub async fn init(&self, identifier: impl Into<String>, options: StoreOptions) -> Result<Store> {
        Store::init(self, identifier, options).await
    }

    /// Identifiers of every store in the database, sorted.
    pub fn stores(&self) -> Result<Vec<String>> {
        let txn = self.db.begin_read()?;
        let catalog = txn.open_table(CATALOG_TABLE)?;
        catalog::identifiers(&catalog)
    }

    /// Catalog summary of `identifier`, or `None` if no such store exists.
    pub fn describe(&self, identifier: &str) -> Result<Option<StoreInfo>> {
        let txn = self.db.begin_read()?;
        let catalog = txn.open_table(CATALOG_TABLE)?;
        let Some(record) = catalog::load(&catalog, identifier)? else {
            return Ok(None);
        };
        let layout = TableLayout::new(identifier);
        let rows = txn.open_table(bytes_table(&layout.rows_name()))?.len()?;
        Ok(Some(StoreInfo {
            identifier: identifier.to_string(),
            version: record.version,
            key_policy: record.key_policy,
            indexes: record.indexes,
            rows,
        }))
    }

    /// Where the database lives (a path, or `:memory:`).
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Change channel name of `identifier` in this database.
    pub(crate) fn channel(&self, identifier: &str) -> String {
        format!("{}#{identifier}", self.id)
    }

    pub(crate) const fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub(crate) const fn stamper(&self) -> &Arc<Stamper> {
        &self.stamper
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
