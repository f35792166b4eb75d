//! Typed key-value store handle.
//!
//! A [`Store`] is one named table inside an [`Engine`]. Every operation runs
//! its blocking redb work on the tokio blocking pool and funnels through the
//! same steps: sweep expired rows, open a transaction, run the cursor or
//! range operation, then post a change notification if anything changed.
//!
//! # Example
//!
//! ```rust
//! use keyshelf::{Engine, IndexDef, IndexQuery, StoreOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> keyshelf::Result<()> {
//! let engine = Engine::memory()?;
//! let shows = engine
//!     .init("shows", StoreOptions::new().index(IndexDef::new("bySlug", "slug")))
//!     .await?;
//!
//! shows.set("rick", json!({"id": 5473, "slug": "rick-and-morty"})).await?;
//! shows.update("rick", json!({"id": 42})).await?;
//! assert_eq!(
//!     shows.get("rick").await?,
//!     Some(json!({"id": 42, "slug": "rick-and-morty"}))
//! );
//!
//! let hits = shows.index("bySlug", IndexQuery::only("rick-and-morty")).await?;
//! assert_eq!(hits.records().len(), 1);
//! # Ok(())
//! # }
//! ```

mod middleware;
mod migration;
mod ops;
mod query;
mod snapshot;
mod sweep;

#[cfg(test)]
mod tests;

pub use middleware::GetMiddleware;
pub use migration::{MigrateFn, MigrationContext};
pub use query::{IndexQuery, IndexResult, PageOptions, PageRequest, QueryMode};
pub use snapshot::{Snapshot, SnapshotFile, SnapshotRow};

use crate::backend::Engine;
use crate::backend::table::TableLayout;
use crate::clock::{Clock, SystemClock};
use crate::constants::{DEFAULT_PAGE_SIZE, DEFAULT_VERSION};
use crate::error::{Error, Result};
use crate::notify::{ChangeRegistry, Subscription};
use crate::types::{Entry, EntryOptions, IndexDef, Key, KeyPolicy, Page, Record, Timestamp};
use migration::OpenPlan;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

// =============================================================================
// Options
// =============================================================================

/// Options for opening a store.
///
/// ```rust
/// use keyshelf::{IndexDef, StoreOptions};
/// use serde_json::json;
///
/// let options = StoreOptions::new()
///     .version(2)
///     .index(IndexDef::new("byTag", "tags").multi_entry())
///     .consume_default(json!(0))
///     .page_sz(25);
/// ```
pub struct StoreOptions {
    version: i64,
    indexes: Vec<IndexDef>,
    migrate: Option<MigrateFn>,
    consume_default: Option<Value>,
    page_sz: u64,
    autoincrement: bool,
    keypath: Option<String>,
    get_middleware: Option<Arc<dyn GetMiddleware>>,
    clock: Arc<dyn Clock>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            indexes: Vec::new(),
            migrate: None,
            consume_default: None,
            page_sz: DEFAULT_PAGE_SIZE,
            autoincrement: false,
            keypath: None,
            get_middleware: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema version; must be at least 1.
    #[must_use]
    pub const fn version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Declares one secondary index.
    #[must_use]
    pub fn index(mut self, def: IndexDef) -> Self {
        self.indexes.push(def);
        self
    }

    #[must_use]
    pub fn indexes(mut self, defs: impl IntoIterator<Item = IndexDef>) -> Self {
        self.indexes.extend(defs);
        self
    }

    /// Callback run once when an existing store is opened at a newer version.
    #[must_use]
    pub fn migrate<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut MigrationContext<'_>) -> Result<()> + Send + 'static,
    {
        self.migrate = Some(Box::new(f));
        self
    }

    /// Value `consume` leaves behind instead of deleting the row.
    #[must_use]
    pub fn consume_default(mut self, value: impl Into<Value>) -> Self {
        self.consume_default = Some(value.into());
        self
    }

    /// Default page size; zero is treated as one.
    #[must_use]
    pub const fn page_sz(mut self, page_sz: u64) -> Self {
        self.page_sz = if page_sz == 0 { 1 } else { page_sz };
        self
    }

    #[must_use]
    pub const fn autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    /// Derives keys from this dot-path in each value.
    #[must_use]
    pub fn keypath(mut self, path: impl Into<String>) -> Self {
        self.keypath = Some(path.into());
        self
    }

    #[must_use]
    pub fn get_middleware(mut self, middleware: impl GetMiddleware) -> Self {
        self.get_middleware = Some(Arc::new(middleware));
        self
    }

    /// Time source for write stamps and expiry checks.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn key_policy(&self) -> Result<KeyPolicy> {
        match (self.autoincrement, &self.keypath) {
            (true, Some(_)) => Err(Error::InvalidKey(
                "autoincrement and keypath cannot be combined".into(),
            )),
            (true, None) => Ok(KeyPolicy::AutoIncrement),
            (false, Some(path)) => Ok(KeyPolicy::KeyPath(path.clone())),
            (false, None) => Ok(KeyPolicy::Explicit),
        }
    }
}

// =============================================================================
// Updates
// =============================================================================

/// Partial change applied by [`Store::update`].
///
/// Omitted fields keep their current value. Values merge recursively:
/// arrays concatenate, objects merge key by key, anything else replaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub value: Option<Value>,
    pub options: Option<EntryOptions>,
}

impl Patch {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            options: None,
        }
    }

    pub const fn options(options: EntryOptions) -> Self {
        Self {
            value: None,
            options: Some(options),
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: EntryOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Closure computing a [`Patch`] from the current entry.
pub type UpdateFn = Box<dyn FnOnce(&Entry) -> Result<Patch> + Send>;

/// How [`Store::update`] changes an entry.
pub enum Update {
    Patch(Patch),
    /// Runs inside the write transaction, so the read-modify-write is atomic.
    With(UpdateFn),
}

impl Update {
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&Entry) -> Result<Patch> + Send + 'static,
    {
        Self::With(Box::new(f))
    }
}

impl From<Patch> for Update {
    fn from(patch: Patch) -> Self {
        Self::Patch(patch)
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Self::Patch(Patch::value(value))
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Patch(patch) => f.debug_tuple("Patch").field(patch).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

// =============================================================================
// Store handle
// =============================================================================

/// Shared state behind every clone of a [`Store`].
pub(crate) struct StoreInner {
    identifier: String,
    /// Change channel shared with every handle on this store.
    channel: String,
    version: u32,
    engine: Engine,
    layout: TableLayout,
    clock: Arc<dyn Clock>,
    consume_default: Option<Value>,
    page_sz: u64,
    middleware: Option<Arc<dyn GetMiddleware>>,
    closed: AtomicBool,
    subscription: Mutex<Option<Subscription<'static>>>,
    last_modified: Arc<AtomicU64>,
}

impl StoreInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed(self.identifier.clone()));
        }
        Ok(())
    }

    fn close(&self) -> bool {
        let was_open = !self.closed.swap(true, Ordering::AcqRel);
        // Dropping the subscription unregisters this handle
        self.subscription.lock().take();
        was_open
    }
}

/// Handle to one named store.
///
/// `Store` is cheap to clone; clones share one subscription to the change
/// channel, which is released when the last clone is dropped or on
/// [`close`](Self::close).
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
    /// Set on the view handed to the `get` middleware so its own nested
    /// reads skip it.
    bypass_middleware: bool,
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Internal(format!("task join error: {e}"))
}

impl Store {
    /// Opens the store `identifier`, creating or upgrading it as needed.
    ///
    /// Fails with [`Error::InvalidVersion`] before touching the database if
    /// the version is below 1, and with [`Error::VersionConflict`] if the
    /// store is already at a newer version.
    pub async fn init(
        engine: &Engine,
        identifier: impl Into<String>,
        options: StoreOptions,
    ) -> Result<Self> {
        let identifier = identifier.into();
        let key_policy = options.key_policy()?;
        let StoreOptions {
            version,
            indexes,
            migrate,
            consume_default,
            page_sz,
            get_middleware,
            clock,
            ..
        } = options;

        let plan = OpenPlan {
            version,
            indexes,
            key_policy,
            migrate,
        };
        let opened = {
            let engine = engine.clone();
            let identifier = identifier.clone();
            let clock = Arc::clone(&clock);
            tokio::task::spawn_blocking(move || {
                migration::open(&engine, &identifier, plan, clock.as_ref())
            })
            .await
            .map_err(join_error)??
        };
        if let Some(from) = opened.upgraded_from {
            info!(store = %identifier, from, to = opened.version, "Store upgraded");
        }

        let channel = engine.channel(&identifier);
        let subscription = ChangeRegistry::global().subscribe(&channel);
        let last_modified = subscription.last_modified_cell();
        Ok(Self {
            inner: Arc::new(StoreInner {
                layout: TableLayout::new(identifier.clone()),
                identifier,
                channel,
                version: opened.version,
                engine: engine.clone(),
                clock,
                consume_default,
                page_sz,
                middleware: get_middleware,
                closed: AtomicBool::new(false),
                subscription: Mutex::new(Some(subscription)),
                last_modified,
            }),
            bypass_middleware: false,
        })
    }

    /// Runs a blocking store operation on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StoreInner) -> Result<T> + Send + 'static,
    {
        self.inner.ensure_open()?;
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(join_error)?
    }

    pub fn identifier(&self) -> &str {
        &self.inner.identifier
    }

    /// Schema version this handle was opened at.
    pub fn version(&self) -> u32 {
        self.inner.version
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Point reads
    // -------------------------------------------------------------------------

    /// Reads the value at `key`, after the `get` middleware (if any) has
    /// resolved the key.
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let mut key = key.into();
        if let Some(middleware) = &self.inner.middleware
            && !self.bypass_middleware
        {
            key = middleware.resolve(&self.middleware_view(), key).await?;
        }
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    /// Handle on the same store whose `get` skips the middleware.
    fn middleware_view(&self) -> Store {
        Store {
            inner: Arc::clone(&self.inner),
            bypass_middleware: true,
        }
    }

    /// Reads the full entry at `key`, bypassing the middleware.
    pub async fn get_entry(&self, key: impl Into<Key>) -> Result<Option<Entry>> {
        let key = key.into();
        self.run(move |inner| inner.get_entry(&key)).await
    }

    /// True if a live row exists at `key`. Bypasses the middleware.
    pub async fn has(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        self.run(move |inner| inner.has(&key)).await
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Inserts or overwrites the row at `key`.
    pub async fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Key> {
        self.put(value, Some(key.into()), EntryOptions::default())
            .await
    }

    /// Inserts a row whose key comes from the store's key policy.
    pub async fn add(&self, value: impl Into<Value>) -> Result<Key> {
        self.put(value, None, EntryOptions::default()).await
    }

    /// Inserts a row that expires `ttl` from now.
    pub async fn set_with_ttl(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        ttl: Duration,
    ) -> Result<Key> {
        let options = EntryOptions::expiring_at(self.now().saturating_add(ttl));
        self.put(value, Some(key.into()), options).await
    }

    /// Inserts or overwrites a row and returns its key.
    ///
    /// `key` may be omitted only under the auto-increment or key-path
    /// policy ([`Error::MissingKey`] otherwise), and must be omitted under
    /// the key-path policy.
    pub async fn put(
        &self,
        value: impl Into<Value>,
        key: Option<Key>,
        options: EntryOptions,
    ) -> Result<Key> {
        let value = value.into();
        self.run(move |inner| inner.set(value, key, options, false))
            .await
    }

    /// Like [`put`](Self::put), but fails with [`Error::PreexistingKey`] if
    /// a live row already exists at the key.
    pub async fn set_once(
        &self,
        value: impl Into<Value>,
        key: Option<Key>,
        options: EntryOptions,
    ) -> Result<Key> {
        let value = value.into();
        self.run(move |inner| inner.set(value, key, options, true))
            .await
    }

    /// Merges a change into the live row at `key` and returns the new value.
    ///
    /// Fails with [`Error::NoSuchEntry`] if there is no live row.
    pub async fn update(&self, key: impl Into<Key>, update: impl Into<Update>) -> Result<Value> {
        let key = key.into();
        let update = update.into();
        self.run(move |inner| inner.update(key, update)).await
    }

    /// Deletes the row at `key`; fails with [`Error::NoSuchEntry`] if there
    /// is no live row.
    pub async fn rm(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.run(move |inner| inner.rm(key)).await
    }

    /// Reads and removes the value at `key` in one transaction.
    ///
    /// With a consume default configured the row is kept and its value
    /// reset instead. Returns `None` if there was no live row.
    pub async fn consume(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        self.run(move |inner| inner.consume(&key)).await
    }

    /// Deletes every row, returning how many were removed.
    pub async fn clear(&self) -> Result<u64> {
        self.run(StoreInner::clear).await
    }

    // -------------------------------------------------------------------------
    // Ordered reads
    // -------------------------------------------------------------------------

    /// Queries a secondary index.
    pub async fn index(&self, name: impl Into<String>, query: IndexQuery) -> Result<IndexResult> {
        let name = name.into();
        self.run(move |inner| inner.index(&name, &query)).await
    }

    /// One page of rows in write order; pages start at 1.
    pub async fn page(&self, number: u64, options: PageOptions) -> Result<Page> {
        self.run(move |inner| inner.page(options.request(number), options.reverse))
            .await
    }

    /// Every live row in write order.
    pub async fn values(&self, reverse: bool) -> Result<Vec<Record>> {
        self.run(move |inner| inner.values(reverse)).await
    }

    /// Every live key in write order.
    pub async fn keys(&self, reverse: bool) -> Result<Vec<Key>> {
        self.run(move |inner| inner.keys(reverse)).await
    }

    /// Number of live rows.
    pub async fn length(&self) -> Result<u64> {
        self.run(StoreInner::length).await
    }

    /// Index names, sorted, including the reserved ones.
    pub async fn indexes(&self) -> Result<Vec<String>> {
        self.run(StoreInner::indexes).await
    }

    /// Deletes expired rows now, returning how many were removed.
    pub async fn sweep(&self) -> Result<usize> {
        self.run(StoreInner::sweep).await
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Every live row, ordered by key.
    pub async fn export(&self) -> Result<Snapshot> {
        self.run(StoreInner::export).await
    }

    /// Writes `snapshot` into the store, replacing its contents unless
    /// `merge` is set. Timestamps and options are kept verbatim.
    pub async fn import(&self, snapshot: Snapshot, merge: bool) -> Result<usize> {
        self.run(move |inner| inner.import(snapshot, merge)).await
    }

    /// Exports to a JSON snapshot file, returning the row count.
    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path: PathBuf = path.as_ref().to_path_buf();
        self.run(move |inner| {
            let snapshot = inner.export()?;
            let rows = snapshot.len();
            SnapshotFile::new(inner.identifier.clone(), inner.clock.now(), snapshot)
                .write_to(&path)?;
            Ok(rows)
        })
        .await
    }

    /// Imports a JSON snapshot file written by
    /// [`export_to_file`](Self::export_to_file).
    pub async fn import_from_file(&self, path: impl AsRef<Path>, merge: bool) -> Result<usize> {
        let path: PathBuf = path.as_ref().to_path_buf();
        self.run(move |inner| {
            let file = SnapshotFile::read_from(&path)?;
            if file.store != inner.identifier {
                debug!(store = %inner.identifier, source = %file.store, "Importing snapshot from another store");
            }
            inner.import(file.into_snapshot(), merge)
        })
        .await
    }

    // -------------------------------------------------------------------------
    // Change notification and lifecycle
    // -------------------------------------------------------------------------

    /// Latest change to this store observed by this handle.
    pub fn last_modified(&self) -> Timestamp {
        Timestamp::from_micros(self.inner.last_modified.load(Ordering::SeqCst))
    }

    /// Receiver of change timestamps; yields `Closed` once this handle is
    /// closed.
    pub fn changes(&self) -> broadcast::Receiver<Timestamp> {
        match self.inner.subscription.lock().as_ref() {
            Some(subscription) => subscription.changes(),
            None => broadcast::channel(1).1,
        }
    }

    /// Releases the handle. Later operations on it (and its clones) fail
    /// with [`Error::Closed`]. Idempotent.
    pub fn close(&self) {
        if self.inner.close() {
            debug!(store = %self.inner.identifier, "Closed store");
        }
    }

    /// Destroys the store's table, indexes and catalog record, then closes
    /// the handle.
    pub async fn delete(&self) -> Result<()> {
        self.run(StoreInner::delete).await?;
        self.inner.close();
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("identifier", &self.inner.identifier)
            .field("version", &self.inner.version)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
