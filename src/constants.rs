//! Centralized constants for store defaults and persisted layout names.
//!
//! Everything that ends up on disk (table names, reserved index names) is
//! defined here so the layout can be audited in one place.

// =============================================================================
// Reserved Indexes
// =============================================================================

/// Index over `options.expiry`. Drives the expiry sweep.
pub const BY_EXPIRY: &str = "byExpiry";

/// Index over the entry `timestamp`. Defines natural order.
pub const BY_TIMESTAMP: &str = "byTimestamp";

/// Names callers may not use for their own indexes.
pub const RESERVED_INDEXES: [&str; 2] = [BY_EXPIRY, BY_TIMESTAMP];

// =============================================================================
// Store Defaults
// =============================================================================

/// Default schema version when none is requested.
pub const DEFAULT_VERSION: i64 = 1;

/// Default page size for `page` and paginated `index` queries.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// First key handed out under the auto-increment policy.
pub const FIRST_AUTO_KEY: i64 = 1;

// =============================================================================
// Persisted Layout
// =============================================================================

/// Catalog table: store identifier -> schema record (JSON).
pub const CATALOG_TABLE_NAME: &str = "keyshelf_catalog";

/// Prefix of the per-store rows table (`rows/<identifier>`).
pub const ROWS_TABLE_PREFIX: &str = "rows/";

/// Prefix of the per-index tables (`index/<identifier>/<index>`).
pub const INDEX_TABLE_PREFIX: &str = "index/";

/// Database file name used by `Engine::open_default`.
pub const DEFAULT_DB_FILE: &str = "keyshelf.redb";

/// Directory under the home directory used by `Engine::open_default`.
pub const DEFAULT_DATA_DIR: &str = ".keyshelf";

// =============================================================================
// Change Notification
// =============================================================================

/// Buffered notifications per identifier before slow receivers lag.
pub const CHANGE_CHANNEL_CAPACITY: usize = 64;
