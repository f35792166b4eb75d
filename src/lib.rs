// =============================================================================
// Lint Configuration
// =============================================================================

// Safety: no unsafe anywhere in this crate
#![deny(unsafe_code)]
// Correctness: Must handle all fallible operations
#![deny(unused_must_use)]
// Quality: Pedantic but pragmatic
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]
#![allow(missing_debug_implementations)] // Options hold trait objects without Debug

// Allowed with documented reasons
#![allow(clippy::missing_errors_doc)] // Error returns self-documenting via type
#![allow(clippy::missing_panics_doc)] // Panics documented in main entry points
#![allow(clippy::module_name_repetitions)] // e.g., store::StoreOptions is clearer
#![allow(clippy::doc_markdown)] // Too many false positives in code docs
#![allow(clippy::must_use_candidate)] // Not all returned values need annotation
#![allow(clippy::cast_possible_truncation)] // Key and index encodings reinterpret integer bits
#![allow(clippy::cast_sign_loss)] // Sign bit flips in key encoding
#![allow(clippy::cast_possible_wrap)] // Sign bit flips in key decoding
#![allow(clippy::cast_precision_loss)] // Timestamps are indexed as JSON numbers
#![allow(clippy::redundant_pub_crate)] // Explicit pub(crate) documents intent, aids refactoring

//! keyshelf - typed key-value stores over an embedded transactional database.
//!
//! A [`Store`] is a named table of JSON values inside a redb database,
//! opened through an [`Engine`]. Stores provide:
//!
//! - Expiring entries, swept lazily before every table access
//! - Secondary indexes (unique, multi-entry) with range and page queries
//! - Consume-once reads and deep-merge updates
//! - Versioned schemas with an atomic migration callback
//! - Snapshot export and import
//! - Change notification across every handle open on the same store
//!
//! # Example
//!
//! ```
//! use keyshelf::{Engine, IndexDef, IndexQuery, StoreOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> keyshelf::Result<()> {
//! let engine = Engine::memory()?;
//! let scores = engine
//!     .init("scores", StoreOptions::new().index(IndexDef::new("byPoints", "points")))
//!     .await?;
//!
//! for (name, points) in [("ann", 15), ("bob", 16), ("cy", 17), ("di", 20)] {
//!     scores.set(name, json!({"points": points})).await?;
//! }
//!
//! let top = scores.index("byPoints", IndexQuery::above(17, false)).await?;
//! assert_eq!(top.values(), vec![json!({"points": 20})]);
//! # Ok(())
//! # }
//! ```

/// Backing table handle: the redb engine, table layout and key encoding.
pub mod backend;

/// Time sources for write stamps and expiry.
pub mod clock;

/// TOML schema files describing the stores of a database.
///
/// # Example
///
/// ```
/// use keyshelf::config::SchemaConfig;
///
/// let schema = SchemaConfig::parse(r#"
/// [[store]]
/// name = "users"
/// keypath = "id"
///
/// [[store.index]]
/// name = "byEmail"
/// path = "email"
/// unique = true
/// "#).unwrap();
///
/// assert!(schema.validate().is_ok());
/// ```
pub mod config;

/// Centralized constants for defaults and persisted layout names.
pub mod constants;

pub mod error;

/// Tracing subscriber setup used by the CLI.
pub mod logging;

/// Process-wide change notification registry.
pub mod notify;

pub mod store;

mod types;
mod value;

pub use backend::{Engine, StoreInfo};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use store::{
    GetMiddleware, IndexQuery, IndexResult, MigrateFn, MigrationContext, PageOptions,
    PageRequest, Patch, QueryMode, Snapshot, SnapshotFile, SnapshotRow, Store, StoreOptions,
    Update, UpdateFn,
};
pub use types::{Entry, EntryOptions, IndexDef, Key, KeyPolicy, Page, Record, Timestamp};
pub use value::{lookup, merge};
