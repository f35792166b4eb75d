//! Error types for keyshelf operations.
//!
//! Every failure surfaces to the awaiting caller as an [`Error`]. Failures of
//! the backing engine are carried unchanged in [`Error::Engine`]; nothing in
//! this crate retries.

use crate::types::Key;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Requested schema version is zero, negative or out of range.
    #[error("invalid version {0}: versions start at 1")]
    InvalidVersion(i64),

    /// Requested schema version is older than the stored one.
    #[error("version conflict: store is at version {stored}, requested {requested}")]
    VersionConflict { stored: u32, requested: u32 },

    /// `update` or `rm` on a key with no live row.
    #[error("no such entry for key of type {}: {key}", key.type_name())]
    NoSuchEntry { key: Key },

    /// `set_once` on a key that already has a live row.
    #[error("preexisting key of type {}: {key}", key.type_name())]
    PreexistingKey { key: Key },

    /// `set` without a key under the explicit key policy.
    #[error("missing key: the store has neither autoincrement nor a keypath")]
    MissingKey,

    /// Key could not be derived or conflicts with the key policy.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Query against an index the store does not have.
    #[error("no such index: {0}")]
    NoSuchIndex(String),

    /// Caller tried to declare or drop a reserved index.
    #[error("index name '{0}' is reserved")]
    ReservedIndexName(String),

    /// Malformed index definition (empty or duplicate name).
    #[error("invalid index definition: {0}")]
    InvalidIndex(String),

    /// A put would give two keys the same value in a unique index.
    #[error("unique index '{index}' already holds this value (key {key})")]
    ConstraintViolation { index: String, key: Key },

    /// Page numbers are 1-indexed.
    #[error("invalid page {0}: pages start at 1")]
    InvalidPage(u64),

    /// Operation on a closed or deleted store handle.
    #[error("store '{0}' is closed")]
    Closed(String),

    /// Migration callback failure.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Failure surfaced by the backing engine.
    #[error("backing engine failure: {0}")]
    Engine(#[from] redb::Error),

    /// Entry or snapshot (de)serialization failure.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error (task join failures).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a migration error from any displayable cause.
    pub fn migration(reason: impl std::fmt::Display) -> Self {
        Self::Migration(reason.to_string())
    }

    /// Returns true for failures that originate in the backing engine.
    pub const fn is_engine_failure(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

macro_rules! engine_error_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    Self::Engine(err.into())
                }
            }
        )+
    };
}

engine_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
