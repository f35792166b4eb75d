//! `get` middleware hook.

use super::Store;
use crate::error::Result;
use crate::types::Key;
use async_trait::async_trait;

/// Hook run by [`Store::get`] before the row is read.
///
/// The middleware receives the store and the requested key and returns the
/// key to actually read. The `store` it is given is a view of the same
/// store whose `get` skips the middleware, so it may call back into it
/// (`get`, `set`, `update`, ...) without recursing. Other callers of `get`
/// keep going through the middleware while it runs.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use keyshelf::{GetMiddleware, Key, Result, Store};
///
/// /// Resolves `@alias` keys through a stored alias row.
/// struct Aliases;
///
/// #[async_trait]
/// impl GetMiddleware for Aliases {
///     async fn resolve(&self, store: &Store, key: Key) -> Result<Key> {
///         let Key::Str(name) = &key else { return Ok(key) };
///         let Some(alias) = name.strip_prefix('@') else { return Ok(key) };
///         Ok(match store.get(format!("alias:{alias}")).await? {
///             Some(serde_json::Value::String(target)) => Key::Str(target),
///             _ => key,
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait GetMiddleware: Send + Sync + 'static {
    async fn resolve(&self, store: &Store, key: Key) -> Result<Key>;
}
