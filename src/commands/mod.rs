pub(crate) mod snapshot;
pub(crate) mod store;

use anyhow::{Context as _, Result};
use keyshelf::config::SchemaConfig;
use keyshelf::{Engine, KeyPolicy, Store, StoreOptions};
use std::path::Path;
use tracing::warn;

/// Database and schema shared by every command.
pub(crate) struct Context {
    engine: Engine,
    schema: Option<SchemaConfig>,
}

impl Context {
    pub(crate) fn open(db: Option<&Path>, schema: Option<&Path>) -> Result<Self> {
        let engine = match db {
            Some(path) => Engine::open(path)
                .with_context(|| format!("Failed to open database {}", path.display()))?,
            None => Engine::open_default().context("Failed to open default database")?,
        };

        let schema = match schema {
            Some(path) => {
                let config = SchemaConfig::load_from(path)?;
                let result = config.validate()?;
                for warning in &result.warnings {
                    warn!("{warning}");
                }
                Some(config)
            },
            None => None,
        };

        Ok(Self { engine, schema })
    }

    pub(crate) const fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Opens `name` with the schema file's definition, or at its stored
    /// version when the schema does not mention it.
    ///
    /// Fails if the store does not exist and `create` is false.
    pub(crate) async fn store(&self, name: &str, create: bool) -> Result<Store> {
        let declared = self.schema.as_ref().and_then(|schema| schema.store(name));
        let options = match declared {
            Some(config) => config.to_options()?,
            None => match self.engine.describe(name)? {
                Some(info) => {
                    let options = StoreOptions::new().version(i64::from(info.version));
                    match info.key_policy {
                        KeyPolicy::Explicit => options,
                        KeyPolicy::AutoIncrement => options.autoincrement(true),
                        KeyPolicy::KeyPath(path) => options.keypath(path),
                    }
                },
                None if create => StoreOptions::new(),
                None => anyhow::bail!(
                    "No such store '{name}' in {}. Run 'keyshelf stores' to list stores.",
                    self.engine.location()
                ),
            },
        };

        self.engine
            .init(name, options)
            .await
            .with_context(|| format!("Failed to open store '{name}'"))
    }
}
