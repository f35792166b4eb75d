//! Store schema configuration loaded from TOML.
//!
//! A schema file describes the stores of one database so that tooling (the
//! `keyshelf` CLI, or an application at startup) can open them with the
//! right version, key policy and indexes:
//!
//! ```toml
//! [[store]]
//! name = "shows"
//! version = 2
//! page_sz = 25
//!
//! [[store.index]]
//! name = "bySlug"
//! path = "slug"
//! unique = true
//!
//! [[store.index]]
//! name = "byTag"
//! path = "tags"
//! multi_entry = true
//! ```

use crate::constants::{self, RESERVED_INDEXES};
use crate::error::{Error, Result};
use crate::store::StoreOptions;
use crate::types::IndexDef;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub const fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Root of a schema file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default, rename = "store")]
    pub stores: Vec<StoreConfig>,
}

/// One `[[store]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: i64,
    #[serde(default = "default_page_sz")]
    pub page_sz: u64,
    #[serde(default)]
    pub autoincrement: bool,
    #[serde(default)]
    pub keypath: Option<String>,
    /// Written back by `consume` instead of deleting the row.
    #[serde(default)]
    pub consume_default: Option<toml::Value>,
    #[serde(default, rename = "index")]
    pub indexes: Vec<IndexConfig>,
}

/// One `[[store.index]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub multi_entry: bool,
}

const fn default_version() -> i64 {
    constants::DEFAULT_VERSION
}

const fn default_page_sz() -> u64 {
    constants::DEFAULT_PAGE_SIZE
}

impl SchemaConfig {
    /// Load a schema file from the specified path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading schema file {}", path.display()), e))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse a schema document.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|store| store.name == name)
    }

    /// Validate every store definition.
    ///
    /// Collects all errors before failing so one run reports every problem.
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.stores.is_empty() {
            warnings.push("schema declares no stores".to_string());
        }

        let mut names = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                errors.push("store name cannot be empty".to_string());
            } else if !names.insert(store.name.as_str()) {
                errors.push(format!("store '{}' is declared twice", store.name));
            }
            store.collect_errors(&mut errors, &mut warnings);
        }

        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "schema validation failed:\n  - {}",
                errors.join("\n  - ")
            )));
        }
        Ok(ValidationResult { warnings })
    }
}

impl StoreConfig {
    fn collect_errors(&self, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        let name = &self.name;
        if self.version < 1 {
            errors.push(format!(
                "store '{name}': version must be at least 1 (got {})",
                self.version
            ));
        }
        if self.page_sz == 0 {
            errors.push(format!("store '{name}': page_sz must be at least 1"));
        }
        if self.autoincrement && self.keypath.is_some() {
            errors.push(format!(
                "store '{name}': autoincrement and keypath cannot be combined"
            ));
        }
        if let Some(path) = &self.keypath
            && path.trim().is_empty()
        {
            errors.push(format!("store '{name}': keypath cannot be empty"));
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if index.name.trim().is_empty() {
                errors.push(format!("store '{name}': index name cannot be empty"));
                continue;
            }
            if RESERVED_INDEXES.contains(&index.name.as_str()) {
                errors.push(format!(
                    "store '{name}': index name '{}' is reserved",
                    index.name
                ));
            }
            if !seen.insert(index.name.as_str()) {
                errors.push(format!(
                    "store '{name}': index '{}' is declared twice",
                    index.name
                ));
            }
            if index.path.is_empty() {
                warnings.push(format!(
                    "store '{name}': index '{}' has an empty path and indexes whole values",
                    index.name
                ));
            }
        }
    }

    pub fn index_defs(&self) -> Vec<IndexDef> {
        self.indexes
            .iter()
            .map(|index| IndexDef {
                name: index.name.clone(),
                path: index.path.clone(),
                unique: index.unique,
                multi_entry: index.multi_entry,
            })
            .collect()
    }

    /// Builds open options from this definition.
    pub fn to_options(&self) -> Result<StoreOptions> {
        let mut options = StoreOptions::new()
            .version(self.version)
            .page_sz(self.page_sz)
            .autoincrement(self.autoincrement)
            .indexes(self.index_defs());
        if let Some(path) = &self.keypath {
            options = options.keypath(path.clone());
        }
        if let Some(default) = &self.consume_default {
            let value: Value = serde_json::to_value(default)?;
            options = options.consume_default(value);
        }
        Ok(options)
    }
}
