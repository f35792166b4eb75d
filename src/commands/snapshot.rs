//! Snapshot commands.
//!
//! - `keyshelf export <store> [-o FILE]` - Write a JSON snapshot
//! - `keyshelf import <store> FILE [--merge]` - Restore a JSON snapshot

use anyhow::{Context as _, Result};
use keyshelf::SnapshotFile;
use std::io::Write;
use std::path::Path;

use super::Context;

pub(crate) async fn export(ctx: &Context, name: &str, out: Option<&Path>) -> Result<()> {
    let store = ctx.store(name, false).await?;

    match out {
        Some(path) => {
            let rows = store.export_to_file(path).await?;
            eprintln!("Exported {rows} rows from '{name}' to {}", path.display());
        },
        None => {
            let snapshot = store.export().await?;
            let file = SnapshotFile::new(name, store.now(), snapshot);
            let json = serde_json::to_string_pretty(&file)?;
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write snapshot to stdout")?;
        },
    }

    store.close();
    Ok(())
}

pub(crate) async fn import(ctx: &Context, name: &str, file: &Path, merge: bool) -> Result<()> {
    let store = ctx.store(name, true).await?;
    let written = store
        .import_from_file(file, merge)
        .await
        .with_context(|| format!("Failed to import {}", file.display()))?;

    let mode = if merge { "merged into" } else { "imported into" };
    println!("{written} rows {mode} '{name}'.");
    store.close();
    Ok(())
}
