//! Store inspection and maintenance commands.
//!
//! - `keyshelf stores` - List stores in the database
//! - `keyshelf stats <store>` - Schema and row counts
//! - `keyshelf indexes <store>` - Index names
//! - `keyshelf sweep <store>` - Delete expired entries

use anyhow::Result;
use keyshelf::KeyPolicy;

use super::Context;

/// List every store with its version and physical row count.
pub(crate) fn list(ctx: &Context) -> Result<()> {
    let names = ctx.engine().stores()?;
    if names.is_empty() {
        println!("No stores in {}", ctx.engine().location());
        return Ok(());
    }

    println!("{:<32} {:>8} {:>10}", "STORE", "VERSION", "ROWS");
    for name in names {
        if let Some(info) = ctx.engine().describe(&name)? {
            println!("{:<32} {:>8} {:>10}", info.identifier, info.version, info.rows);
        }
    }
    Ok(())
}

pub(crate) async fn stats(ctx: &Context, name: &str) -> Result<()> {
    let store = ctx.store(name, false).await?;
    let live = store.length().await?;
    let info = ctx.engine().describe(name)?;

    println!("Store:        {name}");
    println!("Database:     {}", ctx.engine().location());
    println!("Version:      {}", store.version());
    if let Some(info) = info {
        let policy = match &info.key_policy {
            KeyPolicy::Explicit => "explicit".to_string(),
            KeyPolicy::AutoIncrement => "autoincrement".to_string(),
            KeyPolicy::KeyPath(path) => format!("keypath '{path}'"),
        };
        println!("Key policy:   {policy}");
        println!("Live rows:    {live}");
        println!("Indexes:");
        for def in &info.indexes {
            let mut flags = Vec::new();
            if def.unique {
                flags.push("unique");
            }
            if def.multi_entry {
                flags.push("multi-entry");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            };
            println!("  {:<20} {}{flags}", def.name, def.path);
        }
    }
    store.close();
    Ok(())
}

pub(crate) async fn indexes(ctx: &Context, name: &str) -> Result<()> {
    let store = ctx.store(name, false).await?;
    for index in store.indexes().await? {
        println!("{index}");
    }
    store.close();
    Ok(())
}

pub(crate) async fn sweep(ctx: &Context, name: &str) -> Result<()> {
    let store = ctx.store(name, false).await?;
    let removed = store.sweep().await?;
    if removed == 0 {
        println!("No expired entries in '{name}'.");
    } else {
        println!("Removed {removed} expired entries from '{name}'.");
    }
    store.close();
    Ok(())
}
