//! Expiry sweep and the transaction scaffolding every operation runs in.
//!
//! Reads check the expiry index in a read snapshot first and only open a
//! write transaction when something has actually expired. Mutations sweep
//! inside their own write transaction before doing their work.

use super::StoreInner;
use crate::backend::catalog::{self, CATALOG_TABLE, SchemaRecord};
use crate::backend::table::{RowReader, RowWriter};
use crate::clock::Stamper;
use crate::error::{Error, Result};
use crate::notify::ChangeRegistry;
use crate::types::Timestamp;
use tracing::debug;

/// Open write transaction of one mutating operation.
pub(super) struct Mutation<'txn, 's> {
    pub(super) writer: RowWriter<'txn>,
    pub(super) schema: &'s mut SchemaRecord,
    pub(super) now: Timestamp,
    /// Expired rows removed before the operation ran.
    pub(super) swept: usize,
    stamper: &'s Stamper,
    stamp: Option<Timestamp>,
    changed: bool,
}

impl Mutation<'_, '_> {
    /// Fresh write stamp; also used as the notification timestamp.
    pub(super) fn stamp(&mut self) -> Timestamp {
        let ts = self.stamper.stamp(self.now);
        self.stamp = Some(ts);
        ts
    }

    pub(super) const fn mark_changed(&mut self) {
        self.changed = true;
    }
}

impl StoreInner {
    /// Read snapshot taken after expired rows have been swept.
    pub(super) fn read(&self) -> Result<(RowReader, Timestamp)> {
        let db = self.engine.database();
        let now = self.clock.now();
        let reader = RowReader::open(db, &self.layout)?;
        if !reader.has_expired(now)? {
            return Ok((reader, now));
        }
        drop(reader);
        self.write(|_| Ok(()))?;
        Ok((RowReader::open(db, &self.layout)?, self.clock.now()))
    }

    /// Deletes expired rows, returning how many were removed.
    pub(super) fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let reader = RowReader::open(self.engine.database(), &self.layout)?;
        if !reader.has_expired(now)? {
            return Ok(0);
        }
        drop(reader);
        self.write(|m| Ok(m.swept))
    }

    /// Runs `op` in a write transaction after sweeping expired rows.
    ///
    /// Commits only if `op` succeeds; posts a change notification if rows
    /// were swept or `op` marked the mutation as changed.
    pub(super) fn write<T>(&self, op: impl FnOnce(&mut Mutation<'_, '_>) -> Result<T>) -> Result<T> {
        let txn = self.engine.database().begin_write()?;
        let mut schema = {
            let catalog = txn.open_table(CATALOG_TABLE)?;
            catalog::load(&catalog, &self.identifier)?
                .ok_or_else(|| Error::Closed(self.identifier.clone()))?
        };
        let next_key = schema.next_key;
        let now = self.clock.now();

        let (value, swept, notice) = {
            let writer = RowWriter::open(&txn, &self.layout, &schema)?;
            let mut m = Mutation {
                writer,
                schema: &mut schema,
                now,
                swept: 0,
                stamper: self.engine.stamper(),
                stamp: None,
                changed: false,
            };
            m.swept = m.writer.sweep(now)?;
            let value = op(&mut m)?;
            let notice = (m.changed || m.swept > 0)
                .then(|| m.stamp.unwrap_or_else(|| m.stamper.stamp(now)));
            (value, m.swept, notice)
        };

        if schema.next_key != next_key {
            catalog::save(&txn, &self.identifier, &schema)?;
        }
        txn.commit()?;

        if swept > 0 {
            debug!(store = %self.identifier, removed = swept, "Swept expired entries");
        }
        if let Some(at) = notice {
            self.notify(at);
        }
        Ok(value)
    }

    pub(super) fn notify(&self, at: Timestamp) {
        ChangeRegistry::global().post(&self.channel, at);
    }
}
