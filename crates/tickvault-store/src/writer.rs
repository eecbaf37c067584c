//! Public ingest API: shard-routing tick writes and symbol metadata upserts.

use std::sync::Arc;
use std::thread;

use serde_json::Value;

use tickvault_core::range::epoch_seconds;
use tickvault_core::{Label, Symbol, Table, Tick};

use crate::backend::{column_specs, escape_sql_string, render_literal};
use crate::{ReadCache, ShardCatalog, StorageBackend, StoreError, SYMBOLS_TABLE};

pub struct Writer {
    backend: Arc<dyn StorageBackend>,
    catalog: ShardCatalog,
    cache: Option<Arc<ReadCache>>,
    max_workers: usize,
}

impl Writer {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            catalog: ShardCatalog::new(Arc::clone(&backend)),
            backend,
            cache: None,
            max_workers: 8,
        }
    }

    /// Share the reader's cache so ingest invalidates stale results, and cap
    /// the parallel fan-out degree.
    pub fn with_cache(
        backend: Arc<dyn StorageBackend>,
        cache: Arc<ReadCache>,
        max_workers: usize,
    ) -> Self {
        Self {
            catalog: ShardCatalog::new(Arc::clone(&backend)),
            backend,
            cache: Some(cache),
            max_workers: max_workers.max(1),
        }
    }

    /// Upsert the symbol metadata, then ingest the tick batch.
    pub fn write(&self, symbol: &Symbol, ticks: &[Tick]) -> Result<(), StoreError> {
        self.write_symbol(symbol)?;
        self.write_ticks(ticks)
    }

    /// Insert a new symbol row or update only the fields that changed; an
    /// unchanged symbol issues no statement. The metadata relation is created
    /// on the very first symbol ever seen.
    pub fn write_symbol(&self, new: &Symbol) -> Result<(), StoreError> {
        let relation_exists = !self.backend.list_relations(SYMBOLS_TABLE)?.is_empty();
        if !relation_exists {
            self.backend
                .create_relation(SYMBOLS_TABLE, &column_specs(Symbol::FIELDS))?;
            return self.insert_symbol(new);
        }

        match self.lookup_symbol(&Label::from_value(&new.short_code))? {
            Some(old) => self.update_symbol(&old, new),
            None => self.insert_symbol(new),
        }
    }

    /// Route ticks to shards and write each shard sequentially.
    pub fn write_ticks(&self, ticks: &[Tick]) -> Result<(), StoreError> {
        let routed = self.catalog.route(ticks)?;
        let mut outcome = Ok(());
        for (table, content) in &routed {
            if let Err(error) = self.save_content(table, content) {
                outcome = Err(error);
                break;
            }
        }
        // Shards written before a failure have already landed rows, so every
        // routed label is invalidated even when the batch errors out.
        self.invalidate_labels(routed.keys());
        outcome
    }

    /// Route ticks to shards and write shards on a bounded worker pool.
    ///
    /// Shards are independent units of work; a failure in one shard's
    /// pipeline is logged and does not abort sibling writes or fail the
    /// batch. There is no cross-shard commit.
    pub fn write_ticks_parallel(&self, ticks: &[Tick]) -> Result<(), StoreError> {
        let routed = self.catalog.route(ticks)?;
        let work: Vec<(&Table, &Vec<Tick>)> = routed.iter().collect();

        for batch in work.chunks(self.max_workers) {
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(table, content)| {
                        scope.spawn(move || {
                            if let Err(error) = self.save_content(table, content) {
                                tracing::warn!(
                                    shard = %table.name(),
                                    %error,
                                    "shard ingest failed; siblings continue"
                                );
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    // Scoped threads only abort on panic, never on shard errors.
                    let _ = handle.join();
                }
            });
        }

        self.invalidate_labels(routed.keys());
        Ok(())
    }

    /// Strictly sequential per-shard pipeline: validate, maybe-create,
    /// bulk-insert.
    fn save_content(&self, table: &Table, content: &[Tick]) -> Result<(), StoreError> {
        let existing = self.catalog.event_times(table)?;

        // Relaxed-ingest policy: duplicates and malformed codes are dropped
        // silently, with no partial-failure report to the caller.
        let valid: Vec<&Tick> = content
            .iter()
            .filter(|tick| {
                !existing.contains(&epoch_seconds(tick.event_at))
                    && Label::is_valid_code(&tick.short_code)
            })
            .collect();

        if valid.is_empty() {
            return Ok(());
        }

        let name = table.name();
        if !self.catalog.shards()?.contains(table) {
            self.backend
                .create_relation(&name, &column_specs(Tick::FIELDS))?;
            self.backend.relax_durability(&name)?;
        }

        let columns: Vec<&'static str> = Tick::FIELDS.iter().map(|(name, _)| *name).collect();
        let rows: Vec<Vec<Value>> = valid.iter().map(|tick| tick.to_values()).collect();
        self.backend.bulk_insert(&name, &columns, &rows)?;

        tracing::debug!(shard = %name, rows = rows.len(), "ingested ticks");
        Ok(())
    }

    fn lookup_symbol(&self, label: &Label) -> Result<Option<Symbol>, StoreError> {
        let fields: Vec<&str> = Symbol::FIELDS.iter().map(|(name, _)| *name).collect();
        let sql = format!(
            "SELECT {} FROM {SYMBOLS_TABLE} WHERE LOWER(short_code) = '{}' LIMIT 1",
            fields.join(", "),
            escape_sql_string(label.machine_key())
        );

        let rows = self.backend.execute(sql.as_str())?;
        match rows.first() {
            Some(row) => Ok(Some(Symbol::from_fields(row)?)),
            None => Ok(None),
        }
    }

    fn insert_symbol(&self, symbol: &Symbol) -> Result<(), StoreError> {
        let columns: Vec<&'static str> = Symbol::FIELDS.iter().map(|(name, _)| *name).collect();
        self.backend
            .bulk_insert(SYMBOLS_TABLE, &columns, &[symbol.to_values()])
    }

    fn update_symbol(&self, old: &Symbol, new: &Symbol) -> Result<(), StoreError> {
        let changed = new.diff(old);
        if changed.is_empty() {
            return Ok(());
        }

        let assignments = changed
            .iter()
            .map(|(field, value)| format!("{field} = {}", render_literal(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {SYMBOLS_TABLE} SET {assignments} WHERE LOWER(short_code) = '{}'",
            escape_sql_string(Label::from_value(&new.short_code).machine_key())
        );
        self.backend.execute(sql.as_str())?;
        Ok(())
    }

    fn invalidate_labels<'a>(&self, tables: impl Iterator<Item = &'a Table>) {
        let Some(cache) = &self.cache else {
            return;
        };
        for table in tables {
            cache.invalidate_label(table.label().machine_key());
        }
    }
}
