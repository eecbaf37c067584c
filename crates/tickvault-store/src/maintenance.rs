//! Periodic housekeeping over the shard set.
//!
//! `run` is a fixed pipeline and the order is load-bearing: duplicates must
//! go before the unique index is created, and emptiness is checked after
//! dedup because a shard of pure duplicates can become empty. A failure
//! aborts the remaining steps of that invocation.

use std::sync::Arc;

use tickvault_core::Table;

use crate::{ReadCache, ShardCatalog, StorageBackend, StoreError, TIME_FIELD};

pub struct Maintenance {
    backend: Arc<dyn StorageBackend>,
    catalog: ShardCatalog,
    cache: Option<Arc<ReadCache>>,
}

impl Maintenance {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            catalog: ShardCatalog::new(Arc::clone(&backend)),
            backend,
            cache: None,
        }
    }

    /// Share the reader's cache so housekeeping that rewrites or drops shard
    /// rows invalidates stale results, just like the writer does.
    pub fn with_cache(backend: Arc<dyn StorageBackend>, cache: Arc<ReadCache>) -> Self {
        Self {
            catalog: ShardCatalog::new(Arc::clone(&backend)),
            backend,
            cache: Some(cache),
        }
    }

    /// dedup -> drop-empty -> create-indexes -> vacuum.
    pub fn run(&self) -> Result<(), StoreError> {
        self.remove_duplicates()?;
        self.drop_empty_tables()?;
        self.create_indexes()?;
        self.vacuum()
    }

    /// Keep one physical row per distinct event time in every shard, the one
    /// with the lowest physical row identity. Safe because a shard holds a
    /// single label.
    pub fn remove_duplicates(&self) -> Result<(), StoreError> {
        for table in self.sorted_shards()? {
            let name = table.name();
            let sql = format!(
                "DELETE FROM {name} WHERE rowid NOT IN \
                 (SELECT MIN(rowid) FROM {name} GROUP BY {TIME_FIELD})"
            );
            self.backend.execute(sql.as_str())?;
            self.invalidate_label(&table);
        }
        Ok(())
    }

    /// Drop shard relations with zero rows, reclaiming churn from speculative
    /// creation where every candidate tick was filtered out.
    pub fn drop_empty_tables(&self) -> Result<(), StoreError> {
        for table in self.sorted_shards()? {
            if self.catalog.row_count(&table)? == 0 {
                tracing::info!(shard = %table.name(), "dropping empty shard");
                self.backend.drop_relation(&table.name())?;
                self.invalidate_label(&table);
            }
        }
        Ok(())
    }

    /// Ensure the unique ascending event-time index exists on every shard.
    pub fn create_indexes(&self) -> Result<(), StoreError> {
        for table in self.sorted_shards()? {
            self.backend.create_unique_index(&table.name(), TIME_FIELD)?;
        }
        Ok(())
    }

    /// Reclaim space and refresh planner statistics; the backend runs this
    /// outside any transaction.
    pub fn vacuum(&self) -> Result<(), StoreError> {
        self.backend.vacuum()
    }

    /// Destructive reset: drop every shard relation. Symbol metadata stays.
    pub fn drop_all_tables(&self) -> Result<(), StoreError> {
        for table in self.sorted_shards()? {
            self.backend.drop_relation(&table.name())?;
            self.invalidate_label(&table);
        }
        Ok(())
    }

    fn invalidate_label(&self, table: &Table) {
        if let Some(cache) = &self.cache {
            cache.invalidate_label(table.label().machine_key());
        }
    }

    fn sorted_shards(&self) -> Result<Vec<Table>, StoreError> {
        let mut shards: Vec<Table> = self.catalog.shards()?.into_iter().collect();
        shards.sort_by_key(Table::name);
        Ok(shards)
    }
}
