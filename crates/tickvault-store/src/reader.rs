//! Public read API: resolve shards, plan the fan-out query, execute, convert.

use std::sync::Arc;

use time::OffsetDateTime;

use tickvault_core::range::{epoch_seconds, from_epoch_seconds};
use tickvault_core::{Label, Tick, BIN_WIDTH};

use crate::cache::ReadKey;
use crate::query::QueryPlanner;
use crate::{ReadCache, ShardCatalog, StorageBackend, StoreError};

pub struct Reader {
    backend: Arc<dyn StorageBackend>,
    catalog: ShardCatalog,
    cache: Option<Arc<ReadCache>>,
}

impl Reader {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            catalog: ShardCatalog::new(Arc::clone(&backend)),
            backend,
            cache: None,
        }
    }

    /// Share a bounded read cache with the writer; the writer invalidates
    /// entries per label on ingest.
    pub fn with_cache(backend: Arc<dyn StorageBackend>, cache: Arc<ReadCache>) -> Self {
        Self {
            catalog: ShardCatalog::new(Arc::clone(&backend)),
            backend,
            cache: Some(cache),
        }
    }

    /// Read ticks for a label inside a time window.
    ///
    /// Defaults: `start` one bin width back from now, `end` now. A label with
    /// no shards yields an empty result, not an error. With `ascending` the
    /// result is non-decreasing by event time, otherwise non-increasing;
    /// `limit` keeps the rows closest to the window boundary in the requested
    /// direction.
    pub fn read(
        &self,
        short_code: &str,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
        limit: Option<usize>,
        ascending: bool,
    ) -> Result<Vec<Tick>, StoreError> {
        let now = OffsetDateTime::now_utc();
        let start = start.unwrap_or(now - BIN_WIDTH);
        let end = end.unwrap_or(now);
        let label = Label::from_key(short_code);

        let key = ReadKey {
            label: label.machine_key().to_owned(),
            start: epoch_seconds(start),
            finish: epoch_seconds(end),
            limit,
            ascending,
        };
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key) {
                return Ok(hit);
            }
        }

        let tables = match self.catalog.resolve(&label, start, end) {
            Ok(tables) => tables,
            Err(StoreError::NotFound { .. }) => return Ok(Vec::new()),
            Err(error) => return Err(error),
        };

        let Some(sql) = QueryPlanner::read_query(&tables, start, end, limit, ascending) else {
            return Ok(Vec::new());
        };

        let rows = self.backend.execute(sql.as_str())?;
        let mut ticks = Vec::with_capacity(rows.len());
        for row in &rows {
            ticks.push(Tick::from_fields(label.value(), row)?);
        }

        if let Some(cache) = &self.cache {
            cache.put(key, ticks.clone());
        }
        Ok(ticks)
    }

    /// Earliest tick by event time within the window.
    pub fn read_first(
        &self,
        short_code: &str,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Result<Option<Tick>, StoreError> {
        let mut ticks = self.read(short_code, start, end, Some(1), true)?;
        Ok(if ticks.is_empty() {
            None
        } else {
            Some(ticks.remove(0))
        })
    }

    /// Latest tick by event time within the window.
    pub fn read_last(
        &self,
        short_code: &str,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
    ) -> Result<Option<Tick>, StoreError> {
        let mut ticks = self.read(short_code, start, end, Some(1), false)?;
        Ok(if ticks.is_empty() {
            None
        } else {
            Some(ticks.remove(0))
        })
    }

    /// Everything stored for a label, from the epoch origin to now.
    pub fn read_all(&self, short_code: &str) -> Result<Vec<Tick>, StoreError> {
        let origin = from_epoch_seconds(0)?;
        self.read(short_code, Some(origin), None, None, true)
    }
}
