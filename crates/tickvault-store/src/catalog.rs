//! Derived index over the live shard set.
//!
//! The catalog owns no persisted state: every call re-lists the backend's
//! relations and parses shard names, so it always reflects backend state as
//! observed at call time. Concurrent writers may create shards between two
//! calls; that eventual-consistency window is accepted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;

use tickvault_core::range::epoch_seconds;
use tickvault_core::{DateRange, Label, Table, Tick, BIN_WIDTH};

use crate::{StorageBackend, StoreError, TIME_FIELD};

/// `LIKE` pattern selecting shard relations: any name containing `__`.
pub const SHARD_NAME_PATTERN: &str = "%\\_\\_%";

pub struct ShardCatalog {
    backend: Arc<dyn StorageBackend>,
}

impl ShardCatalog {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// The live shard set, parsed from the backend's relation names.
    /// Relations matching the pattern but failing to parse are not shards.
    pub fn shards(&self) -> Result<HashSet<Table>, StoreError> {
        let names = self.backend.list_relations(SHARD_NAME_PATTERN)?;
        Ok(names
            .iter()
            .filter_map(|name| Table::from_name(name).ok())
            .collect())
    }

    /// Distinct labels present across shards.
    pub fn labels(&self) -> Result<HashSet<Label>, StoreError> {
        Ok(self
            .shards()?
            .into_iter()
            .map(|table| table.label().clone())
            .collect())
    }

    /// Shards grouped per label machine key, keyed by their bin.
    pub fn index(&self) -> Result<HashMap<String, HashMap<DateRange, Table>>, StoreError> {
        let mut tree: HashMap<String, HashMap<DateRange, Table>> = HashMap::new();
        for table in self.shards()? {
            tree.entry(table.label().machine_key().to_owned())
                .or_default()
                .insert(table.date_range().clone(), table);
        }
        Ok(tree)
    }

    /// Shards of `label` whose bin overlaps the query window, ordered by bin
    /// start. Fails with `NotFound` when the label has no shards at all.
    pub fn resolve(
        &self,
        label: &Label,
        start: OffsetDateTime,
        finish: OffsetDateTime,
    ) -> Result<Vec<Table>, StoreError> {
        let window = DateRange::from_bounds(start, finish);
        let mut tree = self.index()?;

        let Some(range_tables) = tree.remove(label.machine_key()) else {
            return Err(StoreError::NotFound {
                label: label.machine_key().to_owned(),
                start: epoch_seconds(start),
                finish: epoch_seconds(finish),
            });
        };

        let mut matches: Vec<Table> = range_tables
            .into_iter()
            .filter(|(range, _)| window.overlaps(range))
            .map(|(_, table)| table)
            .collect();
        matches.sort_by_key(|table| table.date_range().start());
        Ok(matches)
    }

    /// Deduplicate a tick batch by value identity, sort by event time, and
    /// group each tick under its destination shard (fixed bin width).
    pub fn route(&self, ticks: &[Tick]) -> Result<HashMap<Table, Vec<Tick>>, StoreError> {
        let unique: HashSet<&Tick> = ticks.iter().collect();
        let mut ordered: Vec<&Tick> = unique.into_iter().collect();
        ordered.sort_by_key(|tick| tick.event_at);

        let mut routed: HashMap<Table, Vec<Tick>> = HashMap::new();
        for tick in ordered {
            let label = Label::from_value(&tick.short_code);
            let range = DateRange::from_timestamp(tick.event_at, BIN_WIDTH)?;
            routed
                .entry(Table::new(label, range))
                .or_default()
                .push(tick.clone());
        }
        Ok(routed)
    }

    /// Values of one column across a shard; empty when the shard is not
    /// currently listed.
    pub fn column_values(&self, shard: &Table, field: &str) -> Result<Vec<Value>, StoreError> {
        if !self.shards()?.contains(shard) {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {field} FROM {}", shard.name());
        let rows = self.backend.execute(sql.as_str())?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.remove(field))
            .collect())
    }

    /// Stored event times of a shard, as epoch seconds.
    pub fn event_times(&self, shard: &Table) -> Result<HashSet<i64>, StoreError> {
        Ok(self
            .column_values(shard, TIME_FIELD)?
            .iter()
            .filter_map(Value::as_i64)
            .collect())
    }

    /// Row count of a shard; zero when the shard is not currently listed.
    pub fn row_count(&self, shard: &Table) -> Result<i64, StoreError> {
        if !self.shards()?.contains(shard) {
            return Ok(0);
        }

        let sql = format!("SELECT COUNT(*) AS count_val FROM {}", shard.name());
        let rows = self.backend.execute(sql.as_str())?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count_val"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}
