//! Fan-out read planning: one SELECT per shard, merged with UNION ALL and a
//! single global ordering by event time.

use time::OffsetDateTime;

use tickvault_core::range::epoch_seconds;
use tickvault_core::Table;

use crate::TIME_FIELD;

const TICK_FIELDS: &str = "event_at, current_value, current_volume";

pub struct QueryPlanner;

impl QueryPlanner {
    /// Build the merged fan-out query, or `None` when there is no shard to
    /// read.
    pub fn read_query(
        tables: &[Table],
        start: OffsetDateTime,
        finish: OffsetDateTime,
        limit: Option<usize>,
        ascending: bool,
    ) -> Option<String> {
        let selects = Self::select_queries(tables, start, finish);
        if selects.is_empty() {
            return None;
        }
        Some(Self::union_query(&selects, ascending, limit))
    }

    /// One SELECT per shard. A bound predicate is added only when the window
    /// edge lies inside the shard's own range; a shard wholly inside the
    /// window needs no filter at all.
    fn select_queries(
        tables: &[Table],
        start: OffsetDateTime,
        finish: OffsetDateTime,
    ) -> Vec<String> {
        tables
            .iter()
            .map(|table| {
                let mut predicates = Vec::new();

                if start >= table.date_range().start() {
                    predicates.push(format!("{TIME_FIELD} >= {}", epoch_seconds(start)));
                }
                if finish <= table.date_range().finish() {
                    predicates.push(format!("{TIME_FIELD} <= {}", epoch_seconds(finish)));
                }

                let mut select = format!("SELECT {TICK_FIELDS} FROM {}", table.name());
                if !predicates.is_empty() {
                    select.push_str(" WHERE ");
                    select.push_str(&predicates.join(" AND "));
                }
                select
            })
            .collect()
    }

    fn union_query(selects: &[String], ascending: bool, limit: Option<usize>) -> String {
        let mut merged = selects.join(" UNION ALL ");

        merged.push_str(" ORDER BY ");
        merged.push_str(TIME_FIELD);
        merged.push_str(if ascending { " ASC" } else { " DESC" });

        if let Some(limit) = limit {
            merged.push_str(&format!(" LIMIT {limit}"));
        }

        merged
    }
}
