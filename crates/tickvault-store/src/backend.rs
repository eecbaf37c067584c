//! Narrow storage contract the catalog, reader, writer, and maintenance
//! layers depend on. The backend is the single shared mutable resource; the
//! rest of the store owns no persisted structure of its own.

use std::collections::HashMap;

use serde_json::Value;
use tickvault_core::FieldKind;

use crate::StoreError;

/// One result row as a field map. Conversion to typed entities happens at the
/// reader/writer boundary, not ad hoc throughout.
pub type Row = HashMap<String, Value>;

/// Column definition for relation creation, derived from an entity field set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub sql_type: &'static str,
}

/// Map an entity's typed field set onto SQL columns.
pub fn column_specs(fields: &[(&'static str, FieldKind)]) -> Vec<ColumnSpec> {
    fields
        .iter()
        .map(|(name, kind)| ColumnSpec {
            name,
            sql_type: match kind {
                FieldKind::Integer => "BIGINT",
                FieldKind::Float => "DOUBLE",
                FieldKind::Text => "TEXT",
            },
        })
        .collect()
}

/// Minimal surface the core depends on.
///
/// Relation creation must be idempotent at the statement level (`IF NOT
/// EXISTS`): concurrent writers targeting the same new shard may both attempt
/// creation and the backend absorbs the race. Maintenance statements issued
/// through `vacuum` run in auto-commit mode, never inside a transaction.
pub trait StorageBackend: Send + Sync {
    /// Relation names in the main schema matching a `LIKE` pattern
    /// (`ESCAPE '\'`); a pattern without wildcards is an exact match.
    fn list_relations(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Run one statement. Returning statements yield field-map rows;
    /// non-returning statements yield an empty row set rather than an error.
    fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError>;

    fn create_relation(&self, name: &str, columns: &[ColumnSpec]) -> Result<(), StoreError>;

    /// Insert all rows in a single multi-row statement. `rows` values are in
    /// `columns` order.
    fn bulk_insert(
        &self,
        name: &str,
        columns: &[&'static str],
        rows: &[Vec<Value>],
    ) -> Result<(), StoreError>;

    fn drop_relation(&self, name: &str) -> Result<(), StoreError>;

    /// Idempotent unique ascending index on `column`.
    fn create_unique_index(&self, relation: &str, column: &str) -> Result<(), StoreError>;

    /// Mark a relation for high-throughput append with no write-ahead
    /// durability guarantee. The store is a derived cache of ticks, not the
    /// system of record; replay from the acquisition source is the recovery
    /// path.
    fn relax_durability(&self, relation: &str) -> Result<(), StoreError>;

    /// Reclaim space and refresh planner statistics, in auto-commit mode.
    fn vacuum(&self) -> Result<(), StoreError>;
}

pub(crate) fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a JSON value as a SQL literal for statement text.
pub(crate) fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => String::from("NULL"),
        Value::Bool(flag) => String::from(if *flag { "TRUE" } else { "FALSE" }),
        Value::Number(number) => number.to_string(),
        Value::String(text) => format!("'{}'", escape_sql_string(text)),
        other => format!("'{}'", escape_sql_string(&other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickvault_core::Tick;

    #[test]
    fn tick_fields_map_to_sql_columns() {
        let specs = column_specs(Tick::FIELDS);
        assert_eq!(specs[0].name, "event_at");
        assert_eq!(specs[0].sql_type, "BIGINT");
        assert_eq!(specs[1].sql_type, "DOUBLE");
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(render_literal(&Value::Null), "NULL");
        assert_eq!(render_literal(&Value::from(42)), "42");
        assert_eq!(render_literal(&Value::from("o'neil")), "'o''neil'");
    }
}
