//! `DuckDB` implementation of the storage contract, with a small connection
//! pool shared by every component holding the backend handle.

use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{Connection, ToSql};
use serde_json::{Number, Value};

use crate::backend::{escape_sql_string, render_literal, ColumnSpec, Row, StorageBackend};
use crate::{StoreConfig, StoreError};

struct PoolInner {
    db_path: PathBuf,
    max_pool_size: usize,
    idle: Mutex<Vec<Connection>>,
}

/// Hands out pooled connections; a connection returns to the pool on drop.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl DuckDbConnectionManager {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, max_pool_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path: path.into(),
                max_pool_size: max_pool_size.max(1),
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// # Panics
    /// Panics if the pool mutex is poisoned (a previous panic while holding
    /// the lock).
    pub fn acquire(&self) -> Result<PooledConnection, ::duckdb::Error> {
        let pooled = self
            .inner
            .idle
            .lock()
            .expect("duckdb connection pool mutex poisoned")
            .pop();

        let connection = match pooled {
            Some(connection) => connection,
            None => open_connection(self.inner.db_path.as_path())?,
        };

        Ok(PooledConnection {
            pool: Arc::clone(&self.inner),
            connection: Some(connection),
        })
    }

    #[must_use]
    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }
}

pub struct PooledConnection {
    pool: Arc<PoolInner>,
    connection: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.connection
            .as_ref()
            .expect("pooled connection unexpectedly missing")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
            .as_mut()
            .expect("pooled connection unexpectedly missing")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let mut idle = self
            .pool
            .idle
            .lock()
            .expect("duckdb connection pool mutex poisoned");
        if idle.len() < self.pool.max_pool_size {
            idle.push(connection);
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, ::duckdb::Error> {
    let connection = Connection::open(path)?;
    connection.execute_batch("PRAGMA disable_progress_bar;")?;
    Ok(connection)
}

/// Embedded relational backend over a single `DuckDB` database file.
#[derive(Clone)]
pub struct DuckDbBackend {
    manager: DuckDbConnectionManager,
}

impl DuckDbBackend {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        // Open eagerly so a bad path fails at construction, not first use.
        let _ = manager.acquire()?;
        Ok(Self { manager })
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }
}

impl StorageBackend for DuckDbBackend {
    fn list_relations(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let sql = format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' AND table_name LIKE '{}' ESCAPE '\\'",
            escape_sql_string(pattern)
        );

        let rows = self.execute(sql.as_str())?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get("table_name") {
                Some(Value::String(name)) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }

    fn execute(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let connection = self.manager.acquire()?;

        if !is_select_like(sql) {
            // Non-returning statement: nothing to fetch is not a failure.
            connection.execute_batch(sql)?;
            return Ok(Vec::new());
        }

        let mut statement = connection.prepare(sql)?;
        let _ = statement.query([] as [&dyn ToSql; 0])?;

        let column_count = statement.column_count();
        let mut names = Vec::with_capacity(column_count);
        for index in 0..column_count {
            names.push(statement.column_name(index)?.to_string());
        }

        let mut cursor = statement.query([] as [&dyn ToSql; 0])?;
        let mut rows = Vec::new();
        while let Some(raw) = cursor.next()? {
            let mut row = Row::with_capacity(column_count);
            for (index, name) in names.iter().enumerate() {
                let value: DuckValue = raw.get(index)?;
                row.insert(name.clone(), to_json_value(value));
            }
            rows.push(row);
        }

        Ok(rows)
    }

    fn create_relation(&self, name: &str, columns: &[ColumnSpec]) -> Result<(), StoreError> {
        let spec = columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.sql_type))
            .collect::<Vec<_>>()
            .join(", ");

        // IF NOT EXISTS absorbs the concurrent-creation race during ingest.
        let sql = format!("CREATE TABLE IF NOT EXISTS {name} ({spec})");
        self.execute(sql.as_str())?;
        Ok(())
    }

    fn bulk_insert(
        &self,
        name: &str,
        columns: &[&'static str],
        rows: &[Vec<Value>],
    ) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let tuples = rows
            .iter()
            .map(|row| {
                let rendered = row.iter().map(render_literal).collect::<Vec<_>>();
                format!("({})", rendered.join(", "))
            })
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {name} ({}) VALUES {tuples}",
            columns.join(", ")
        );
        self.execute(sql.as_str())?;
        Ok(())
    }

    fn drop_relation(&self, name: &str) -> Result<(), StoreError> {
        self.execute(format!("DROP TABLE IF EXISTS {name}").as_str())?;
        Ok(())
    }

    fn create_unique_index(&self, relation: &str, column: &str) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {relation}_{column}_idx \
             ON {relation} ({column} ASC)"
        );
        self.execute(sql.as_str())?;
        Ok(())
    }

    fn relax_durability(&self, relation: &str) -> Result<(), StoreError> {
        // DuckDB has no per-relation WAL toggle; durability is configured
        // database-wide, so the append marker is recorded but needs no DDL.
        tracing::debug!(relation, "relaxed durability requested");
        Ok(())
    }

    fn vacuum(&self) -> Result<(), StoreError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("VACUUM ANALYZE;")?;
        // Checkpointing fails while another transaction is active; that is
        // not worth surfacing from a housekeeping pass.
        let _ = connection.execute_batch("CHECKPOINT;");
        Ok(())
    }
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        other => Value::String(format!("{other:?}")),
    }
}

fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
