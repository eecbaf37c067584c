//! Catalog-and-routing layer over an embedded relational store.
//!
//! Ticks are partitioned into fixed-width date-range shards, one relation per
//! (label, bin). The catalog is a derived view over the backend's relation
//! list; reads fan out over the overlapping shards and merge centrally, and
//! the writer routes ticks to their shards, creating relations lazily.

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod duckdb;
pub mod maintenance;
pub mod query;
pub mod reader;
pub mod writer;

use std::path::PathBuf;

use thiserror::Error;
use tickvault_core::ValidationError;

pub use backend::{ColumnSpec, Row, StorageBackend};
pub use cache::ReadCache;
pub use catalog::ShardCatalog;
pub use duckdb::DuckDbBackend;
pub use maintenance::Maintenance;
pub use reader::Reader;
pub use writer::Writer;

/// Column holding the event timestamp (epoch seconds) in every shard.
pub const TIME_FIELD: &str = "event_at";

/// Dedicated, never-sharded relation holding symbol metadata.
pub const SYMBOLS_TABLE: &str = "symbols";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no shards found for label '{label}' between {start}s and {finish}s")]
    NotFound {
        label: String,
        start: i64,
        finish: i64,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Store-wide knobs, passed explicitly into each component.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub max_pool_size: usize,
    /// Concurrency degree for parallel per-shard ingest.
    pub max_workers: usize,
    /// Entry capacity of the bounded read cache.
    pub cache_capacity: usize,
}

impl StoreConfig {
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            max_pool_size: 4,
            max_workers: 8,
            cache_capacity: 256,
        }
    }
}
