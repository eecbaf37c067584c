//! Shard-key model for the tickvault store.
//!
//! Pure value types only: labels, fixed-width date-range bins, shard
//! identities, and the typed tick/symbol entities. Everything that touches a
//! database lives in `tickvault-store`.

mod error;
mod label;
pub mod range;
mod table;
mod tick;

pub use error::ValidationError;
pub use label::Label;
pub use range::{DateRange, BIN_WIDTH};
pub use table::Table;
pub use tick::{FieldKind, Symbol, Tick};
