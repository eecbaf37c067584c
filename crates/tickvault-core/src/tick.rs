use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::range::{epoch_seconds, from_epoch_seconds};
use crate::ValidationError;

/// Storage-facing type of an entity field. The backend maps these onto SQL
/// column types at a single boundary instead of guessing from sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
}

/// One immutable price/volume observation.
///
/// Within a shard a tick is unique by `event_at`; a shard holds a single
/// label, so the timestamp alone is the dedup key. Equality and hashing use
/// full value identity (float fields by bit pattern) so a batch can be
/// deduplicated in a set before routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub short_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub event_at: OffsetDateTime,
    pub current_value: f64,
    pub current_volume: f64,
}

impl Tick {
    pub const FIELDS: &'static [(&'static str, FieldKind)] = &[
        ("event_at", FieldKind::Integer),
        ("current_value", FieldKind::Float),
        ("current_volume", FieldKind::Float),
    ];

    /// Stored field values, in `FIELDS` order. Event time is persisted as
    /// epoch seconds.
    pub fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(epoch_seconds(self.event_at)),
            Value::from(self.current_value),
            Value::from(self.current_volume),
        ]
    }

    /// Rebuild a tick from a backend row; the short code comes from the
    /// resolved label, not from the shard row.
    pub fn from_fields(
        short_code: &str,
        row: &HashMap<String, Value>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            short_code: short_code.to_owned(),
            event_at: from_epoch_seconds(field_i64(row, "event_at")?)?,
            current_value: field_f64(row, "current_value")?,
            current_volume: field_f64(row, "current_volume")?,
        })
    }
}

impl PartialEq for Tick {
    fn eq(&self, other: &Self) -> bool {
        self.short_code == other.short_code
            && self.event_at == other.event_at
            && self.current_value.to_bits() == other.current_value.to_bits()
            && self.current_volume.to_bits() == other.current_volume.to_bits()
    }
}

impl Eq for Tick {}

impl Hash for Tick {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.short_code.hash(state);
        self.event_at.hash(state);
        self.current_value.to_bits().hash(state);
        self.current_volume.to_bits().hash(state);
    }
}

/// Mutable instrument metadata; one logical row per label in the dedicated
/// `symbols` relation, never sharded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub short_code: String,
    pub full_name: String,
    pub available_count: Option<f64>,
    pub category: Option<String>,
    pub icon_url: Option<String>,
    pub currency: Option<String>,
}

impl Symbol {
    pub const FIELDS: &'static [(&'static str, FieldKind)] = &[
        ("short_code", FieldKind::Text),
        ("full_name", FieldKind::Text),
        ("available_count", FieldKind::Float),
        ("category", FieldKind::Text),
        ("icon_url", FieldKind::Text),
        ("currency", FieldKind::Text),
    ];

    pub fn new(short_code: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            short_code: short_code.into(),
            full_name: full_name.into(),
            available_count: None,
            category: None,
            icon_url: None,
            currency: None,
        }
    }

    /// Field values in `FIELDS` order; absent optionals become SQL NULL.
    pub fn to_values(&self) -> Vec<Value> {
        vec![
            Value::from(self.short_code.as_str()),
            Value::from(self.full_name.as_str()),
            self.available_count.map(Value::from).unwrap_or(Value::Null),
            opt_text(self.category.as_deref()),
            opt_text(self.icon_url.as_deref()),
            opt_text(self.currency.as_deref()),
        ]
    }

    pub fn from_fields(row: &HashMap<String, Value>) -> Result<Self, ValidationError> {
        Ok(Self {
            short_code: field_text(row, "short_code")?,
            full_name: field_text(row, "full_name")?,
            available_count: field_opt_f64(row, "available_count")?,
            category: field_opt_text(row, "category")?,
            icon_url: field_opt_text(row, "icon_url")?,
            currency: field_opt_text(row, "currency")?,
        })
    }

    /// Fields of `self` that differ from `old`, paired with the new value.
    /// An empty diff means no UPDATE is needed.
    pub fn diff(&self, old: &Symbol) -> Vec<(&'static str, Value)> {
        let old_values = old.to_values();
        self.to_values()
            .into_iter()
            .zip(old_values)
            .zip(Self::FIELDS)
            .filter(|((new, old), _)| new != old)
            .map(|((new, _), (name, _))| (*name, new))
            .collect()
    }
}

fn opt_text(value: Option<&str>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn field_i64(row: &HashMap<String, Value>, field: &'static str) -> Result<i64, ValidationError> {
    row.get(field)
        .ok_or(ValidationError::MissingField { field })?
        .as_i64()
        .ok_or(ValidationError::FieldType { field })
}

fn field_f64(row: &HashMap<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    row.get(field)
        .ok_or(ValidationError::MissingField { field })?
        .as_f64()
        .ok_or(ValidationError::FieldType { field })
}

fn field_opt_f64(
    row: &HashMap<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, ValidationError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or(ValidationError::FieldType { field }),
    }
}

fn field_text(row: &HashMap<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    row.get(field)
        .ok_or(ValidationError::MissingField { field })?
        .as_str()
        .map(str::to_owned)
        .ok_or(ValidationError::FieldType { field })
}

fn field_opt_text(
    row: &HashMap<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ValidationError> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(|text| Some(text.to_owned()))
            .ok_or(ValidationError::FieldType { field }),
    }
}
