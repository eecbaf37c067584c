use thiserror::Error;

/// Validation and shard-key decoding errors exposed by `tickvault-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("label cannot be empty")]
    EmptyLabel,
    #[error("label must start with an ASCII letter: '{ch}'")]
    LabelInvalidStart { ch: char },
    #[error("label contains invalid character '{ch}' at index {index}")]
    LabelInvalidChar { ch: char, index: usize },

    #[error("malformed shard name '{name}'")]
    MalformedTableName { name: String },
    #[error("malformed range key '{key}'")]
    MalformedRangeKey { key: String },

    #[error("timestamp {seconds}s is outside the representable range")]
    TimestampOutOfRange { seconds: i64 },
    #[error("bin interval must be positive")]
    NonPositiveInterval,

    #[error("row is missing field '{field}'")]
    MissingField { field: &'static str },
    #[error("row field '{field}' has an unexpected type")]
    FieldType { field: &'static str },
}
