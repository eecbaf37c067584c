use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical identity of a traded instrument.
///
/// Holds a lowercased machine key (used inside shard names) and an uppercased
/// display value. Two labels are equal iff their machine keys match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    machine_key: String,
    value: String,
}

impl Label {
    /// Build a label from any raw code without validating it.
    pub fn from_key(raw: &str) -> Self {
        Self {
            machine_key: raw.to_ascii_lowercase(),
            value: raw.to_ascii_uppercase(),
        }
    }

    /// Build a label from a display value; same normalization as `from_key`.
    pub fn from_value(value: &str) -> Self {
        Self::from_key(value)
    }

    /// Build a label, rejecting codes that would break the shard-name
    /// encode/decode bijection.
    ///
    /// A well-formed code is non-empty ASCII alphanumeric and starts with a
    /// letter, so neither the `__` label/range separator nor the `_` range
    /// separator can occur inside a machine key.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let Some(first) = trimmed.chars().next() else {
            return Err(ValidationError::EmptyLabel);
        };
        if !first.is_ascii_alphabetic() {
            return Err(ValidationError::LabelInvalidStart { ch: first });
        }
        for (index, ch) in trimmed.chars().enumerate() {
            if !ch.is_ascii_alphanumeric() {
                return Err(ValidationError::LabelInvalidChar { ch, index });
            }
        }
        Ok(Self::from_key(trimmed))
    }

    /// Whether a raw instrument code is acceptable for ingest: alphanumeric
    /// and not beginning with a digit.
    pub fn is_valid_code(raw: &str) -> bool {
        let mut chars = raw.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {
                chars.all(|ch| ch.is_ascii_alphanumeric())
            }
            _ => false,
        }
    }

    pub fn machine_key(&self) -> &str {
        &self.machine_key
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.machine_key == other.machine_key
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.machine_key.hash(state);
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
