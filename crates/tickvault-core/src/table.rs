use std::fmt::{Display, Formatter};

use crate::{DateRange, Label, ValidationError};

const SEPARATOR: &str = "__";

/// Identity of one physical shard: a (label, date-range bin) pair.
///
/// Never persisted on its own; its existence is inferred from the backend's
/// relation list. `name()` and `from_name` form a bijection for well-formed
/// labels, which is why label machine keys are restricted to ASCII
/// alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Table {
    label: Label,
    date_range: DateRange,
}

impl Table {
    pub fn new(label: Label, date_range: DateRange) -> Self {
        Self { label, date_range }
    }

    /// Decode a relation name back into its shard identity.
    pub fn from_name(name: &str) -> Result<Self, ValidationError> {
        let (label_key, range_key) =
            name.split_once(SEPARATOR)
                .ok_or_else(|| ValidationError::MalformedTableName {
                    name: name.to_owned(),
                })?;

        Ok(Self {
            label: Label::parse(label_key)?,
            date_range: DateRange::from_key(range_key)?,
        })
    }

    /// Physical relation name: `<label key>__<start>_<finish>`.
    pub fn name(&self) -> String {
        format!(
            "{}{}{}",
            self.label.machine_key(),
            SEPARATOR,
            self.date_range.machine_key()
        )
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
