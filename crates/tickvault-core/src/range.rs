use std::fmt::{Display, Formatter};

use time::{Duration, OffsetDateTime};

use crate::ValidationError;

/// Fixed bin width used when routing ticks to shards.
pub const BIN_WIDTH: Duration = Duration::days(365);

/// Seconds since the Unix epoch.
pub fn epoch_seconds(at: OffsetDateTime) -> i64 {
    at.unix_timestamp()
}

/// Inverse of [`epoch_seconds`].
pub fn from_epoch_seconds(seconds: i64) -> Result<OffsetDateTime, ValidationError> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|_| ValidationError::TimestampOutOfRange { seconds })
}

const SEPARATOR: char = '_';

/// A half-open time interval `[start, finish)` identifying one shard bin.
///
/// Produced either by the deterministic binning function (`from_timestamp`)
/// or decoded back from a shard name (`from_key`). Query windows built with
/// `from_bounds` carry no machine key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DateRange {
    machine_key: String,
    start: OffsetDateTime,
    finish: OffsetDateTime,
}

impl DateRange {
    /// Bin a timestamp into its fixed-width interval.
    ///
    /// With `s` the epoch seconds of `event_at` and `w` the interval width,
    /// the bin index is `floor(s / w)`; the bin spans `[k*w, (k+1)*w)`.
    /// Euclidean division keeps pre-epoch timestamps in the right bin.
    pub fn from_timestamp(
        event_at: OffsetDateTime,
        interval: Duration,
    ) -> Result<Self, ValidationError> {
        let width = interval.whole_seconds();
        if width <= 0 {
            return Err(ValidationError::NonPositiveInterval);
        }

        let bin = epoch_seconds(event_at).div_euclid(width);
        let start_seconds = bin * width;
        let finish_seconds = (bin + 1) * width;

        Ok(Self {
            machine_key: format!("{start_seconds}{SEPARATOR}{finish_seconds}"),
            start: from_epoch_seconds(start_seconds)?,
            finish: from_epoch_seconds(finish_seconds)?,
        })
    }

    /// Decode a range machine key of the form `<start>_<finish>`.
    pub fn from_key(key: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedRangeKey {
            key: key.to_owned(),
        };

        let (raw_start, raw_finish) = key.split_once(SEPARATOR).ok_or_else(malformed)?;
        let start_seconds: i64 = raw_start.parse().map_err(|_| malformed())?;
        let finish_seconds: i64 = raw_finish.parse().map_err(|_| malformed())?;

        Ok(Self {
            machine_key: key.to_owned(),
            start: from_epoch_seconds(start_seconds)?,
            finish: from_epoch_seconds(finish_seconds)?,
        })
    }

    /// Synthetic range used only as a query window; carries no machine key.
    pub fn from_bounds(start: OffsetDateTime, finish: OffsetDateTime) -> Self {
        Self {
            machine_key: String::new(),
            start,
            finish,
        }
    }

    pub fn machine_key(&self) -> &str {
        &self.machine_key
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn finish(&self) -> OffsetDateTime {
        self.finish
    }

    /// Inclusive containment on both boundaries.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start <= at && at <= self.finish
    }

    /// Shard-selection predicate: true when either boundary of `other` falls
    /// inside this range.
    ///
    /// Deliberately not full interval intersection: a window strictly inside
    /// a single shard matches neither boundary and selects nothing. That is
    /// the store's documented historical behaviour and is covered by a
    /// regression test, so do not "fix" it here without revisiting callers.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.contains(other.start) || self.contains(other.finish)
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            epoch_seconds(self.start),
            epoch_seconds(self.finish)
        )
    }
}
