//! Millisecond spans used by schedules and backoffs.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Immutable span of time with millisecond precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration {
    ms: i64,
}

impl Duration {
    pub const IMMEDIATE: Self = Self { ms: 0 };

    #[inline]
    pub const fn milliseconds(ms: i64) -> Self {
        Self { ms }
    }

    #[inline]
    pub const fn seconds(seconds: i64) -> Self {
        Self::milliseconds(seconds.saturating_mul(MS_PER_SECOND))
    }

    #[inline]
    pub const fn minutes(minutes: i64) -> Self {
        Self::milliseconds(minutes.saturating_mul(MS_PER_MINUTE))
    }

    #[inline]
    pub const fn hours(hours: i64) -> Self {
        Self::milliseconds(hours.saturating_mul(MS_PER_HOUR))
    }

    #[inline]
    pub const fn days(days: i64) -> Self {
        Self::milliseconds(days.saturating_mul(MS_PER_DAY))
    }

    #[inline]
    pub const fn as_millis(self) -> i64 {
        self.ms
    }

    /// Scale the span, rounding to the nearest millisecond.
    pub fn multiplied_by(self, factor: f64) -> Self {
        let scaled = (self.ms as f64 * factor).round();
        if scaled >= i64::MAX as f64 {
            Self::milliseconds(i64::MAX)
        } else if scaled <= i64::MIN as f64 {
            Self::milliseconds(i64::MIN)
        } else {
            Self::milliseconds(scaled as i64)
        }
    }

    /// Shift `date` by this span, saturating at the representable bounds.
    pub fn add_to(self, date: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::try_milliseconds(self.ms)
            .and_then(|delta| date.checked_add_signed(delta))
            .unwrap_or(if self.ms >= 0 {
                DateTime::<Utc>::MAX_UTC
            } else {
                DateTime::<Utc>::MIN_UTC
            })
    }

    /// Convert to a std duration; negative spans become zero.
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ms.max(0) as u64)
    }
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self::milliseconds(i64::try_from(value.as_millis()).unwrap_or(i64::MAX))
    }
}
