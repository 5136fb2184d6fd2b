//! Strategies deciding when a job first runs and whether it runs again.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::catalog::{Catalog, Deserializable};
use crate::duration::Duration;
use crate::error::StrategyError;

/// Strategy computing a job's first and subsequent eligible run times.
pub trait ScheduleStrategy: fmt::Debug + Send + Sync {
    /// Data written to storage; must be accepted by the matching decoder.
    fn serialize(&self) -> Value;

    fn first_run_at(&self, now: DateTime<Utc>) -> DateTime<Utc>;

    /// `None` means the job does not repeat.
    fn next_run_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Called once a repeat has actually been scheduled.
    fn scheduled_for_next_run(&mut self) {}

    fn clone_box(&self) -> Box<dyn ScheduleStrategy>;
}

impl Clone for Box<dyn ScheduleStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

pub type ScheduleCatalog = Catalog<dyn ScheduleStrategy>;

impl Catalog<dyn ScheduleStrategy> {
    /// Catalog preloaded with the built-in schedules.
    pub fn schedules() -> Self {
        let catalog = Self::empty("schedule");
        catalog.register::<AsapSchedule>();
        catalog.register::<DelaySchedule>();
        catalog.register::<CronSchedule>();
        catalog
    }
}

impl Default for Catalog<dyn ScheduleStrategy> {
    fn default() -> Self {
        Self::schedules()
    }
}

/// Run once, as soon as possible.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AsapSchedule;

impl ScheduleStrategy for AsapSchedule {
    fn serialize(&self) -> Value {
        Value::Null
    }

    fn first_run_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now
    }

    fn next_run_at(&self, _now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        None
    }

    fn clone_box(&self) -> Box<dyn ScheduleStrategy> {
        Box::new(*self)
    }
}

impl Deserializable<dyn ScheduleStrategy> for AsapSchedule {
    const KIND: &'static str = "asap";

    fn deserializable(data: &Value) -> bool {
        data.is_null()
    }

    fn deserialize(_data: &Value) -> Result<Box<dyn ScheduleStrategy>, serde_json::Error> {
        Ok(Box::new(AsapSchedule))
    }
}

/// Run after a fixed delay, optionally repeating with the same delay after
/// each completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelaySchedule {
    duration: Duration,
    repeat: bool,
}

#[derive(Deserialize)]
struct DelayData {
    ms: i64,
    #[serde(default)]
    repeat: bool,
}

impl DelaySchedule {
    pub const fn once(duration: Duration) -> Self {
        Self {
            duration,
            repeat: false,
        }
    }

    pub const fn repeating(duration: Duration) -> Self {
        Self {
            duration,
            repeat: true,
        }
    }

    #[inline]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    #[inline]
    pub const fn repeats(&self) -> bool {
        self.repeat
    }
}

impl ScheduleStrategy for DelaySchedule {
    fn serialize(&self) -> Value {
        json!({
            "type": <Self as Deserializable<dyn ScheduleStrategy>>::KIND,
            "ms": self.duration.as_millis(),
            "repeat": self.repeat,
        })
    }

    fn first_run_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.duration.add_to(now)
    }

    fn next_run_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.repeat.then(|| self.duration.add_to(now))
    }

    fn clone_box(&self) -> Box<dyn ScheduleStrategy> {
        Box::new(*self)
    }
}

impl Deserializable<dyn ScheduleStrategy> for DelaySchedule {
    const KIND: &'static str = "delay";

    fn deserialize(data: &Value) -> Result<Box<dyn ScheduleStrategy>, serde_json::Error> {
        let data = DelayData::deserialize(data)?;
        Ok(Box::new(Self {
            duration: Duration::milliseconds(data.ms),
            repeat: data.repeat,
        }))
    }
}

/// Run at every occurrence of a five-field cron pattern.
#[derive(Clone, PartialEq, Eq)]
pub struct CronSchedule {
    pattern: String,
    timezone: Option<String>,
    tz: Tz,
}

#[derive(Deserialize)]
struct CronData {
    pattern: String,
    #[serde(default)]
    timezone: Option<String>,
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronSchedule")
            .field("pattern", &self.pattern)
            .field("timezone", &self.tz.name())
            .finish()
    }
}

impl CronSchedule {
    /// Build a schedule evaluated in UTC.
    pub fn new(pattern: impl Into<String>) -> Result<Self, StrategyError> {
        Self::build(pattern.into(), None)
    }

    /// Build a schedule evaluated in the named IANA timezone.
    pub fn with_timezone(
        pattern: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, StrategyError> {
        Self::build(pattern.into(), Some(timezone.into()))
    }

    fn build(pattern: String, timezone: Option<String>) -> Result<Self, StrategyError> {
        parse_pattern(&pattern)?;
        let tz = match timezone.as_deref() {
            None => Tz::UTC,
            Some(name) if name.eq_ignore_ascii_case("utc") => Tz::UTC,
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| StrategyError::UnknownTimezone(name.to_owned()))?,
        };
        Ok(Self {
            pattern,
            timezone,
            tz,
        })
    }

    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Next occurrence strictly after `now`.
    fn occurrence_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cron = parse_pattern(&self.pattern).ok()?;
        let local = now.with_timezone(&self.tz);
        match cron.find_next_occurrence(&local, false) {
            Ok(next) => Some(next.with_timezone(&Utc)),
            Err(err) => {
                warn!(pattern = %self.pattern, error = %err, "cron pattern has no next occurrence");
                None
            }
        }
    }
}

fn parse_pattern(pattern: &str) -> Result<Cron, StrategyError> {
    Cron::new(pattern)
        .parse()
        .map_err(|err| StrategyError::InvalidCron {
            pattern: pattern.to_owned(),
            reason: err.to_string(),
        })
}

impl ScheduleStrategy for CronSchedule {
    fn serialize(&self) -> Value {
        json!({
            "type": <Self as Deserializable<dyn ScheduleStrategy>>::KIND,
            "pattern": self.pattern,
            "timezone": self.timezone,
        })
    }

    /// A pattern that never fires again parks the job at the end of time.
    fn first_run_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.occurrence_after(now)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn next_run_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.occurrence_after(now)
    }

    fn clone_box(&self) -> Box<dyn ScheduleStrategy> {
        Box::new(self.clone())
    }
}

impl Deserializable<dyn ScheduleStrategy> for CronSchedule {
    const KIND: &'static str = "cron";

    fn deserialize(data: &Value) -> Result<Box<dyn ScheduleStrategy>, serde_json::Error> {
        use serde::de::Error as _;

        let data = CronData::deserialize(data)?;
        Self::build(data.pattern, data.timezone)
            .map(|schedule| Box::new(schedule) as Box<dyn ScheduleStrategy>)
            .map_err(serde_json::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().expect("valid timestamp")
    }

    #[test]
    fn asap_runs_now_and_never_repeats() {
        let now = at("2025-01-01T00:00:00Z");
        assert_eq!(AsapSchedule.first_run_at(now), now);
        assert_eq!(AsapSchedule.next_run_at(now), None);
        assert_eq!(AsapSchedule.serialize(), Value::Null);
    }

    #[test]
    fn delay_offsets_first_run() {
        let now = at("2025-01-01T00:00:00Z");
        let once = DelaySchedule::once(Duration::minutes(10));
        assert_eq!(once.first_run_at(now), at("2025-01-01T00:10:00Z"));
        assert_eq!(once.next_run_at(now), None);

        let repeating = DelaySchedule::repeating(Duration::minutes(10));
        assert_eq!(repeating.next_run_at(now), Some(at("2025-01-01T00:10:00Z")));
    }

    #[test]
    fn cron_next_occurrences() {
        let now = at("2025-01-01T00:00:00Z");
        let cases = [
            ("* * * * *", "2025-01-01T00:01:00Z"),
            ("0 0 * * *", "2025-01-02T00:00:00Z"),
            ("0 0 1 * *", "2025-02-01T00:00:00Z"),
            ("0 0 1 1 *", "2026-01-01T00:00:00Z"),
            ("0 0 1 1 0", "2025-01-05T00:00:00Z"),
        ];

        for (pattern, expected) in cases {
            let cron = CronSchedule::with_timezone(pattern, "utc").unwrap();
            assert_eq!(cron.first_run_at(now), at(expected), "pattern {pattern}");
            assert_eq!(cron.next_run_at(now), Some(at(expected)), "pattern {pattern}");
        }
    }

    #[test]
    fn cron_respects_timezone() {
        let now = at("2025-01-01T00:00:00Z");
        let cron = CronSchedule::with_timezone("0 9 * * *", "Europe/Paris").unwrap();
        // 09:00 in Paris is 08:00 UTC in winter.
        assert_eq!(cron.first_run_at(now), at("2025-01-01T08:00:00Z"));
    }

    #[test]
    fn cron_rejects_bad_input() {
        assert!(matches!(
            CronSchedule::new("not a cron"),
            Err(StrategyError::InvalidCron { .. })
        ));
        assert!(matches!(
            CronSchedule::with_timezone("* * * * *", "Mars/Olympus"),
            Err(StrategyError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn round_trips_through_the_catalog() {
        let catalog = ScheduleCatalog::schedules();
        let now = at("2025-03-04T05:06:07Z");
        let originals: Vec<Box<dyn ScheduleStrategy>> = vec![
            Box::new(AsapSchedule),
            Box::new(DelaySchedule::once(Duration::seconds(42))),
            Box::new(DelaySchedule::repeating(Duration::hours(1))),
            Box::new(CronSchedule::with_timezone("30 2 * * 1", "America/New_York").unwrap()),
        ];

        for original in originals {
            let decoded = catalog.rehydrate(&original.serialize()).unwrap();
            assert_eq!(decoded.first_run_at(now), original.first_run_at(now), "{original:?}");
            assert_eq!(decoded.next_run_at(now), original.next_run_at(now), "{original:?}");
            assert_eq!(decoded.serialize(), original.serialize());
        }
    }
}
