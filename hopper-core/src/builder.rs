//! Fluent construction of job specifications.

use serde::Serialize;
use serde_json::Value;

use crate::backoff::{AsapBackoff, BackoffStrategy};
use crate::duration::Duration;
use crate::error::QueueError;
use crate::queue::Queue;
use crate::schedule::{AsapSchedule, DelaySchedule, ScheduleStrategy};
use crate::types::BuiltJob;

/// Immutable description of a job to create.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Generated at insertion time when absent.
    pub id: Option<String>,
    pub payload: Value,
    pub attempts: u32,
    pub priority: i32,
    pub schedule: Box<dyn ScheduleStrategy>,
    pub backoff: Box<dyn BackoffStrategy>,
}

impl JobSpec {
    /// A single-attempt job that runs as soon as possible.
    pub fn new(payload: Value) -> Self {
        Self {
            id: None,
            payload,
            attempts: 1,
            priority: 0,
            schedule: Box::new(AsapSchedule),
            backoff: Box::new(AsapBackoff),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_schedule(mut self, schedule: impl ScheduleStrategy + 'static) -> Self {
        self.schedule = Box::new(schedule);
        self
    }

    pub fn with_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if self.attempts == 0 {
            return Err(QueueError::InvalidSpec(
                "a job needs at least one attempt".to_string(),
            ));
        }
        if matches!(self.id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(QueueError::InvalidSpec("job id must not be blank".to_string()));
        }
        Ok(())
    }
}

/// Builder returned by [`Queue::create_job`].
///
/// ```rust,no_run
/// # use hopper_core::{Duration, ExponentialBackoff, Queue, QueueError};
/// # async fn example(queue: &dyn Queue) -> Result<(), QueueError> {
/// let built = queue
///     .create_job(serde_json::json!({ "to": "someone@example.com" }))
///     .attempts(5)
///     .priority(10)
///     .backoff(ExponentialBackoff::new(Duration::seconds(30)))
///     .save(queue)
///     .await?;
/// println!("queued {}", built.id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
#[must_use = "a job builder does nothing until it is saved"]
pub struct JobBuilder {
    spec: JobSpec,
}

impl JobBuilder {
    pub fn new(payload: Value) -> Self {
        Self {
            spec: JobSpec::new(payload),
        }
    }

    /// Start from any serializable payload.
    pub fn from_serializable<T: Serialize + ?Sized>(payload: &T) -> Result<Self, QueueError> {
        Ok(Self::new(serde_json::to_value(payload)?))
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.spec = self.spec.with_id(id);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.spec.attempts = attempts;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.spec.priority = priority;
        self
    }

    pub fn schedule(mut self, schedule: impl ScheduleStrategy + 'static) -> Self {
        self.spec.schedule = Box::new(schedule);
        self
    }

    pub fn backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.spec.backoff = Box::new(backoff);
        self
    }

    /// Run once, after `delay`.
    pub fn delay(self, delay: Duration) -> Self {
        self.schedule(DelaySchedule::once(delay))
    }

    /// Run after `interval`, then again every `interval` once completed.
    pub fn repeat_every(self, interval: Duration) -> Self {
        self.schedule(DelaySchedule::repeating(interval))
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }

    pub async fn save(self, queue: &dyn Queue) -> Result<BuiltJob, QueueError> {
        queue.add_job(self).await
    }
}

impl From<JobBuilder> for JobSpec {
    fn from(builder: JobBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use super::*;
    use crate::backoff::LinearBackoff;

    #[test]
    fn defaults() {
        let spec = JobBuilder::new(json!({ "a": 1 })).build();
        let now: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();

        assert_eq!(spec.id, None);
        assert_eq!(spec.attempts, 1);
        assert_eq!(spec.priority, 0);
        assert_eq!(spec.payload, json!({ "a": 1 }));
        assert_eq!(spec.schedule.first_run_at(now), now);
        assert_eq!(spec.schedule.next_run_at(now), None);
        assert_eq!(spec.backoff.schedule_for(now, 1, 1), now);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn setters_are_applied() {
        let now: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let spec = JobBuilder::new(json!(null))
            .id("fixed-id")
            .attempts(4)
            .priority(-3)
            .backoff(LinearBackoff::new(Duration::seconds(10)))
            .repeat_every(Duration::minutes(1))
            .build();

        assert_eq!(spec.id.as_deref(), Some("fixed-id"));
        assert_eq!(spec.attempts, 4);
        assert_eq!(spec.priority, -3);
        assert_eq!(spec.schedule.next_run_at(now), Some(Duration::minutes(1).add_to(now)));
        assert_eq!(spec.backoff.schedule_for(now, 2, 4), Duration::seconds(20).add_to(now));
    }

    #[test]
    fn delay_does_not_repeat() {
        let now: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let spec = JobBuilder::new(json!(null)).delay(Duration::hours(1)).build();
        assert_eq!(spec.schedule.first_run_at(now), Duration::hours(1).add_to(now));
        assert_eq!(spec.schedule.next_run_at(now), None);
    }

    #[test]
    fn serializable_payloads() {
        #[derive(Serialize)]
        struct Resize {
            width: u32,
        }

        let spec = JobBuilder::from_serializable(&Resize { width: 64 })
            .unwrap()
            .build();
        assert_eq!(spec.payload, json!({ "width": 64 }));
    }

    #[test]
    fn invalid_specs() {
        assert!(matches!(
            JobSpec::new(json!(null)).with_attempts(0).validate(),
            Err(QueueError::InvalidSpec(_))
        ));
        assert!(matches!(
            JobSpec::new(json!(null)).with_id("  ").validate(),
            Err(QueueError::InvalidSpec(_))
        ));
    }
}
