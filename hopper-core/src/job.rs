//! The job lifecycle state machine.

use std::ops::Deref;

use uuid::Uuid;

use crate::builder::JobSpec;
use crate::clock::SharedClock;
use crate::error::{JobError, QueueError};
use crate::types::{JobState, JobStatus};

/// Fallback failure reason when the error carries no message.
pub const UNKNOWN_FAILURE: &str = "unknown";

/// A job bound to a time source.
///
/// `Job` owns its [`JobState`] and is the only place where lifecycle
/// transitions happen:
///
/// ```text
/// waiting --acquire--> processing --complete--> completed | waiting (repeat)
///                                 --fail------> failed    | waiting (retry)
/// ```
#[derive(Debug, Clone)]
pub struct Job {
    state: JobState,
    clock: SharedClock,
}

impl Job {
    /// Create a fresh waiting job from a specification.
    pub fn from_spec(spec: JobSpec, queue_name: &str, clock: SharedClock) -> Result<Self, QueueError> {
        spec.validate()?;

        let now = clock.now();
        let JobSpec {
            id,
            payload,
            attempts,
            priority,
            schedule,
            backoff,
        } = spec;

        let state = JobState {
            id: id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            queue_name: queue_name.to_string(),
            worker_id: None,
            payload,
            attempts_max: attempts,
            attempts_done: 0,
            priority,
            scheduled_at: schedule.first_run_at(now),
            schedule,
            backoff,
            status: JobStatus::Waiting,
            created_at: now,
            started_at: None,
            updated_at: None,
            finished_at: None,
            failure_reason: None,
        };

        Ok(Self { state, clock })
    }

    /// Rebind persisted state to a clock.
    pub fn from_state(state: JobState, clock: SharedClock) -> Self {
        Self { state, clock }
    }

    #[inline]
    pub fn state(&self) -> &JobState {
        &self.state
    }

    #[inline]
    pub fn into_state(self) -> JobState {
        self.state
    }

    /// Claim a waiting job for `worker_id`.
    pub fn acquire(&mut self, worker_id: &str) -> Result<(), JobError> {
        self.guard("acquire", JobStatus::Waiting)?;
        let now = self.clock.now();

        self.state.status = JobStatus::Processing;
        self.state.worker_id = Some(worker_id.to_string());
        self.state.started_at = Some(now);
        self.state.updated_at = Some(now);
        Ok(())
    }

    /// Mark a processing job as done, or put it back to wait for its next run.
    pub fn complete(&mut self) -> Result<(), JobError> {
        self.guard("complete", JobStatus::Processing)?;
        let now = self.clock.now();

        match self.state.schedule.next_run_at(now) {
            Some(next) => {
                self.state.schedule.scheduled_for_next_run();
                self.state.status = JobStatus::Waiting;
                self.state.scheduled_at = next;
            }
            None => {
                self.state.status = JobStatus::Completed;
                self.state.finished_at = Some(now);
            }
        }
        self.state.updated_at = Some(now);
        Ok(())
    }

    /// Record a failed attempt. Retries through the backoff while attempts remain.
    pub fn fail(&mut self, reason: Option<&str>) -> Result<(), JobError> {
        self.guard("fail", JobStatus::Processing)?;
        let now = self.clock.now();

        self.state.attempts_done = self.state.attempts_done.saturating_add(1);
        if self.state.attempts_done < self.state.attempts_max {
            self.state.scheduled_at = self.state.backoff.schedule_for(
                now,
                self.state.attempts_done,
                self.state.attempts_max,
            );
            self.state.status = JobStatus::Waiting;
        } else {
            let reason = reason.filter(|r| !r.is_empty()).unwrap_or(UNKNOWN_FAILURE);
            self.state.status = JobStatus::Failed;
            self.state.finished_at = Some(now);
            self.state.failure_reason = Some(reason.to_string());
        }
        self.state.updated_at = Some(now);
        Ok(())
    }

    /// Drop ownership. The status is left untouched.
    pub fn release(&mut self) {
        self.state.worker_id = None;
    }

    fn guard(&self, action: &'static str, required: JobStatus) -> Result<(), JobError> {
        if self.state.status == required {
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                id: self.state.id.clone(),
                action,
                status: self.state.status,
            })
        }
    }
}

impl Deref for Job {
    type Target = JobState;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use serde_json::json;

    use super::*;
    use crate::backoff::{ExponentialBackoff, FixedBackoff};
    use crate::clock::ManualClock;
    use crate::duration::Duration;
    use crate::schedule::DelaySchedule;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn clock() -> ManualClock {
        ManualClock::new(at("2025-01-01T00:00:00Z"))
    }

    fn job(spec: JobSpec, clock: &ManualClock) -> Job {
        Job::from_spec(spec, "emails", Arc::new(clock.clone())).unwrap()
    }

    #[test]
    fn new_job_waits_for_its_first_run() {
        let clock = clock();
        let spec = JobSpec::new(json!({ "n": 1 }))
            .with_schedule(DelaySchedule::once(Duration::minutes(5)));
        let job = job(spec, &clock);

        assert!(job.is_waiting());
        assert_eq!(job.queue_name, "emails");
        assert_eq!(job.scheduled_at, at("2025-01-01T00:05:00Z"));
        assert_eq!(job.created_at, at("2025-01-01T00:00:00Z"));
        assert!(!job.id.is_empty());
        assert!(job.updated_at.is_none());
    }

    #[test]
    fn explicit_id_is_kept() {
        let clock = clock();
        let job = job(JobSpec::new(json!({})).with_id("job-1"), &clock);
        assert_eq!(job.id, "job-1");
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let result = Job::from_spec(
            JobSpec::new(json!({})).with_attempts(0),
            "q",
            Arc::new(clock()),
        );
        assert!(matches!(result, Err(QueueError::InvalidSpec(_))));
    }

    #[test]
    fn acquire_then_complete() {
        let clock = clock();
        let mut job = job(JobSpec::new(json!({})), &clock);

        job.acquire("worker-a").unwrap();
        assert!(job.is_processing());
        assert_eq!(job.worker_id.as_deref(), Some("worker-a"));
        assert_eq!(job.started_at, Some(at("2025-01-01T00:00:00Z")));

        clock.advance(Duration::seconds(3));
        job.complete().unwrap();
        assert!(job.is_completed());
        assert_eq!(job.finished_at, Some(at("2025-01-01T00:00:03Z")));
        assert_eq!(job.updated_at, Some(at("2025-01-01T00:00:03Z")));
    }

    #[test]
    fn repeating_job_returns_to_waiting() {
        let clock = clock();
        let spec = JobSpec::new(json!({}))
            .with_schedule(DelaySchedule::repeating(Duration::minutes(10)));
        let mut job = job(spec, &clock);

        clock.advance(Duration::minutes(10));
        job.acquire("w").unwrap();
        job.complete().unwrap();

        assert!(job.is_waiting());
        assert!(job.finished_at.is_none());
        assert_eq!(job.scheduled_at, at("2025-01-01T00:20:00Z"));
    }

    #[test]
    fn failures_retry_until_attempts_run_out() {
        let clock = clock();
        let spec = JobSpec::new(json!({}))
            .with_attempts(3)
            .with_backoff(ExponentialBackoff::new(Duration::minutes(1)));
        let mut job = job(spec, &clock);

        job.acquire("w").unwrap();
        job.fail(Some("boom")).unwrap();
        assert!(job.is_waiting());
        assert_eq!(job.attempts_done, 1);
        assert_eq!(job.remaining_attempts(), 2);
        assert_eq!(job.scheduled_at, at("2025-01-01T00:01:00Z"));
        assert!(job.failure_reason.is_none());

        job.acquire("w").unwrap();
        job.fail(Some("boom")).unwrap();
        assert_eq!(job.scheduled_at, at("2025-01-01T00:02:00Z"));

        job.acquire("w").unwrap();
        job.fail(Some("boom")).unwrap();
        assert!(job.is_failed());
        assert_eq!(job.attempts_done, 3);
        assert_eq!(job.attempts_max, 3);
        assert_eq!(job.failure_reason.as_deref(), Some("boom"));
        assert_eq!(job.finished_at, Some(at("2025-01-01T00:00:00Z")));
    }

    #[test]
    fn missing_reason_falls_back_to_unknown() {
        let clock = clock();
        for reason in [None, Some("")] {
            let mut job = job(JobSpec::new(json!({})), &clock);
            job.acquire("w").unwrap();
            job.fail(reason).unwrap();
            assert_eq!(job.failure_reason.as_deref(), Some(UNKNOWN_FAILURE));
        }
    }

    #[test]
    fn release_keeps_status() {
        let clock = clock();
        let mut job = job(JobSpec::new(json!({})), &clock);
        job.acquire("w").unwrap();
        job.release();
        assert!(job.is_processing());
        assert!(job.worker_id.is_none());
    }

    #[test]
    fn guards_reject_out_of_order_transitions() {
        let clock = clock();
        let mut job = job(
            JobSpec::new(json!({})).with_backoff(FixedBackoff::new(Duration::seconds(1))),
            &clock,
        );

        assert_eq!(
            job.complete(),
            Err(JobError::InvalidTransition {
                id: job.id.clone(),
                action: "complete",
                status: JobStatus::Waiting,
            })
        );
        assert!(job.fail(None).is_err());

        job.acquire("w").unwrap();
        assert!(job.acquire("other").is_err());

        job.complete().unwrap();
        assert!(job.acquire("w").is_err());
        assert!(job.complete().is_err());
        assert!(job.fail(Some("late")).is_err());
        assert!(job.is_completed());
    }
}
