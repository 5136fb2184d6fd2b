//! Mapping between `jobs` rows and [`JobState`].

use chrono::{DateTime, Utc};
use hopper_core::{JobState, JobStatus, StrategyCatalogs};
use serde_json::Value;

use crate::error::PostgresError;

/// Column list shared by every query reading jobs.
pub(crate) const JOB_COLUMNS: &str = "id, queue_name, worker_id, attempts_max, attempts_done, \
     priority, data, status, backoff, schedule, created_at, started_at, scheduled_at, \
     updated_at, finished_at, failure_reason";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: String,
    pub queue_name: String,
    pub worker_id: Option<String>,
    pub attempts_max: i32,
    pub attempts_done: i32,
    pub priority: i32,
    pub data: Value,
    pub status: String,
    pub backoff: Option<Value>,
    pub schedule: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl JobRow {
    /// Rebuild the job state. Unknown strategies are integrity errors.
    pub fn into_state(self, catalogs: &StrategyCatalogs) -> Result<JobState, PostgresError> {
        let schedule = catalogs.schedule(&self.schedule.unwrap_or(Value::Null))?;
        let backoff = catalogs.backoff(&self.backoff.unwrap_or(Value::Null))?;

        Ok(JobState {
            status: self.status.parse::<JobStatus>()?,
            id: self.id,
            queue_name: self.queue_name,
            worker_id: self.worker_id,
            payload: self.data,
            attempts_max: from_column(self.attempts_max),
            attempts_done: from_column(self.attempts_done),
            priority: self.priority,
            schedule,
            backoff,
            created_at: self.created_at,
            started_at: self.started_at,
            scheduled_at: self.scheduled_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
            failure_reason: self.failure_reason,
        })
    }
}

/// A job ready to be bound into an INSERT or UPDATE.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub queue_name: String,
    pub worker_id: Option<String>,
    pub attempts_max: i32,
    pub attempts_done: i32,
    pub priority: i32,
    pub data: Value,
    pub status: &'static str,
    pub backoff: Value,
    pub schedule: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl From<JobState> for JobRecord {
    fn from(state: JobState) -> Self {
        Self {
            backoff: state.backoff.serialize(),
            schedule: state.schedule.serialize(),
            status: state.status.as_str(),
            id: state.id,
            queue_name: state.queue_name,
            worker_id: state.worker_id,
            attempts_max: to_column(state.attempts_max),
            attempts_done: to_column(state.attempts_done),
            priority: state.priority,
            data: state.payload,
            created_at: state.created_at,
            started_at: state.started_at,
            scheduled_at: state.scheduled_at,
            updated_at: state.updated_at,
            finished_at: state.finished_at,
            failure_reason: state.failure_reason,
        }
    }
}

#[inline]
fn to_column(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

#[inline]
fn from_column(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use hopper_core::{
        CatalogError, Duration, ExponentialBackoff, JobSpec, Job, ManualClock, QueueError,
        DelaySchedule,
    };
    use serde_json::json;
    use std::sync::Arc;

    use super::*;

    fn sample_state() -> JobState {
        let clock = ManualClock::new("2025-01-01T00:00:00Z".parse().unwrap());
        let spec = JobSpec::new(json!({ "k": 1 }))
            .with_id("job-1")
            .with_attempts(4)
            .with_priority(7)
            .with_schedule(DelaySchedule::repeating(Duration::minutes(5)))
            .with_backoff(ExponentialBackoff::new(Duration::seconds(2)));
        Job::from_spec(spec, "emails", Arc::new(clock)).unwrap().into_state()
    }

    fn row_from(record: JobRecord) -> JobRow {
        JobRow {
            id: record.id,
            queue_name: record.queue_name,
            worker_id: record.worker_id,
            attempts_max: record.attempts_max,
            attempts_done: record.attempts_done,
            priority: record.priority,
            data: record.data,
            status: record.status.to_string(),
            backoff: Some(record.backoff),
            schedule: Some(record.schedule),
            created_at: record.created_at,
            started_at: record.started_at,
            scheduled_at: record.scheduled_at,
            updated_at: record.updated_at,
            finished_at: record.finished_at,
            failure_reason: record.failure_reason,
        }
    }

    #[test]
    fn stored_jobs_come_back_with_working_strategies() {
        let original = sample_state();
        let now = original.created_at;
        let restored = row_from(JobRecord::from(original.clone()))
            .into_state(&StrategyCatalogs::default())
            .unwrap();

        assert_eq!(restored.id, "job-1");
        assert_eq!(restored.queue_name, "emails");
        assert_eq!(restored.status, JobStatus::Waiting);
        assert_eq!(restored.attempts_max, 4);
        assert_eq!(restored.priority, 7);
        assert_eq!(restored.payload, json!({ "k": 1 }));
        assert_eq!(restored.scheduled_at, original.scheduled_at);
        assert_eq!(
            restored.schedule.next_run_at(now),
            original.schedule.next_run_at(now)
        );
        assert_eq!(
            restored.backoff.schedule_for(now, 3, 4),
            original.backoff.schedule_for(now, 3, 4)
        );
    }

    #[test]
    fn missing_strategy_columns_mean_asap() {
        let mut row = row_from(JobRecord::from(sample_state()));
        row.schedule = None;
        row.backoff = None;
        let state = row.into_state(&StrategyCatalogs::default()).unwrap();
        assert_eq!(state.schedule.next_run_at(state.created_at), None);
        assert_eq!(state.backoff.schedule_for(state.created_at, 1, 4), state.created_at);
    }

    #[test]
    fn unknown_strategy_is_a_data_integrity_error() {
        let mut row = row_from(JobRecord::from(sample_state()));
        row.backoff = Some(json!({ "type": "fibonacci" }));
        let error: QueueError = row
            .into_state(&StrategyCatalogs::default())
            .unwrap_err()
            .into();
        assert!(matches!(
            error,
            QueueError::DataIntegrity(CatalogError::Unrecognized { family: "backoff", .. })
        ));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut row = row_from(JobRecord::from(sample_state()));
        row.status = "dead".to_string();
        assert!(matches!(
            row.into_state(&StrategyCatalogs::default()),
            Err(PostgresError::Status(_))
        ));
    }
}
