//! Core types for the job queue system.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::backoff::BackoffStrategy;
use crate::schedule::ScheduleStrategy;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [Self; 4] = [
        Self::Waiting,
        Self::Processing,
        Self::Completed,
        Self::Failed,
    ];

    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true if this status represents a terminal state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Persisted state of a job.
///
/// This is the single record both backends read and write. Mutations go
/// through [`crate::Job`], which enforces the lifecycle transitions.
#[derive(Debug, Clone)]
pub struct JobState {
    pub id: String,
    pub queue_name: String,
    /// Current owner. Cleared by `release` independently of `status`.
    pub worker_id: Option<String>,
    pub payload: Value,
    pub attempts_max: u32,
    pub attempts_done: u32,
    pub priority: i32,
    pub schedule: Box<dyn ScheduleStrategy>,
    pub backoff: Box<dyn BackoffStrategy>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub scheduled_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl JobState {
    #[inline]
    pub fn is_waiting(&self) -> bool {
        self.status == JobStatus::Waiting
    }

    #[inline]
    pub fn is_processing(&self) -> bool {
        self.status == JobStatus::Processing
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.attempts_max.saturating_sub(self.attempts_done)
    }

    /// A job may be claimed once it is waiting and its scheduled time has passed.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_waiting() && self.scheduled_at <= now
    }

    /// Decode the payload into a typed value.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Storage order: higher priority first, then oldest first.
pub fn storage_order(a: &JobState, b: &JobState) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Claim order: higher priority first, then earliest scheduled, then oldest.
pub fn dispatch_order(a: &JobState, b: &JobState) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Result returned after a job has been added to a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuiltJob {
    pub id: String,
}
