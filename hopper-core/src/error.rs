//! Error types for the job queue core.

use thiserror::Error;

use crate::types::JobStatus;

/// Error type returned by job processors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the job lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("cannot {action} job {id} while it is {status}")]
    InvalidTransition {
        id: String,
        action: &'static str,
        status: JobStatus,
    },
}

/// Errors raised while resolving serialized strategies.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unrecognized {family} strategy: {data}")]
    Unrecognized {
        family: &'static str,
        data: serde_json::Value,
    },

    #[error("malformed {family} strategy `{kind}`: {source}")]
    Malformed {
        family: &'static str,
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while building strategies from user input.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid cron pattern `{pattern}`: {reason}")]
    InvalidCron { pattern: String, reason: String },

    #[error("unknown timezone `{0}`")]
    UnknownTimezone(String),
}

/// Errors that may occur while interacting with a queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no processor registered for queue {0}")]
    NoProcessor(String),

    #[error("invalid job specification: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Transition(#[from] JobError),

    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] CatalogError),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queue backend error: {0}")]
    Backend(#[source] BoxError),
}

impl QueueError {
    /// Wrap a storage or transport error raised by a backend.
    pub fn backend(error: impl Into<BoxError>) -> Self {
        Self::Backend(error.into())
    }
}
