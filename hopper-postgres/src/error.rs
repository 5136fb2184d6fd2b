use hopper_core::{CatalogError, JobError, QueueError, UnknownStatus};
use thiserror::Error;

/// Errors raised inside the PostgreSQL backend before they reach callers as
/// [`QueueError`].
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("stored job has an invalid status: {0}")]
    Status(#[from] UnknownStatus),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<JobError> for PostgresError {
    fn from(error: JobError) -> Self {
        Self::Queue(error.into())
    }
}

impl From<CatalogError> for PostgresError {
    fn from(error: CatalogError) -> Self {
        Self::Queue(error.into())
    }
}

impl From<serde_json::Error> for PostgresError {
    fn from(error: serde_json::Error) -> Self {
        Self::Queue(error.into())
    }
}

impl From<PostgresError> for QueueError {
    fn from(error: PostgresError) -> Self {
        match error {
            PostgresError::Queue(error) => error,
            PostgresError::Sqlx(error) => QueueError::backend(error),
            PostgresError::Migrate(error) => QueueError::backend(error),
            PostgresError::Status(error) => QueueError::backend(error),
        }
    }
}
