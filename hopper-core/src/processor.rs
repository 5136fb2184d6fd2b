//! Job handlers.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::BoxError;
use crate::types::JobState;

/// Handles the jobs claimed from a queue.
///
/// Returning an error (or panicking) fails the attempt; the error's message
/// becomes the job's failure reason once no attempts remain.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, job: &JobState) -> Result<(), BoxError>;

    /// Advisory only. Backends do not enforce it.
    fn concurrency(&self) -> usize {
        1
    }
}

/// Adapts an async closure into a [`Processor`].
pub struct FnProcessor<F> {
    handler: F,
}

/// Build a processor from a closure receiving an owned snapshot of the job.
pub fn processor_fn<F, Fut>(handler: F) -> FnProcessor<F>
where
    F: Fn(JobState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    FnProcessor { handler }
}

impl<F> fmt::Debug for FnProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcessor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(JobState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn process(&self, job: &JobState) -> Result<(), BoxError> {
        (self.handler)(job.clone()).await
    }
}
