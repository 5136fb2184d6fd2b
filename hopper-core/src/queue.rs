//! Backend-agnostic queue contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::builder::{JobBuilder, JobSpec};
use crate::error::QueueError;
use crate::looper::Looper;
use crate::processor::Processor;
use crate::types::{BuiltJob, JobState};

/// A named queue of jobs with a dispatch loop.
///
/// Every eligible job is claimed by exactly one worker per tick, handed to
/// the registered [`Processor`], and its resulting state persisted.
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    fn create_job(&self, payload: Value) -> JobBuilder {
        JobBuilder::new(payload)
    }

    async fn add_job(&self, job: JobBuilder) -> Result<BuiltJob, QueueError> {
        self.add_job_specs(vec![job.build()])
            .await?
            .pop()
            .ok_or_else(|| QueueError::backend("insert returned no job"))
    }

    /// Add several jobs atomically: either all are visible afterwards or none.
    async fn add_jobs(&self, jobs: Vec<JobBuilder>) -> Result<Vec<BuiltJob>, QueueError> {
        self.add_job_specs(jobs.into_iter().map(JobBuilder::build).collect())
            .await
    }

    async fn add_job_spec(&self, spec: JobSpec) -> Result<BuiltJob, QueueError> {
        self.add_job_specs(vec![spec])
            .await?
            .pop()
            .ok_or_else(|| QueueError::backend("insert returned no job"))
    }

    /// Returns one [`BuiltJob`] per spec, in input order.
    async fn add_job_specs(&self, specs: Vec<JobSpec>) -> Result<Vec<BuiltJob>, QueueError>;

    /// Snapshot of a job. Does not affect claiming.
    async fn read_job(&self, id: &str) -> Result<Option<JobState>, QueueError>;

    fn set_processor(&self, processor: Arc<dyn Processor>);

    /// Replace the dispatch loop driver. A running looper is stopped first.
    async fn set_looper(&self, looper: Box<dyn Looper>);

    /// Start ticking. Fails when no processor has been registered.
    async fn start_processing(&self) -> Result<(), QueueError>;

    /// Stop ticking, then wait for in-flight jobs to be persisted.
    async fn stop_processing(&self);

    /// Wait for every dispatched job to be persisted.
    async fn drain(&self);
}

/// Creates queues bound to one backend.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn create_queue(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError>;
}
