//! Pieces shared by every backend's dispatch tick.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::{JobError, QueueError};
use crate::job::Job;
use crate::processor::Processor;

/// Holds a queue's processor and tracks the job tasks it has spawned.
#[derive(Default)]
pub struct Dispatcher {
    processor: RwLock<Option<Arc<dyn Processor>>>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_processor(&self, processor: Arc<dyn Processor>) {
        *self
            .processor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(processor);
    }

    /// The registered processor, or a configuration error.
    pub fn processor(&self, queue_name: &str) -> Result<Arc<dyn Processor>, QueueError> {
        self.processor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| QueueError::NoProcessor(queue_name.to_string()))
    }

    /// Run a job task independently of the tick that claimed it.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every spawned job task to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// Hand a claimed job to the processor and apply the outcome.
///
/// Handler errors and panics never escape: they become `fail(reason)`.
pub async fn execute(processor: &dyn Processor, job: &mut Job) -> Result<(), JobError> {
    let outcome = AssertUnwindSafe(processor.process(job.state()))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            job.complete()?;
            debug!(job_id = %job.id, status = %job.status, "job processed");
        }
        Ok(Err(error)) => {
            let reason = error.to_string();
            job.fail(Some(&reason))?;
            debug!(job_id = %job.id, %reason, "job attempt failed");
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            job.fail(reason)?;
            debug!(job_id = %job.id, reason = reason.unwrap_or_default(), "job handler panicked");
        }
    }

    if job.is_failed() {
        warn!(
            job_id = %job.id,
            queue = %job.queue_name,
            attempts = job.attempts_done,
            reason = job.failure_reason.as_deref().unwrap_or_default(),
            "job failed permanently"
        );
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::builder::JobSpec;
    use crate::clock::SystemClock;
    use crate::error::BoxError;
    use crate::testing::FailingProcessor;
    use crate::types::JobState;

    struct Panicking(&'static str);

    #[async_trait]
    impl Processor for Panicking {
        async fn process(&self, _job: &JobState) -> Result<(), BoxError> {
            panic!("{}", self.0);
        }
    }

    fn claimed() -> Job {
        let mut job = Job::from_spec(JobSpec::new(json!({})), "q", Arc::new(SystemClock)).unwrap();
        job.acquire("w").unwrap();
        job
    }

    #[tokio::test]
    async fn handler_error_fails_the_job() {
        let mut job = claimed();
        execute(&FailingProcessor::new("smtp down"), &mut job).await.unwrap();
        assert!(job.is_failed());
        assert_eq!(job.failure_reason.as_deref(), Some("smtp down"));
    }

    #[tokio::test]
    async fn panics_are_caught() {
        let mut job = claimed();
        execute(&Panicking("kaboom"), &mut job).await.unwrap();
        assert!(job.is_failed());
        assert_eq!(job.failure_reason.as_deref(), Some("kaboom"));
    }

    #[tokio::test]
    async fn missing_processor_is_a_configuration_error() {
        let dispatcher = Dispatcher::new();
        assert!(matches!(
            dispatcher.processor("emails"),
            Err(QueueError::NoProcessor(name)) if name == "emails"
        ));

        dispatcher.set_processor(Arc::new(FailingProcessor::new("x")));
        assert!(dispatcher.processor("emails").is_ok());
    }

    #[tokio::test]
    async fn drain_waits_for_spawned_tasks() {
        let dispatcher = Dispatcher::new();
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = done.clone();
        dispatcher.spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        dispatcher.drain().await;
        assert!(done.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(dispatcher.in_flight(), 0);

        dispatcher.spawn(async {});
        dispatcher.drain().await;
    }
}
