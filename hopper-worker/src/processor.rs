use hopper_core::{async_trait, BoxError, JobState, Processor};
use tracing::info;

/// Logs each job and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProcessor;

#[async_trait]
impl Processor for LogProcessor {
    async fn process(&self, job: &JobState) -> Result<(), BoxError> {
        info!(
            queue = %job.queue_name,
            job_id = %job.id,
            attempt = job.attempts_done + 1,
            payload = %job.payload,
            "processing job"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hopper_core::{JobSpec, ManualClock, Job};
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn always_succeeds() {
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let job = Job::from_spec(JobSpec::new(json!({ "n": 1 })), "logs", clock).unwrap();
        assert!(LogProcessor.process(&job).await.is_ok());
    }
}
