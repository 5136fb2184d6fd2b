//! Processors for exercising queues in tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::duration::Duration;
use crate::error::BoxError;
use crate::processor::Processor;
use crate::types::JobState;

/// Records every job it sees, in call order, and succeeds.
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct SpyProcessor {
    seen: Arc<Mutex<Vec<JobState>>>,
    delay: Option<Duration>,
}

impl SpyProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before returning from each call.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn jobs(&self) -> Vec<JobState> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn ids(&self) -> Vec<String> {
        self.jobs().into_iter().map(|job| job.id).collect()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.jobs().into_iter().map(|job| job.payload).collect()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Processor for SpyProcessor {
    async fn process(&self, job: &JobState) -> Result<(), BoxError> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay.to_std()).await;
        }
        Ok(())
    }
}

/// Error whose message is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentError;

impl fmt::Display for SilentError {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

impl std::error::Error for SilentError {}

/// Fails every call.
#[derive(Debug, Clone, Default)]
pub struct FailingProcessor {
    message: Option<String>,
}

impl FailingProcessor {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Fails with an error that carries no message.
    pub fn without_message() -> Self {
        Self { message: None }
    }
}

#[async_trait]
impl Processor for FailingProcessor {
    async fn process(&self, _job: &JobState) -> Result<(), BoxError> {
        match &self.message {
            Some(message) => Err(message.clone().into()),
            None => Err(Box::new(SilentError)),
        }
    }
}

/// Fails the first `failures` calls, then succeeds.
#[derive(Debug, Clone)]
pub struct FlakyProcessor {
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl FlakyProcessor {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Processor for FlakyProcessor {
    async fn process(&self, _job: &JobState) -> Result<(), BoxError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(format!("attempt {} failed", call + 1).into())
        } else {
            Ok(())
        }
    }
}
