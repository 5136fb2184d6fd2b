use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use hopper_core::{
    dispatch_order, execute, storage_order, worker_id, BuiltJob, Dispatcher, Job, JobSpec,
    JobState, Looper, LooperSlot, Processor, Queue, QueueError, Runnable, SharedClock,
};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

struct Inner {
    name: String,
    worker_id: String,
    clock: SharedClock,
    jobs: RwLock<Vec<JobState>>,
    dispatcher: Dispatcher,
}

/// A queue whose jobs live in process memory.
pub struct MemoryQueue {
    inner: Arc<Inner>,
    looper: LooperSlot,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, looper: Box<dyn Looper>, clock: SharedClock) -> Self {
        let inner = Arc::new(Inner {
            name: name.into(),
            worker_id: worker_id(),
            clock,
            jobs: RwLock::new(Vec::new()),
            dispatcher: Dispatcher::new(),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let runnable: Runnable = Arc::new(move || {
            let inner = weak.upgrade();
            async move {
                match inner {
                    Some(inner) => inner.tick().await,
                    None => Ok(()),
                }
            }
            .boxed()
        });

        Self {
            inner,
            looper: LooperSlot::new(looper, runnable),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// Every job in storage order.
    pub async fn snapshot(&self) -> Vec<JobState> {
        self.inner.jobs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Inner {
    /// Claim every eligible job, then process each one in its own task.
    async fn tick(self: Arc<Self>) -> Result<(), QueueError> {
        let processor = self.dispatcher.processor(&self.name)?;
        let now = self.clock.now();

        let claimed = {
            let mut jobs = self.jobs.write().await;
            let mut eligible: Vec<usize> = (0..jobs.len())
                .filter(|&index| jobs[index].is_eligible(now))
                .collect();
            eligible.sort_by(|&a, &b| dispatch_order(&jobs[a], &jobs[b]));

            let mut claimed = Vec::with_capacity(eligible.len());
            for index in eligible {
                let mut job = Job::from_state(jobs[index].clone(), self.clock.clone());
                job.acquire(&self.worker_id)?;
                jobs[index] = job.state().clone();
                claimed.push(job);
            }
            claimed
        };

        if claimed.is_empty() {
            return Ok(());
        }
        debug!(queue = %self.name, count = claimed.len(), "claimed jobs");

        for job in claimed {
            let inner = Arc::clone(&self);
            let processor = Arc::clone(&processor);
            self.dispatcher
                .spawn(async move { inner.run(processor, job).await });
        }
        Ok(())
    }

    async fn run(&self, processor: Arc<dyn Processor>, mut job: Job) {
        if let Err(error) = execute(processor.as_ref(), &mut job).await {
            error!(queue = %self.name, job_id = %job.id, %error, "could not apply job outcome");
        }
        job.release();

        let state = job.into_state();
        let mut jobs = self.jobs.write().await;
        match jobs.iter_mut().find(|stored| stored.id == state.id) {
            Some(stored) => *stored = state,
            None => error!(queue = %self.name, job_id = %state.id, "processed job vanished from queue"),
        }
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn add_job_specs(&self, specs: Vec<JobSpec>) -> Result<Vec<BuiltJob>, QueueError> {
        let mut jobs = self.inner.jobs.write().await;

        let mut ids: HashSet<String> = jobs.iter().map(|job| job.id.clone()).collect();
        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let job = Job::from_spec(spec, &self.inner.name, self.inner.clock.clone())?;
            if !ids.insert(job.id.clone()) {
                return Err(QueueError::InvalidSpec(format!(
                    "job id {} already exists",
                    job.id
                )));
            }
            created.push(job.into_state());
        }

        let built: Vec<BuiltJob> = created
            .iter()
            .map(|job| BuiltJob { id: job.id.clone() })
            .collect();
        jobs.extend(created);
        jobs.sort_by(storage_order);

        info!(queue = %self.inner.name, count = built.len(), "jobs added");
        Ok(built)
    }

    async fn read_job(&self, id: &str) -> Result<Option<JobState>, QueueError> {
        let jobs = self.inner.jobs.read().await;
        Ok(jobs.iter().find(|job| job.id == id).cloned())
    }

    fn set_processor(&self, processor: Arc<dyn Processor>) {
        self.inner.dispatcher.set_processor(processor);
    }

    async fn set_looper(&self, looper: Box<dyn Looper>) {
        self.looper.replace(looper).await;
    }

    async fn start_processing(&self) -> Result<(), QueueError> {
        self.inner.dispatcher.processor(&self.inner.name)?;
        self.looper.start().await;
        info!(queue = %self.inner.name, worker_id = %self.inner.worker_id, "processing started");
        Ok(())
    }

    async fn stop_processing(&self) {
        self.looper.stop().await;
        self.inner.dispatcher.drain().await;
        info!(queue = %self.inner.name, "processing stopped");
    }

    async fn drain(&self) {
        self.inner.dispatcher.drain().await;
    }
}
