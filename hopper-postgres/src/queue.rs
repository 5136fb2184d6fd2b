use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use hopper_core::{
    execute, worker_id, BuiltJob, Dispatcher, Job, JobSpec, JobState, Looper, LooperSlot,
    Processor, Queue, QueueError, Runnable, SharedClock, StrategyCatalogs,
};
use hopper_db::Pool;
use sqlx::PgConnection;
use tracing::{debug, error, info, instrument};

use crate::command::AddJobsCommand;
use crate::error::PostgresError;
use crate::limiter::{LimitContext, Limiter};
use crate::queries;
use crate::row::JobRecord;

/// Everything a [`PostgresQueue`] needs besides its name.
#[derive(Debug, Clone)]
pub(crate) struct QueueSettings {
    pub pool: Pool,
    pub clock: SharedClock,
    pub catalogs: StrategyCatalogs,
    pub limiter: Arc<dyn Limiter>,
    pub batch_size: u32,
    pub chunk_size: usize,
}

struct Inner {
    name: String,
    worker_id: String,
    settings: QueueSettings,
    dispatcher: Dispatcher,
    lost_outcomes: AtomicU64,
}

/// A durable queue shared by any number of workers.
///
/// Each tick claims eligible rows with `FOR UPDATE SKIP LOCKED` in one short
/// transaction, then processes and persists every job in its own task and
/// transaction. No transaction is open while a processor runs.
pub struct PostgresQueue {
    inner: Arc<Inner>,
    looper: LooperSlot,
}

impl PostgresQueue {
    /// Register the queue and this worker, then return the queue.
    #[instrument(skip_all, fields(queue = %name))]
    pub(crate) async fn open(
        name: &str,
        settings: QueueSettings,
        looper: Box<dyn Looper>,
    ) -> Result<Self, QueueError> {
        let inner = Arc::new(Inner {
            name: name.to_string(),
            worker_id: worker_id(),
            settings,
            dispatcher: Dispatcher::new(),
            lost_outcomes: AtomicU64::new(0),
        });

        let registering = Arc::clone(&inner);
        inner
            .settings
            .pool
            .transaction(move |conn| {
                Box::pin(async move {
                    let now = registering.settings.clock.now();
                    queries::job_queues::upsert(&mut *conn, &registering.name, now).await?;
                    queries::workers::heartbeat(&mut *conn, &registering.worker_id, now).await?;
                    Ok::<_, PostgresError>(())
                })
            })
            .await?;
        info!(worker_id = %inner.worker_id, "queue registered");

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

        Ok(Self {
            inner,
            looper: LooperSlot::new(looper, runnable),
        })
    }

    pub fn worker_id(&self) -> &str {
        &self.inner.worker_id
    }

    /// Processed jobs whose outcome could not be written back.
    ///
    /// Such rows stay `processing` with `worker_id` set to [`Self::worker_id`].
    pub fn lost_outcomes(&self) -> u64 {
        self.inner.lost_outcomes.load(Ordering::Relaxed)
    }
}

impl Inner {
    async fn tick(self: Arc<Self>) -> Result<(), QueueError> {
        let processor = self.dispatcher.processor(&self.name)?;

        let claiming = Arc::clone(&self);
        let claimed = self
            .settings
            .pool
            .transaction(move |conn| Box::pin(async move { claiming.claim(conn).await }))
            .await?;

        if claimed.is_empty() {
            return Ok(());
        }
        debug!(queue = %self.name, worker_id = %self.worker_id, count = claimed.len(), "claimed jobs");

        for job in claimed {
            let inner = Arc::clone(&self);
            let processor = Arc::clone(&processor);
            self.dispatcher
                .spawn(async move { inner.run(processor, job).await });
        }
        Ok(())
    }

    /// Heartbeat, ask the limiter, then lock and claim eligible rows.
    async fn claim(&self, conn: &mut PgConnection) -> Result<Vec<Job>, PostgresError> {
        let now = self.settings.clock.now();
        queries::workers::heartbeat(&mut *conn, &self.worker_id, now).await?;

        let context = LimitContext {
            queue_name: &self.name,
            worker_id: &self.worker_id,
            desired: self.settings.batch_size,
            now,
        };
        let limit = self.settings.limiter.jobs_to_fetch(context, &mut *conn).await?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = queries::jobs::lock_eligible(&mut *conn, &self.name, now, i64::from(limit)).await?;
        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let state = row.into_state(&self.settings.catalogs)?;
            let mut job = Job::from_state(state, self.settings.clock.clone());
            job.acquire(&self.worker_id)?;
            jobs.push(job);
        }

        if !jobs.is_empty() {
            let ids: Vec<String> = jobs.iter().map(|job| job.id.clone()).collect();
            queries::jobs::mark_claimed(&mut *conn, &ids, &self.worker_id, now).await?;
        }
        Ok(jobs)
    }

    /// Process one claimed job and persist the outcome in its own transaction.
    ///
    /// Nothing awaits this task, so a failed save is logged and counted in
    /// `lost_outcomes` rather than returned.
    async fn run(self: Arc<Self>, processor: Arc<dyn Processor>, mut job: Job) {
        if let Err(error) = execute(processor.as_ref(), &mut job).await {
            error!(queue = %self.name, job_id = %job.id, %error, "could not apply job outcome");
        }
        job.release();

        let record = JobRecord::from(job.into_state());
        let job_id = record.id.clone();
        let saved = self
            .settings
            .pool
            .transaction(move |conn| {
                Box::pin(async move { queries::jobs::save(conn, &record).await })
            })
            .await;

        match saved {
            Ok(0) => {
                self.lost_outcomes.fetch_add(1, Ordering::Relaxed);
                error!(queue = %self.name, worker_id = %self.worker_id, %job_id, "processed job no longer exists");
            }
            Ok(_) => {}
            Err(error) => {
                self.lost_outcomes.fetch_add(1, Ordering::Relaxed);
                error!(queue = %self.name, worker_id = %self.worker_id, %job_id, %error, "could not persist job outcome");
            }
        }
    }
}

#[async_trait]
impl Queue for PostgresQueue {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn add_job_specs(&self, specs: Vec<JobSpec>) -> Result<Vec<BuiltJob>, QueueError> {
        let settings = &self.inner.settings;
        AddJobsCommand::new(self.inner.name.clone(), settings.clock.clone())
            .with_chunk_size(settings.chunk_size)
            .execute(&settings.pool, specs)
            .await
            .map_err(QueueError::from)
    }

    async fn read_job(&self, id: &str) -> Result<Option<JobState>, QueueError> {
        let name = self.inner.name.clone();
        let id = id.to_string();
        let row = self
            .inner
            .settings
            .pool
            .query(move |conn| {
                Box::pin(async move { queries::jobs::find_by_id(conn, &name, &id).await })
            })
            .await
            .map_err(QueueError::backend)?;

        row.map(|row| row.into_state(&self.inner.settings.catalogs))
            .transpose()
            .map_err(QueueError::from)
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
        info!(queue = %self.inner.name, worker_id = %self.inner.worker_id, "processing stopped");
    }

    async fn drain(&self) {
        self.inner.dispatcher.drain().await;
    }
}
