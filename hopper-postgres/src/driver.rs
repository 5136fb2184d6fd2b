use std::sync::Arc;

use async_trait::async_trait;
use hopper_core::{
    Driver, Looper, Queue, QueueError, SharedClock, StrategyCatalogs, SystemClock, TimeoutLooper,
};
use hopper_db::Pool;
use tracing::info;

use crate::command::AddJobsCommand;
use crate::error::PostgresError;
use crate::limiter::{Limiter, UnboundedLimiter};
use crate::queue::{PostgresQueue, QueueSettings};

/// Jobs claimed per tick unless a limiter says otherwise.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Creates [`PostgresQueue`]s that share one connection pool.
#[derive(Debug)]
pub struct PostgresDriver {
    settings: QueueSettings,
    looper: Box<dyn Looper>,
}

impl PostgresDriver {
    pub fn new(pool: Pool) -> Self {
        Self {
            settings: QueueSettings {
                pool,
                clock: Arc::new(SystemClock),
                catalogs: StrategyCatalogs::default(),
                limiter: Arc::new(UnboundedLimiter),
                batch_size: DEFAULT_BATCH_SIZE,
                chunk_size: AddJobsCommand::DEFAULT_CHUNK_SIZE,
            },
            looper: Box::new(TimeoutLooper::default()),
        }
    }

    /// Looper cloned into every queue created afterwards.
    pub fn with_looper(mut self, looper: Box<dyn Looper>) -> Self {
        self.looper = looper;
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.settings.clock = clock;
        self
    }

    pub fn with_catalogs(mut self, catalogs: StrategyCatalogs) -> Self {
        self.settings.catalogs = catalogs;
        self
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn Limiter>) -> Self {
        self.settings.limiter = limiter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.settings.batch_size = batch_size.max(1);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.settings.chunk_size = chunk_size.max(1);
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.settings.pool
    }

    /// Create the job tables. Safe to call repeatedly.
    pub async fn scaffold(&self) -> Result<(), PostgresError> {
        hopper_migrations::scaffold(self.settings.pool.pg()).await?;
        Ok(())
    }

    /// Delete every queue, job and worker row.
    pub async fn purge(&self) -> Result<(), PostgresError> {
        hopper_migrations::truncate(self.settings.pool.pg()).await?;
        info!("job tables purged");
        Ok(())
    }

    pub async fn drop_schema(&self) -> Result<(), PostgresError> {
        hopper_migrations::drop_schema(self.settings.pool.pg()).await?;
        info!("job tables dropped");
        Ok(())
    }

    pub async fn close(&self) {
        self.settings.pool.close().await;
    }

    /// Register a queue and a fresh worker for it.
    pub async fn queue(&self, name: &str) -> Result<PostgresQueue, QueueError> {
        PostgresQueue::open(name, self.settings.clone(), self.looper.clone_box()).await
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    async fn create_queue(&self, name: &str) -> Result<Arc<dyn Queue>, QueueError> {
        Ok(Arc::new(self.queue(name).await?))
    }
}
