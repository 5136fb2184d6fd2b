use hopper_core::{BuiltJob, Job, JobSpec, SharedClock};
use hopper_db::Pool;
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::info;

use crate::error::PostgresError;
use crate::row::JobRecord;

/// Inserts a batch of jobs atomically.
///
/// Jobs are written in chunks to stay under the bind-parameter ceiling of the
/// wire protocol; every chunk of one call shares a single transaction.
#[derive(Debug, Clone)]
pub struct AddJobsCommand {
    queue_name: String,
    chunk_size: usize,
    clock: SharedClock,
}

impl AddJobsCommand {
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;

    pub fn new(queue_name: impl Into<String>, clock: SharedClock) -> Self {
        Self {
            queue_name: queue_name.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            clock,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn execute(&self, pool: &Pool, specs: Vec<JobSpec>) -> Result<Vec<BuiltJob>, PostgresError> {
        if specs.is_empty() {
            return Ok(Vec::new());
        }

        let records = specs
            .into_iter()
            .map(|spec| {
                Job::from_spec(spec, &self.queue_name, self.clock.clone())
                    .map(|job| JobRecord::from(job.into_state()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let built: Vec<BuiltJob> = records
            .iter()
            .map(|record| BuiltJob {
                id: record.id.clone(),
            })
            .collect();

        let chunk_size = self.chunk_size;
        pool.transaction(move |conn| {
            Box::pin(async move {
                for chunk in records.chunks(chunk_size) {
                    insert_chunk(&mut *conn, chunk).await?;
                }
                Ok::<_, PostgresError>(())
            })
        })
        .await?;

        info!(queue = %self.queue_name, count = built.len(), "jobs added");
        Ok(built)
    }
}

async fn insert_chunk(conn: &mut PgConnection, chunk: &[JobRecord]) -> Result<(), sqlx::Error> {
    let mut query = QueryBuilder::<Postgres>::new(
        "INSERT INTO jobs (id, queue_name, worker_id, attempts_max, attempts_done, priority, \
         data, status, backoff, schedule, created_at, started_at, scheduled_at, updated_at, \
         finished_at, failure_reason) ",
    );
    query.push_values(chunk, |mut row, job| {
        row.push_bind(job.id.clone())
            .push_bind(job.queue_name.clone())
            .push_bind(job.worker_id.clone())
            .push_bind(job.attempts_max)
            .push_bind(job.attempts_done)
            .push_bind(job.priority)
            .push_bind(job.data.clone())
            .push_bind(job.status)
            .push_bind(job.backoff.clone())
            .push_bind(job.schedule.clone())
            .push_bind(job.created_at)
            .push_bind(job.started_at)
            .push_bind(job.scheduled_at)
            .push_bind(job.updated_at)
            .push_bind(job.finished_at)
            .push_bind(job.failure_reason.clone());
    });
    query.build().execute(conn).await?;
    Ok(())
}
