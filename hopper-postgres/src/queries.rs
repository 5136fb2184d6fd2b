// Queries issued by the PostgreSQL backend.
// Each function takes any executor so it can run on a pooled connection or
// inside a transaction.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Postgres};

pub mod job_queues {
    use super::*;

    pub async fn upsert<'e, E>(executor: E, name: &str, now: DateTime<Utc>) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO job_queues (name, created_at)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(name)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(())
    }
}

pub mod workers {
    use super::*;

    /// Register the worker, or refresh its heartbeat when it already exists.
    pub async fn heartbeat<'e, E>(executor: E, worker_id: &str, now: DateTime<Utc>) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO workers (id, created_at, heartbeat)
            VALUES ($1, $2, $2)
            ON CONFLICT (id) DO UPDATE SET heartbeat = EXCLUDED.heartbeat
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn count_live<'e, E>(executor: E, since: DateTime<Utc>) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM workers WHERE heartbeat > $1")
            .bind(since)
            .fetch_one(executor)
            .await
    }
}

pub mod jobs {
    use super::*;
    use crate::row::{JobRecord, JobRow, JOB_COLUMNS};

    pub async fn find_by_id<'e, E>(executor: E, queue_name: &str, id: &str) -> Result<Option<JobRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE queue_name = $1 AND id = $2");
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(queue_name)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Lock up to `limit` eligible rows, skipping rows other workers hold.
    pub async fn lock_eligible<'e, E>(
        executor: E,
        queue_name: &str,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<JobRow>, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE queue_name = $1 AND status = 'waiting' AND scheduled_at <= $2
            ORDER BY priority DESC, scheduled_at ASC, created_at ASC, seq ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
            "#
        );
        sqlx::query_as::<_, JobRow>(&sql)
            .bind(queue_name)
            .bind(now)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    pub async fn mark_claimed<'e, E>(
        executor: E,
        ids: &[String],
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'processing',
                worker_id = $1,
                started_at = $2,
                updated_at = $2
            WHERE id = ANY($3)
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .bind(ids)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Flush every mutable column of a job.
    pub async fn save<'e, E>(executor: E, job: &JobRecord) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET worker_id = $1,
                attempts_max = $2,
                attempts_done = $3,
                priority = $4,
                data = $5,
                status = $6,
                backoff = $7,
                schedule = $8,
                started_at = $9,
                scheduled_at = $10,
                updated_at = $11,
                finished_at = $12,
                failure_reason = $13
            WHERE id = $14 AND queue_name = $15
            "#,
        )
        .bind(&job.worker_id)
        .bind(job.attempts_max)
        .bind(job.attempts_done)
        .bind(job.priority)
        .bind(&job.data)
        .bind(job.status)
        .bind(&job.backoff)
        .bind(&job.schedule)
        .bind(job.started_at)
        .bind(job.scheduled_at)
        .bind(job.updated_at)
        .bind(job.finished_at)
        .bind(&job.failure_reason)
        .bind(&job.id)
        .bind(&job.queue_name)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Jobs of `queue_name` that finished as completed in `[start, end)`.
    pub async fn count_completed_between<'e, E>(
        executor: E,
        queue_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM jobs
            WHERE queue_name = $1
              AND status = 'completed'
              AND finished_at >= $2
              AND finished_at < $3
            "#,
        )
        .bind(queue_name)
        .bind(start)
        .bind(end)
        .fetch_one(executor)
        .await
    }
}
