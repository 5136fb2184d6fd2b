//! Schema manager for the hopper PostgreSQL backend.
//!
//! The three tables (`job_queues`, `jobs`, `workers`) are created by embedded
//! sqlx migrations. Queue code only ever issues DML against them.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::PgPool;
use tracing::info;

pub static POSTGRES_MIGRATOR: Migrator = sqlx_macros::migrate!("src/migrations_postgres");

/// Tables owned by the schema, children first.
pub const TABLES: [&str; 3] = ["jobs", "job_queues", "workers"];

pub fn postgres_migrator() -> &'static Migrator {
    &POSTGRES_MIGRATOR
}

/// Create the tables and indexes. Safe to call repeatedly.
pub async fn scaffold(pool: &PgPool) -> Result<(), MigrateError> {
    POSTGRES_MIGRATOR.run(pool).await?;
    info!("job schema is up to date");
    Ok(())
}

/// Delete every row while keeping the tables.
pub async fn truncate(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for table in TABLES {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!("job tables truncated");
    Ok(())
}

/// Drop the tables along with the migration history, so `scaffold` starts over.
pub async fn drop_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for table in TABLES.iter().chain(&["_sqlx_migrations"]) {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!("job tables dropped");
    Ok(())
}
