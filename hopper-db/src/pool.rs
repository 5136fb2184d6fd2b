use futures::future::BoxFuture;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use crate::config::DbConnectionConfig;
use crate::error::DbConnectionError;
use crate::utils::sanitize_database_url;

/// Creates a PostgreSQL connection pool using the provided configuration.
pub async fn create_pool(config: &DbConnectionConfig) -> Result<PgPool, DbConnectionError> {
    config.validate()?;
    let url = config.url.trim();
    let display_url = sanitize_database_url(url);
    info!(
        database_url = %display_url,
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "creating database pool"
    );

    let mut opts = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(config.test_before_acquire);
    if let Some(idle) = config.idle_timeout() {
        opts = opts.idle_timeout(idle);
    }

    match opts.connect(url).await {
        Ok(pool) => Ok(pool),
        Err(error) => {
            warn!(database_url = %display_url, %error, "could not create database pool");
            Err(error.into())
        }
    }
}

/// Shared pool handing out connections for exactly one unit of work.
///
/// Connections are acquired when a closure starts and returned as soon as it
/// finishes, so callers never hold one across unrelated awaits.
///
/// ```rust,no_run
/// # async fn example(pool: hopper_db::Pool) -> Result<(), sqlx::Error> {
/// let count: i64 = pool
///     .transaction(|conn| {
///         Box::pin(async move {
///             sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
///                 .fetch_one(conn)
///                 .await
///         })
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pool {
    inner: PgPool,
}

impl Pool {
    pub fn new(inner: PgPool) -> Self {
        Self { inner }
    }

    pub async fn connect(config: &DbConnectionConfig) -> Result<Self, DbConnectionError> {
        create_pool(config).await.map(Self::new)
    }

    #[inline]
    pub fn pg(&self) -> &PgPool {
        &self.inner
    }

    /// Run `work` inside a transaction. Commits on `Ok`, rolls back on `Err`.
    pub async fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<sqlx::Error>,
    {
        let mut tx = self.inner.begin().await?;
        match work(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "transaction rollback failed");
                }
                debug!("transaction rolled back");
                Err(error)
            }
        }
    }

    /// Run `work` on a pooled connection outside any explicit transaction.
    pub async fn query<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<sqlx::Error>,
    {
        let mut conn = self.inner.acquire().await?;
        work(&mut *conn).await
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

impl From<PgPool> for Pool {
    fn from(inner: PgPool) -> Self {
        Self::new(inner)
    }
}
