//! PostgreSQL connection provider for hopper.
//!
//! Builds the shared pool from [`DbConnectionConfig`] and exposes it as a
//! [`Pool`] with scoped `transaction` / `query` primitives.

pub mod config;
pub mod error;
pub mod pool;
pub mod utils;

pub use config::DbConnectionConfig;
pub use error::DbConnectionError;
pub use pool::{create_pool, Pool};
pub use utils::sanitize_database_url;

pub use sqlx::postgres::{PgConnection, PgPool};
