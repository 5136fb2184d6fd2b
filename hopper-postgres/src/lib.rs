//! PostgreSQL backend for hopper.
//!
//! Any number of worker processes may point a [`PostgresQueue`] with the same
//! name at one database. Claims take row locks with `FOR UPDATE SKIP LOCKED`,
//! so a waiting job is handed to exactly one worker. A [`Limiter`] bounds how
//! many jobs a worker claims per tick; [`WindowLimiter`] spreads a per-minute
//! budget across the workers that have sent a recent heartbeat.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hopper_core::{processor_fn, JobBuilder, Queue};
//! use hopper_db::{DbConnectionConfig, Pool};
//! use hopper_postgres::PostgresDriver;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::connect(&DbConnectionConfig::from_env("HOPPER")?).await?;
//! let driver = PostgresDriver::new(pool);
//! driver.scaffold().await?;
//!
//! let queue = driver.queue("emails").await?;
//! queue.set_processor(Arc::new(processor_fn(|job| async move {
//!     println!("sending {}", job.payload);
//!     Ok(())
//! })));
//! JobBuilder::new(serde_json::json!({ "to": "someone@example.com" }))
//!     .save(&queue)
//!     .await?;
//! queue.start_processing().await?;
//! # Ok(())
//! # }
//! ```

mod command;
mod driver;
mod error;
mod limiter;
mod queries;
mod queue;
mod row;

pub use command::AddJobsCommand;
pub use driver::{PostgresDriver, DEFAULT_BATCH_SIZE};
pub use error::PostgresError;
pub use limiter::{allowance, LimitContext, Limiter, UnboundedLimiter, WindowLimiter};
pub use queue::PostgresQueue;
pub use row::{JobRecord, JobRow};
