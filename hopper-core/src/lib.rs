//! Job lifecycle, scheduling strategies and queue contracts for hopper.
//!
//! This crate holds everything a queue backend needs that does not depend on
//! where jobs are stored. Backends live in `hopper-memory` and
//! `hopper-postgres`.
//!
//! # Architecture
//!
//! - [`Job`] - The lifecycle state machine over a persisted [`JobState`]
//! - [`ScheduleStrategy`] / [`BackoffStrategy`] - When a job runs, and when it is retried
//! - [`Catalog`] - Turns serialized strategies back into strategy objects
//! - [`Queue`] / [`Driver`] - The backend contract
//! - [`Processor`] - Trait for implementing job handlers
//! - [`Looper`] - Drives dispatch ticks ([`TimeoutLooper`], [`StepLooper`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hopper_core::{async_trait, BoxError, Driver, JobState, Processor, QueueError};
//! use serde_json::json;
//!
//! struct SendEmail;
//!
//! #[async_trait]
//! impl Processor for SendEmail {
//!     async fn process(&self, job: &JobState) -> Result<(), BoxError> {
//!         println!("sending {}", job.payload);
//!         Ok(())
//!     }
//! }
//!
//! async fn run(driver: &dyn Driver) -> Result<(), QueueError> {
//!     let queue = driver.create_queue("emails").await?;
//!     queue.set_processor(Arc::new(SendEmail));
//!
//!     let built = queue
//!         .create_job(json!({ "to": "someone@example.com" }))
//!         .attempts(3)
//!         .save(queue.as_ref())
//!         .await?;
//!
//!     queue.start_processing().await?;
//!     // ...
//!     queue.stop_processing().await;
//!     println!("{:?}", queue.read_job(&built.id).await?);
//!     Ok(())
//! }
//! ```

mod backoff;
mod builder;
mod catalog;
mod clock;
mod dispatch;
mod duration;
mod error;
mod job;
mod looper;
mod processor;
mod queue;
mod schedule;
pub mod testing;
mod types;

pub use backoff::{
    AsapBackoff, BackoffCatalog, BackoffStrategy, ExponentialBackoff, FixedBackoff, LinearBackoff,
};
pub use builder::{JobBuilder, JobSpec};
pub use catalog::{has_type_tag, Catalog, Deserializable, Lookup, StrategyCatalogs};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use dispatch::{execute, Dispatcher};
pub use duration::Duration;
pub use error::{BoxError, CatalogError, JobError, QueueError, StrategyError};
pub use job::{Job, UNKNOWN_FAILURE};
pub use looper::{Looper, LooperSlot, Runnable, StepLooper, Tick, TimeoutLooper};
pub use processor::{processor_fn, FnProcessor, Processor};
pub use queue::{Driver, Queue};
pub use schedule::{AsapSchedule, CronSchedule, DelaySchedule, ScheduleCatalog, ScheduleStrategy};
pub use types::{dispatch_order, storage_order, BuiltJob, JobStatus, JobState, UnknownStatus};

// Re-export async_trait for convenience when implementing Processor
pub use async_trait::async_trait;

/// Generate a random worker identifier.
pub fn worker_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
