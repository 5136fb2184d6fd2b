//! Strategies deciding when a failed job is retried.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::{Catalog, Deserializable};
use crate::duration::Duration;

/// Strategy computing the next eligible run time after a failed attempt.
pub trait BackoffStrategy: fmt::Debug + Send + Sync {
    /// Data written to storage; must be accepted by the matching decoder.
    fn serialize(&self) -> Value;

    /// `attempts_done` already counts the attempt that just failed.
    fn schedule_for(
        &self,
        now: DateTime<Utc>,
        attempts_done: u32,
        attempts_max: u32,
    ) -> DateTime<Utc>;

    fn clone_box(&self) -> Box<dyn BackoffStrategy>;
}

impl Clone for Box<dyn BackoffStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

pub type BackoffCatalog = Catalog<dyn BackoffStrategy>;

impl Catalog<dyn BackoffStrategy> {
    /// Catalog preloaded with the built-in backoffs.
    pub fn backoffs() -> Self {
        let catalog = Self::empty("backoff");
        catalog.register::<AsapBackoff>();
        catalog.register::<FixedBackoff>();
        catalog.register::<LinearBackoff>();
        catalog.register::<ExponentialBackoff>();
        catalog
    }
}

impl Default for Catalog<dyn BackoffStrategy> {
    fn default() -> Self {
        Self::backoffs()
    }
}

#[derive(Deserialize)]
struct IncrementData {
    ms: i64,
}

fn decode_increment(data: &Value) -> Result<Duration, serde_json::Error> {
    IncrementData::deserialize(data).map(|data| Duration::milliseconds(data.ms))
}

/// Retry immediately.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AsapBackoff;

impl BackoffStrategy for AsapBackoff {
    fn serialize(&self) -> Value {
        Value::Null
    }

    fn schedule_for(&self, now: DateTime<Utc>, _: u32, _: u32) -> DateTime<Utc> {
        now
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(*self)
    }
}

impl Deserializable<dyn BackoffStrategy> for AsapBackoff {
    const KIND: &'static str = "asap";

    fn deserializable(data: &Value) -> bool {
        data.is_null()
    }

    fn deserialize(_data: &Value) -> Result<Box<dyn BackoffStrategy>, serde_json::Error> {
        Ok(Box::new(AsapBackoff))
    }
}

/// Retry after the same delay every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for FixedBackoff {
    fn serialize(&self) -> Value {
        json!({
            "type": <Self as Deserializable<dyn BackoffStrategy>>::KIND,
            "ms": self.delay.as_millis(),
        })
    }

    fn schedule_for(&self, now: DateTime<Utc>, _: u32, _: u32) -> DateTime<Utc> {
        self.delay.add_to(now)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(*self)
    }
}

impl Deserializable<dyn BackoffStrategy> for FixedBackoff {
    const KIND: &'static str = "fixed";

    fn deserialize(data: &Value) -> Result<Box<dyn BackoffStrategy>, serde_json::Error> {
        Ok(Box::new(Self::new(decode_increment(data)?)))
    }
}

/// Retry after `increment * attempts_done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    increment: Duration,
}

impl LinearBackoff {
    pub const fn new(increment: Duration) -> Self {
        Self { increment }
    }
}

impl BackoffStrategy for LinearBackoff {
    fn serialize(&self) -> Value {
        json!({
            "type": <Self as Deserializable<dyn BackoffStrategy>>::KIND,
            "ms": self.increment.as_millis(),
        })
    }

    fn schedule_for(&self, now: DateTime<Utc>, attempts_done: u32, _: u32) -> DateTime<Utc> {
        self.increment
            .multiplied_by(f64::from(attempts_done))
            .add_to(now)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(*self)
    }
}

impl Deserializable<dyn BackoffStrategy> for LinearBackoff {
    const KIND: &'static str = "linear";

    fn deserialize(data: &Value) -> Result<Box<dyn BackoffStrategy>, serde_json::Error> {
        Ok(Box::new(Self::new(decode_increment(data)?)))
    }
}

/// Retry after `increment * 2^(attempts_done - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    increment: Duration,
}

impl ExponentialBackoff {
    pub const fn new(increment: Duration) -> Self {
        Self { increment }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn serialize(&self) -> Value {
        json!({
            "type": <Self as Deserializable<dyn BackoffStrategy>>::KIND,
            "ms": self.increment.as_millis(),
        })
    }

    fn schedule_for(&self, now: DateTime<Utc>, attempts_done: u32, _: u32) -> DateTime<Utc> {
        let exponent = i32::try_from(attempts_done).unwrap_or(i32::MAX).saturating_sub(1);
        self.increment
            .multiplied_by(2f64.powi(exponent))
            .add_to(now)
    }

    fn clone_box(&self) -> Box<dyn BackoffStrategy> {
        Box::new(*self)
    }
}

impl Deserializable<dyn BackoffStrategy> for ExponentialBackoff {
    const KIND: &'static str = "exponential";

    fn deserialize(data: &Value) -> Result<Box<dyn BackoffStrategy>, serde_json::Error> {
        Ok(Box::new(Self::new(decode_increment(data)?)))
    }
}
