//! How many jobs a worker may claim per tick.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use sqlx::PgConnection;
use tracing::debug;

use crate::queries;

/// What a limiter knows about the claim it is asked to bound.
#[derive(Debug, Clone, Copy)]
pub struct LimitContext<'a> {
    pub queue_name: &'a str,
    pub worker_id: &'a str,
    /// How many jobs the worker would like to claim.
    pub desired: u32,
    pub now: DateTime<Utc>,
}

/// Bounds the number of jobs claimed per tick. Runs inside the claim
/// transaction, so it sees the same snapshot the claim will.
#[async_trait]
pub trait Limiter: Send + Sync + fmt::Debug {
    async fn jobs_to_fetch(
        &self,
        context: LimitContext<'_>,
        conn: &mut PgConnection,
    ) -> Result<u32, sqlx::Error>;
}

/// Always grants the desired count.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundedLimiter;

#[async_trait]
impl Limiter for UnboundedLimiter {
    async fn jobs_to_fetch(
        &self,
        context: LimitContext<'_>,
        _conn: &mut PgConnection,
    ) -> Result<u32, sqlx::Error> {
        Ok(context.desired)
    }
}

/// Shares a per-minute budget evenly between the live workers.
///
/// The window is the calendar minute containing `now`. Workers are live when
/// their heartbeat is newer than `heartbeat_seconds`. With no coordination
/// beyond heartbeats the split is approximate while workers come and go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLimiter {
    max: u32,
    every_seconds: u32,
    heartbeat_seconds: u32,
}

impl WindowLimiter {
    pub const DEFAULT_HEARTBEAT_SECONDS: u32 = 120;

    /// At most `max` jobs every `every_seconds` seconds.
    pub fn new(max: u32, every_seconds: u32) -> Self {
        Self {
            max,
            every_seconds: every_seconds.max(1),
            heartbeat_seconds: Self::DEFAULT_HEARTBEAT_SECONDS,
        }
    }

    pub fn with_heartbeat_seconds(mut self, seconds: u32) -> Self {
        self.heartbeat_seconds = seconds;
        self
    }

    pub fn jobs_per_minute(&self) -> f64 {
        f64::from(self.max) / (f64::from(self.every_seconds) / 60.0)
    }

    /// `[start, end)` of the minute containing `now`.
    pub fn window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let minute = TimeDelta::minutes(1);
        let start = now.duration_trunc(minute).unwrap_or(now);
        (start, start + minute)
    }
}

/// Jobs a worker may claim given the budget and what already happened.
///
/// A fractional budget still admits a job while fewer jobs than the budget
/// have completed this minute, so budgets below one job per minute run.
pub fn allowance(desired: u32, jobs_per_minute: f64, live_workers: i64, completed: i64) -> u32 {
    let live = live_workers.max(1) as f64;
    let per_worker = (jobs_per_minute / live).ceil();
    let remaining = (jobs_per_minute - completed as f64).ceil();

    let granted = per_worker.min(remaining).min(f64::from(desired));
    if granted <= 0.0 {
        0
    } else {
        granted as u32
    }
}

#[async_trait]
impl Limiter for WindowLimiter {
    async fn jobs_to_fetch(
        &self,
        context: LimitContext<'_>,
        conn: &mut PgConnection,
    ) -> Result<u32, sqlx::Error> {
        let since = context.now - TimeDelta::seconds(i64::from(self.heartbeat_seconds));
        let live = queries::workers::count_live(&mut *conn, since).await?;

        let (start, end) = Self::window(context.now);
        let completed =
            queries::jobs::count_completed_between(&mut *conn, context.queue_name, start, end)
                .await?;

        let granted = allowance(context.desired, self.jobs_per_minute(), live, completed);
        debug!(
            queue = %context.queue_name,
            worker_id = %context.worker_id,
            live_workers = live,
            completed,
            granted,
            "rate limit applied"
        );
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_normalised_to_a_minute() {
        assert_eq!(WindowLimiter::new(10, 10).jobs_per_minute(), 60.0);
        assert_eq!(WindowLimiter::new(4, 60).jobs_per_minute(), 4.0);
        assert_eq!(WindowLimiter::new(30, 120).jobs_per_minute(), 15.0);
    }

    #[test]
    fn budget_is_split_between_live_workers() {
        assert_eq!(allowance(100, 4.0, 2, 0), 2);
        assert_eq!(allowance(100, 5.0, 2, 0), 3);
        assert_eq!(allowance(100, 60.0, 1, 0), 60);
    }

    #[test]
    fn completed_jobs_consume_the_budget() {
        assert_eq!(allowance(100, 4.0, 1, 3), 1);
        assert_eq!(allowance(100, 4.0, 1, 4), 0);
        assert_eq!(allowance(100, 4.0, 1, 9), 0);
    }

    #[test]
    fn fractional_budgets_still_admit_jobs() {
        let half_per_minute = WindowLimiter::new(1, 120).jobs_per_minute();
        assert_eq!(half_per_minute, 0.5);
        assert_eq!(allowance(100, half_per_minute, 1, 0), 1);
        assert_eq!(allowance(100, half_per_minute, 3, 0), 1);
        assert_eq!(allowance(100, half_per_minute, 1, 1), 0);

        assert_eq!(allowance(100, 2.5, 1, 2), 1);
        assert_eq!(allowance(100, 2.5, 1, 3), 0);
    }

    #[test]
    fn never_grants_more_than_desired() {
        assert_eq!(allowance(3, 60.0, 1, 0), 3);
        assert_eq!(allowance(0, 60.0, 1, 0), 0);
    }

    #[test]
    fn no_live_worker_counts_as_one() {
        assert_eq!(allowance(100, 10.0, 0, 0), 10);
    }

    #[test]
    fn window_is_the_current_minute() {
        let now: DateTime<Utc> = "2025-03-04T10:20:37.250Z".parse().unwrap();
        let (start, end) = WindowLimiter::window(now);
        assert_eq!(start, "2025-03-04T10:20:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(end, "2025-03-04T10:21:00Z".parse::<DateTime<Utc>>().unwrap());
    }
}
