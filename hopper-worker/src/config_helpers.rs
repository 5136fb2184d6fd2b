use std::sync::Arc;

use hopper_config::Config;
use hopper_core::{Duration, TimeoutLooper};
use hopper_db::DbConnectionConfig;
use hopper_postgres::{Limiter, UnboundedLimiter, WindowLimiter};

/// Build the pool settings. `validate_config` guarantees the URL is present.
pub fn database_config_from_config(cfg: &Config) -> DbConnectionConfig {
    let mut db = DbConnectionConfig::new(cfg.database.url.clone().unwrap_or_default());
    db.max_connections = cfg.database.max_connections;
    db.min_connections = cfg.database.min_connections;
    db.connect_timeout_secs = cfg.database.connect_timeout_secs;
    db
}

pub fn limiter_from_config(cfg: &Config) -> Arc<dyn Limiter> {
    let rl = &cfg.rate_limit;
    if rl.enabled {
        Arc::new(WindowLimiter::new(rl.max, rl.every_seconds).with_heartbeat_seconds(rl.heartbeat_seconds))
    } else {
        Arc::new(UnboundedLimiter)
    }
}

pub fn looper_from_config(cfg: &Config) -> TimeoutLooper {
    let ms = i64::try_from(cfg.worker.poll_interval_ms).unwrap_or(i64::MAX);
    TimeoutLooper::new(Duration::milliseconds(ms))
}
