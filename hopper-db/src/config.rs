use std::env::{self, VarError};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::DbConnectionError;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Settings for the shared PostgreSQL pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConnectionConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for DbConnectionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: Some(DEFAULT_IDLE_TIMEOUT_SECS),
            test_before_acquire: true,
        }
    }
}

impl DbConnectionConfig {
    #[inline]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Loads configuration from environment variables using the supplied prefix.
    ///
    /// Expected variables:
    /// - `{PREFIX}_DATABASE_URL` (required)
    /// - `{PREFIX}_DB_MAX_CONNECTIONS` (optional)
    /// - `{PREFIX}_DB_MIN_CONNECTIONS` (optional)
    /// - `{PREFIX}_DB_CONNECT_TIMEOUT_SECS` (optional)
    /// - `{PREFIX}_DB_IDLE_TIMEOUT_SECS` (optional, `0` disables it)
    /// - `{PREFIX}_DB_TEST_BEFORE_ACQUIRE` (optional, bool)
    pub fn from_env(prefix: &str) -> Result<Self, DbConnectionError> {
        let url_var = format!("{prefix}_DATABASE_URL");
        let url = read_var(&url_var)?.ok_or_else(|| DbConnectionError::MissingEnvVar(url_var))?;

        let mut config = Self::new(url);
        if let Some(max) = parse_number(&format!("{prefix}_DB_MAX_CONNECTIONS"))? {
            config.max_connections = max;
        }
        if let Some(min) = parse_number(&format!("{prefix}_DB_MIN_CONNECTIONS"))? {
            config.min_connections = min;
        }
        if let Some(secs) = parse_number(&format!("{prefix}_DB_CONNECT_TIMEOUT_SECS"))? {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = parse_number::<u64>(&format!("{prefix}_DB_IDLE_TIMEOUT_SECS"))? {
            config.idle_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(flag) = parse_bool(&format!("{prefix}_DB_TEST_BEFORE_ACQUIRE"))? {
            config.test_before_acquire = flag;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DbConnectionError> {
        if self.url.trim().is_empty() {
            return Err(DbConnectionError::EmptyDatabaseUrl);
        }
        if self.max_connections == 0 {
            return Err(DbConnectionError::InvalidPoolSetting {
                setting: "max_connections",
                reason: "must be greater than 0",
            });
        }
        if self.min_connections > self.max_connections {
            return Err(DbConnectionError::InvalidPoolSetting {
                setting: "min_connections",
                reason: "must not exceed max_connections",
            });
        }
        Ok(())
    }

    #[inline]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[inline]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

/// Trimmed value of `var`; blank counts as unset.
fn read_var(var: &str) -> Result<Option<String>, DbConnectionError> {
    match env::var(var) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_owned())),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(DbConnectionError::InvalidUnicode(var.to_owned())),
    }
}

fn parse_number<T>(var: &str) -> Result<Option<T>, DbConnectionError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    read_var(var)?
        .map(|raw| {
            raw.parse().map_err(|source| DbConnectionError::InvalidNumber {
                var: var.to_owned(),
                source,
            })
        })
        .transpose()
}

fn parse_bool(var: &str) -> Result<Option<bool>, DbConnectionError> {
    let Some(raw) = read_var(var)? else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(DbConnectionError::InvalidBoolean {
            var: var.to_owned(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DbConnectionConfig::new("postgres://localhost/hopper");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation() {
        assert!(matches!(
            DbConnectionConfig::new("  ").validate(),
            Err(DbConnectionError::EmptyDatabaseUrl)
        ));

        let config = DbConnectionConfig {
            max_connections: 2,
            min_connections: 3,
            ..DbConnectionConfig::new("postgres://localhost/hopper")
        };
        assert!(matches!(
            config.validate(),
            Err(DbConnectionError::InvalidPoolSetting { setting: "min_connections", .. })
        ));
    }

    #[test]
    fn reads_prefixed_environment() {
        // Unique prefix so parallel tests never share variables.
        let prefix = "HOPPER_DB_CONFIG_TEST";
        env::set_var(format!("{prefix}_DATABASE_URL"), " postgres://db/jobs ");
        env::set_var(format!("{prefix}_DB_MAX_CONNECTIONS"), "4");
        env::set_var(format!("{prefix}_DB_IDLE_TIMEOUT_SECS"), "0");
        env::set_var(format!("{prefix}_DB_TEST_BEFORE_ACQUIRE"), "off");

        let config = DbConnectionConfig::from_env(prefix).unwrap();
        assert_eq!(config.url, "postgres://db/jobs");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.idle_timeout(), None);
        assert!(!config.test_before_acquire);

        env::set_var(format!("{prefix}_DB_MAX_CONNECTIONS"), "many");
        assert!(matches!(
            DbConnectionConfig::from_env(prefix),
            Err(DbConnectionError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn missing_url_is_reported() {
        assert!(matches!(
            DbConnectionConfig::from_env("HOPPER_DB_CONFIG_ABSENT"),
            Err(DbConnectionError::MissingEnvVar(var)) if var == "HOPPER_DB_CONFIG_ABSENT_DATABASE_URL"
        ));
    }
}
