//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use dispatch::DEFAULT_SPEED_MPS;
use outbox::{DEFAULT_NATS_SUBJECT, OutboxWorkerConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `MIGRATE_ON_START`: apply migrations at startup (default: `true`)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `DRONE_SPEED_MPS`: speed used for ETAs (default: `15.0`)
/// - `OUTBOX_ENABLED`: run the outbox worker (default: `true`)
/// - `OUTBOX_POLL_INTERVAL_MS`: worker poll interval (default: `1000`)
/// - `OUTBOX_BATCH_SIZE`: events per worker cycle (default: `50`)
/// - `NATS_URL`: NATS server events are published to; events are only logged when unset
/// - `NATS_SUBJECT`: subject events are published on (default: `"drone.events"`)
///
/// Malformed values fall back to the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub migrate_on_start: bool,
    pub database_max_connections: u32,
    pub drone_speed_mps: f64,
    pub outbox_enabled: bool,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub nats_url: Option<String>,
    pub nats_subject: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            migrate_on_start: parse_var(&lookup, "MIGRATE_ON_START")
                .unwrap_or(defaults.migrate_on_start),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            drone_speed_mps: parse_var(&lookup, "DRONE_SPEED_MPS")
                .filter(|s: &f64| s.is_finite() && *s > 0.0)
                .unwrap_or(defaults.drone_speed_mps),
            outbox_enabled: parse_var(&lookup, "OUTBOX_ENABLED").unwrap_or(defaults.outbox_enabled),
            outbox_poll_interval: parse_var(&lookup, "OUTBOX_POLL_INTERVAL_MS")
                .filter(|ms: &u64| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_poll_interval),
            outbox_batch_size: parse_var(&lookup, "OUTBOX_BATCH_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.outbox_batch_size),
            nats_url: lookup("NATS_URL").filter(|v| !v.trim().is_empty()),
            nats_subject: lookup("NATS_SUBJECT")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.nats_subject),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn outbox_worker_config(&self) -> OutboxWorkerConfig {
        OutboxWorkerConfig::new(self.outbox_poll_interval, self.outbox_batch_size)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let outbox = OutboxWorkerConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            migrate_on_start: true,
            database_max_connections: 10,
            drone_speed_mps: DEFAULT_SPEED_MPS,
            outbox_enabled: true,
            outbox_poll_interval: outbox.poll_interval,
            outbox_batch_size: outbox.batch_size,
            nats_url: None,
            nats_subject: DEFAULT_NATS_SUBJECT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(config.migrate_on_start);
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.drone_speed_mps, 15.0);
        assert!(config.outbox_enabled);
        assert_eq!(config.outbox_poll_interval, Duration::from_secs(1));
        assert_eq!(config.outbox_batch_size, 50);
        assert!(config.nats_url.is_none());
        assert_eq!(config.nats_subject, "drone.events");
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_reads_overrides() {
        let config = from_pairs(&[
            ("PORT", "9090"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/dispatch"),
            ("MIGRATE_ON_START", "false"),
            ("DRONE_SPEED_MPS", "20.5"),
            ("OUTBOX_ENABLED", "false"),
            ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ("OUTBOX_BATCH_SIZE", "10"),
            ("NATS_URL", "nats://localhost:4222"),
            ("NATS_SUBJECT", "fleet.events"),
        ]);
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/dispatch")
        );
        assert!(!config.migrate_on_start);
        assert_eq!(config.drone_speed_mps, 20.5);
        assert!(!config.outbox_enabled);
        assert_eq!(
            config.outbox_worker_config(),
            OutboxWorkerConfig::new(Duration::from_millis(250), 10)
        );
        assert_eq!(config.nats_url.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(config.nats_subject, "fleet.events");
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "eighty"),
            ("DATABASE_URL", "  "),
            ("DRONE_SPEED_MPS", "-4"),
            ("OUTBOX_POLL_INTERVAL_MS", "0"),
            ("OUTBOX_BATCH_SIZE", "lots"),
            ("NATS_URL", ""),
            ("NATS_SUBJECT", " "),
        ]);
        assert_eq!(config.port, 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.drone_speed_mps, 15.0);
        assert_eq!(config.outbox_poll_interval, Duration::from_secs(1));
        assert_eq!(config.outbox_batch_size, 50);
        assert!(config.nats_url.is_none());
        assert_eq!(config.nats_subject, "drone.events");
    }
}
