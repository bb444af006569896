//! Node configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Node configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: PostgreSQL connection string (unset: in-memory stores)
/// - `METRICS_ADDR`: Prometheus listener (default: `"0.0.0.0:9000"`)
/// - `RECONCILE_INTERVAL_MS`: saga reconcile period (default: `5000`)
/// - `ACTOR_IDLE_TIMEOUT_SECS`: idle time before an actor deactivates (default: `300`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
///
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub metrics_addr: SocketAddr,
    pub reconcile_interval: Duration,
    pub actor_idle_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            metrics_addr: lookup("METRICS_ADDR")
                .and_then(|addr| addr.parse().ok())
                .unwrap_or(defaults.metrics_addr),
            reconcile_interval: lookup("RECONCILE_INTERVAL_MS")
                .and_then(|ms| ms.parse().ok())
                .filter(|&ms: &u64| ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconcile_interval),
            actor_idle_timeout: lookup("ACTOR_IDLE_TIMEOUT_SECS")
                .and_then(|secs| secs.parse().ok())
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.actor_idle_timeout),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|format| LogFormat::parse(&format))
                .unwrap_or_default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            reconcile_interval: Duration::from_millis(5000),
            actor_idle_timeout: Duration::from_secs(300),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
