//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use projections::CommitPolicy;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset means in-memory storage
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `CATALOG_FILE`: JSON file with items and warehouses
/// - `ALLOW_NEGATIVE_STOCK`: permit backorders (default: `false`)
/// - `COMMIT_TIMEOUT_MS`: bound on one write, retries included (default: `5000`)
/// - `COMMIT_MAX_RETRIES`: retries after contention (default: `5`)
/// - `COMMIT_BACKOFF_MS`: first retry delay (default: `10`)
/// - `FEED_CAPACITY`: change feed buffer per subscriber (default: `1024`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub catalog_file: Option<PathBuf>,
    pub allow_negative_stock: bool,
    pub commit_timeout: Duration,
    pub commit_max_retries: u32,
    pub commit_backoff: Duration,
    pub feed_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup. Unparsable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            catalog_file: lookup("CATALOG_FILE").map(PathBuf::from),
            allow_negative_stock: parse_var(&lookup, "ALLOW_NEGATIVE_STOCK")
                .unwrap_or(defaults.allow_negative_stock),
            commit_timeout: parse_var(&lookup, "COMMIT_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.commit_timeout),
            commit_max_retries: parse_var(&lookup, "COMMIT_MAX_RETRIES")
                .unwrap_or(defaults.commit_max_retries),
            commit_backoff: parse_var(&lookup, "COMMIT_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.commit_backoff),
            feed_capacity: parse_var(&lookup, "FEED_CAPACITY").unwrap_or(defaults.feed_capacity),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timeout, retry and guard settings for balance writes.
    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::default()
            .allow_negative_stock(self.allow_negative_stock)
            .timeout(self.commit_timeout)
            .retries(self.commit_max_retries, self.commit_backoff)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let policy = CommitPolicy::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            catalog_file: None,
            allow_negative_stock: policy.allow_negative_stock,
            commit_timeout: policy.timeout,
            commit_max_retries: policy.max_retries,
            commit_backoff: policy.base_backoff,
            feed_capacity: projections::DEFAULT_FEED_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(!config.allow_negative_stock);
        assert_eq!(config.commit_timeout, Duration::from_millis(5000));
        assert_eq!(config.commit_max_retries, 5);
        assert_eq!(config.commit_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_lookup_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8081"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/inventory"),
            ("CATALOG_FILE", "/etc/inventory/catalog.json"),
            ("ALLOW_NEGATIVE_STOCK", "true"),
            ("COMMIT_TIMEOUT_MS", "250"),
            ("COMMIT_MAX_RETRIES", "2"),
        ]));

        assert_eq!(config.port, 8081);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/inventory")
        );
        assert_eq!(
            config.catalog_file,
            Some(PathBuf::from("/etc/inventory/catalog.json"))
        );

        let policy = config.commit_policy();
        assert!(policy.allow_negative_stock);
        assert_eq!(policy.timeout, Duration::from_millis(250));
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_backoff, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "not-a-port"),
            ("ALLOW_NEGATIVE_STOCK", "maybe"),
            ("DATABASE_URL", "  "),
        ]));
        assert_eq!(config.port, 3000);
        assert!(!config.allow_negative_stock);
        assert!(config.database_url.is_none());
    }
}
