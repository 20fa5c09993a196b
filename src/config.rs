//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::broker::{DEFAULT_EXCHANGE, DEFAULT_QUEUES};
use crate::crypto::KEY_LEN;

/// Ten years; purge cutoffs must stay representable as timestamps
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 10;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Connection URL of the queue store (defaults to the ledger database)
    pub broker_database_url: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Key for the deterministic identifier cipher
    pub identifier_key: [u8; KEY_LEN],

    /// Bound on one ledger call
    pub store_timeout: Duration,

    /// Bound on one broker publish
    pub publish_timeout: Duration,

    /// Fanout exchange for transfer events
    pub exchange_name: String,

    /// Queues bound to the exchange, one per projection
    pub projection_queues: Vec<String>,

    pub outbox_relay_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_retention: Duration,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;

        let broker_database_url =
            lookup("BROKER_DATABASE_URL").unwrap_or_else(|| database_url.clone());

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = parse_or(&lookup, "PORT", 8080)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let identifier_key = lookup("AES_KEY").ok_or(ConfigError::MissingEnv("AES_KEY"))?;
        let identifier_key = parse_key(&identifier_key)?;

        let store_timeout = Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 5)?);
        let publish_timeout = Duration::from_secs(parse_or(&lookup, "PUBLISH_TIMEOUT_SECS", 5)?);
        if store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("STORE_TIMEOUT_SECS"));
        }
        if publish_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("PUBLISH_TIMEOUT_SECS"));
        }

        let exchange_name = lookup("EXCHANGE_NAME")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| DEFAULT_EXCHANGE.to_string());
        if exchange_name.is_empty() {
            return Err(ConfigError::InvalidValue("EXCHANGE_NAME"));
        }

        let projection_queues: Vec<String> = match lookup("PROJECTION_QUEUES") {
            Some(raw) => raw
                .split(',')
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect(),
            None => DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
        };
        if projection_queues.is_empty() {
            return Err(ConfigError::InvalidValue("PROJECTION_QUEUES"));
        }

        let outbox_relay_interval =
            Duration::from_secs(parse_or(&lookup, "OUTBOX_RELAY_INTERVAL_SECS", 5)?);
        if outbox_relay_interval.is_zero() {
            return Err(ConfigError::InvalidValue("OUTBOX_RELAY_INTERVAL_SECS"));
        }

        let outbox_batch_size: i64 = parse_or(&lookup, "OUTBOX_BATCH_SIZE", 100)?;
        if outbox_batch_size <= 0 {
            return Err(ConfigError::InvalidValue("OUTBOX_BATCH_SIZE"));
        }

        let retention_hours: u64 = parse_or(&lookup, "OUTBOX_RETENTION_HOURS", 168)?;
        let outbox_retention = retention_hours
            .checked_mul(3600)
            .filter(|_| retention_hours <= MAX_RETENTION_HOURS)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidValue("OUTBOX_RETENTION_HOURS"))?;

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("LOG_FORMAT"))?,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            broker_database_url,
            host,
            port,
            environment,
            identifier_key,
            store_timeout,
            publish_timeout,
            exchange_name,
            projection_queues,
            outbox_relay_interval,
            outbox_batch_size,
            outbox_retention,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_max_connections", &self.database_max_connections)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("identifier_key", &"[REDACTED]")
            .field("store_timeout", &self.store_timeout)
            .field("publish_timeout", &self.publish_timeout)
            .field("exchange_name", &self.exchange_name)
            .field("projection_queues", &self.projection_queues)
            .field("outbox_relay_interval", &self.outbox_relay_interval)
            .field("outbox_batch_size", &self.outbox_batch_size)
            .field("outbox_retention", &self.outbox_retention)
            .field("log_format", &self.log_format)
            .finish()
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        None => Ok(default),
    }
}

fn parse_key(raw: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    let bytes = hex::decode(raw.trim()).map_err(|_| ConfigError::InvalidValue("AES_KEY"))?;
    bytes
        .try_into()
        .map_err(|_| ConfigError::InvalidValue("AES_KEY"))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
