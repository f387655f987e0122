//! Configuration handling.
//!
//! [`PoolOptions`] carries the per-wrapper pool settings; every field is
//! optional and resolved through its `*_or_default` accessor. [`Config`] is the
//! command-line surface of the `pooled-sql` binary, with environment variable
//! fallbacks for every flag.

use crate::error::ConfigError;
use crate::logging::Logger;
use crate::models::{Credentials, DEFAULT_PREFETCH_ROWS, DatabaseType, QueryParam, QueryParams};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// Pool configuration defaults
pub const DEFAULT_POOL_MIN: u32 = 0;
pub const DEFAULT_POOL_MAX: u32 = 2;
pub const DEFAULT_POOL_INCREMENT: u32 = 1;
pub const DEFAULT_POOL_CLOSE_TIMEOUT_SECS: u64 = 60;

/// Pool configuration options for one wrapper instance.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Pool identity key (default: the credentials' sid)
    pub alias: Option<String>,
    /// Minimum connections kept open (default: 0)
    pub pool_min: Option<u32>,
    /// Maximum connections in pool (default: 2)
    pub pool_max: Option<u32>,
    /// Connections opened at once when the pool grows (default: 1)
    pub pool_increment: Option<u32>,
    /// Seconds to wait for checked-out connections when closing (default: 60)
    pub pool_close_timeout_secs: Option<u64>,
    /// Rows requested per fetch (default: 1000)
    pub prefetch_rows: Option<u32>,
    /// Event sink (default: `TracingLogger`)
    #[serde(skip)]
    pub logger: Option<Arc<dyn Logger>>,
}

impl PoolOptions {
    /// Set the pool alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Set the logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the number of rows requested per fetch.
    pub fn with_prefetch_rows(mut self, rows: u32) -> Self {
        self.prefetch_rows = Some(rows);
        self
    }

    /// Set the drain timeout used when closing the pool, rounded up to whole
    /// seconds.
    pub fn with_pool_close_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.pool_close_timeout_secs = Some(secs);
        self
    }

    /// Get the alias, falling back to the given sid.
    pub fn alias_or(&self, sid: &str) -> String {
        self.alias.clone().unwrap_or_else(|| sid.to_string())
    }

    /// Get pool_min with default value.
    pub fn pool_min_or_default(&self) -> u32 {
        self.pool_min.unwrap_or(DEFAULT_POOL_MIN)
    }

    /// Get pool_max with default value.
    pub fn pool_max_or_default(&self) -> u32 {
        self.pool_max.unwrap_or(DEFAULT_POOL_MAX)
    }

    /// Get pool_increment with default value.
    pub fn pool_increment_or_default(&self) -> u32 {
        self.pool_increment.unwrap_or(DEFAULT_POOL_INCREMENT)
    }

    /// Get the pool close drain timeout with default value.
    pub fn pool_close_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.pool_close_timeout_secs
                .unwrap_or(DEFAULT_POOL_CLOSE_TIMEOUT_SECS),
        )
    }

    /// Get prefetch_rows with default value.
    pub fn prefetch_rows_or_default(&self) -> u32 {
        self.prefetch_rows.unwrap_or(DEFAULT_PREFETCH_ROWS)
    }

    /// Validate pool options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.alias.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::EmptyAlias);
        }
        let max = self.pool_max_or_default();
        if max == 0 {
            return Err(ConfigError::ZeroPoolMax);
        }
        let min = self.pool_min_or_default();
        if min > max {
            return Err(ConfigError::PoolMinExceedsMax { min, max });
        }
        if self.prefetch_rows_or_default() == 0 {
            return Err(ConfigError::ZeroPrefetchRows);
        }
        Ok(())
    }
}

impl std::fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolOptions")
            .field("alias", &self.alias)
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .field("pool_increment", &self.pool_increment)
            .field("pool_close_timeout_secs", &self.pool_close_timeout_secs)
            .field("prefetch_rows", &self.prefetch_rows)
            .field("has_logger", &self.logger.is_some())
            .finish()
    }
}

/// Parse a `name=value` statement parameter.
///
/// The value is read as JSON when it parses (`42`, `true`, `null`, `"x"`,
/// `[1,2]`), otherwise taken verbatim as a string.
pub fn parse_param(s: &str) -> Result<(String, QueryParam), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid parameter '{s}': expected name=value"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid parameter '{s}': name cannot be empty"));
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map(QueryParam::from)
        .unwrap_or_else(|_| QueryParam::String(raw.to_string()));
    Ok((name.to_string(), value))
}

/// Configuration for the `pooled-sql` command.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pooled-sql",
    about = "Run a statement through a lazily created connection pool and print the rows as JSON",
    version,
    author
)]
pub struct Config {
    /// Database backend
    #[arg(long, value_enum, default_value = "postgresql", env = "POOLED_SQL_DB_TYPE")]
    pub db_type: DatabaseType,

    /// Database server host
    #[arg(long, default_value = "127.0.0.1", env = "POOLED_SQL_HOST")]
    pub host: String,

    /// Database server port (defaults to the backend's standard port)
    #[arg(long, env = "POOLED_SQL_PORT")]
    pub port: Option<String>,

    /// Site identifier: database name, or file path for SQLite
    #[arg(long, env = "POOLED_SQL_SID")]
    pub sid: String,

    /// Database user
    #[arg(short, long, default_value = "", env = "POOLED_SQL_USER")]
    pub user: String,

    /// Database password
    #[arg(long, default_value = "", env = "POOLED_SQL_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Pool alias (defaults to the sid)
    #[arg(long, env = "POOLED_SQL_ALIAS")]
    pub alias: Option<String>,

    /// Minimum pool connections
    #[arg(long, default_value_t = DEFAULT_POOL_MIN, env = "POOLED_SQL_POOL_MIN")]
    pub pool_min: u32,

    /// Maximum pool connections
    #[arg(long, default_value_t = DEFAULT_POOL_MAX, env = "POOLED_SQL_POOL_MAX")]
    pub pool_max: u32,

    /// Connections opened at once when the pool grows
    #[arg(long, default_value_t = DEFAULT_POOL_INCREMENT, env = "POOLED_SQL_POOL_INCREMENT")]
    pub pool_increment: u32,

    /// Seconds to wait for connections when closing the pool
    #[arg(
        long,
        default_value_t = DEFAULT_POOL_CLOSE_TIMEOUT_SECS,
        env = "POOLED_SQL_POOL_CLOSE_TIMEOUT"
    )]
    pub pool_close_timeout: u64,

    /// Rows requested per fetch
    #[arg(long, default_value_t = DEFAULT_PREFETCH_ROWS, env = "POOLED_SQL_PREFETCH_ROWS")]
    pub prefetch_rows: u32,

    /// Create the SQLite database file if it does not exist
    #[arg(long, env = "POOLED_SQL_CREATE_IF_MISSING")]
    pub create_if_missing: bool,

    /// Statement parameter as name=value. Can be specified multiple times.
    #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, QueryParam)>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "POOLED_SQL_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "POOLED_SQL_JSON_LOGS")]
    pub json_logs: bool,

    /// Statement to execute
    #[arg(value_name = "SQL")]
    pub statement: String,
}

impl Config {
    /// Build credentials, filling in the backend's default port.
    pub fn credentials(&self) -> Credentials {
        let port = self
            .port
            .clone()
            .or_else(|| self.db_type.default_port().map(|p| p.to_string()))
            .unwrap_or_else(|| "0".to_string());
        Credentials::new(&self.host, port, &self.sid, &self.user, &self.password)
    }

    /// Build pool options from the command line.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            alias: self.alias.clone(),
            pool_min: Some(self.pool_min),
            pool_max: Some(self.pool_max),
            pool_increment: Some(self.pool_increment),
            pool_close_timeout_secs: Some(self.pool_close_timeout),
            prefetch_rows: Some(self.prefetch_rows),
            logger: None,
        }
    }

    /// Collect statement parameters in command-line order.
    pub fn query_params(&self) -> QueryParams {
        self.params.iter().cloned().collect()
    }
}
