//! Connection-related data models.
//!
//! This module defines credentials, the attributes handed to a driver when a
//! pool is opened, and the database backends the sqlx driver understands.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[value(name = "postgresql", alias = "postgres")]
    PostgreSQL,
    /// Includes MariaDB
    #[value(name = "mysql", alias = "mariadb")]
    MySQL,
    #[value(name = "sqlite")]
    SQLite,
}

impl DatabaseType {
    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Credentials for a database server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub port: String,
    /// Site identifier: database/service name, or file path for SQLite
    pub sid: String,
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        sid: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            sid: sid.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Connection string in `host:port/sid` form.
    pub fn connection_string(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.sid)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("sid", &self.sid)
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

/// Everything a driver needs to open a pool.
#[derive(Clone, PartialEq, Eq)]
pub struct PoolAttributes {
    pub user: String,
    pub password: String,
    /// `host:port/sid`
    pub connection_string: String,
    pub pool_alias: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub pool_increment: u32,
}

impl PoolAttributes {
    /// Split the connection string back into `(host, port, sid)`.
    ///
    /// The sid may itself contain `/` (SQLite file paths), so only the first
    /// separator after the port is significant.
    pub fn host_port_sid(&self) -> Option<(&str, &str, &str)> {
        let (host_port, sid) = self.connection_string.split_once('/')?;
        let (host, port) = host_port.rsplit_once(':')?;
        Some((host, port, sid))
    }
}

impl std::fmt::Debug for PoolAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAttributes")
            .field("user", &self.user)
            .field("password", &"****")
            .field("connection_string", &self.connection_string)
            .field("pool_alias", &self.pool_alias)
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .field("pool_increment", &self.pool_increment)
            .finish()
    }
}
