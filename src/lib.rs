//! Pooled SQL Library
//!
//! This library wraps a database driver behind a lazily created connection
//! pool and reads query results in fixed-size pages, handing back every row
//! of a statement as one ordered list.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use config::{Config, PoolOptions};
pub use db::{Driver, ExecuteOptions, PooledDatabase, SqlxDriver};
pub use error::{ConfigError, DbError, DbResult};
pub use logging::{Loggable, Logger, TracingLogger};
pub use models::{Credentials, DatabaseType, PoolAttributes, QueryParam, QueryParams, Row};
