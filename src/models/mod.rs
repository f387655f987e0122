//! Data models shared by the wrapper, the drivers and the CLI.

pub mod connection;
pub mod query;

pub use connection::{Credentials, DatabaseType, PoolAttributes};
pub use query::{DEFAULT_PREFETCH_ROWS, QueryParam, QueryParams, Row};
