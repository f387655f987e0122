//! Database access layer.
//!
//! This module provides pooled database access:
//! - The driver capability interface
//! - Lazy pool management
//! - Chunked query execution
//! - An sqlx-backed driver and its row decoding

pub mod driver;
pub mod executor;
pub mod pool;
pub mod sqlx_driver;
pub mod types;

pub use driver::{Driver, ExecuteOptions};
pub use pool::PooledDatabase;
pub use sqlx_driver::{SqlxConnection, SqlxDriver, SqlxPool, SqlxResultSet};
