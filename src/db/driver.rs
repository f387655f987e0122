//! Driver capability interface.
//!
//! The wrapper never talks to a database directly; it drives an
//! implementation of [`Driver`], which can open and close a pool, check
//! connections in and out, execute a statement into a result set, and drain
//! that result set page by page.

use crate::models::{PoolAttributes, QueryParams, Row};
use std::future::Future;
use std::time::Duration;

/// Options passed to [`Driver::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Return a result set to be drained with [`Driver::fetch_rows`]
    pub result_set: bool,
    /// Rows the driver may buffer ahead of each fetch
    pub prefetch_rows: u32,
}

impl ExecuteOptions {
    /// Result-set mode with the given prefetch size.
    pub fn result_set(prefetch_rows: u32) -> Self {
        Self {
            result_set: true,
            prefetch_rows,
        }
    }
}

/// A database client library as seen by the wrapper.
///
/// A result set takes over the connection it is opened on and hands it back
/// when closed, so the connection is released only after its result set is
/// gone.
pub trait Driver: Send + Sync {
    /// Live connection pool.
    type Pool: Send + Sync;
    /// Connection checked out of a pool.
    type Connection: Send;
    /// Open cursor over a statement's rows, holding its connection.
    type ResultSet: Send;
    /// Error produced by every driver operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a pool.
    fn create_pool(
        &self,
        attributes: &PoolAttributes,
    ) -> impl Future<Output = Result<Self::Pool, Self::Error>> + Send;

    /// Close a pool, waiting up to `drain_timeout` for checked-out connections.
    fn close_pool(
        &self,
        pool: &Self::Pool,
        drain_timeout: Duration,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Check a connection out of the pool registered under `alias`.
    fn get_connection(
        &self,
        pool: &Self::Pool,
        alias: &str,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Return a connection to its pool.
    fn release_connection(
        &self,
        connection: Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Execute a statement and open a result set over its rows.
    ///
    /// On failure the connection comes back with the error.
    fn execute(
        &self,
        connection: Self::Connection,
        sql: &str,
        params: &QueryParams,
        options: ExecuteOptions,
    ) -> impl Future<Output = Result<Self::ResultSet, (Self::Error, Self::Connection)>> + Send;

    /// Fetch up to `max_rows` rows. An empty page means the result set is
    /// exhausted; a short page does not.
    fn fetch_rows(
        &self,
        result_set: &mut Self::ResultSet,
        max_rows: u32,
    ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send;

    /// Close a result set and take back its connection. The connection is
    /// returned whether or not closing succeeded.
    fn close_result_set(
        &self,
        result_set: Self::ResultSet,
    ) -> impl Future<Output = (Self::Connection, Result<(), Self::Error>)> + Send;
}
