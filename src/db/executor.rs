//! Query execution engine.
//!
//! A query runs as acquire → execute → drain → close → release. The result
//! set is drained as a lazy stream of pages, each of at most `prefetch_rows`
//! rows, concatenated in fetch order. Only an empty page ends the stream: a
//! full last page still costs one more fetch.
//!
//! Cleanup runs on every path that got far enough to need it. The result set
//! is closed once if it was opened, and the connection is released once if it
//! was acquired. Rows from a partially drained result set are discarded.

use crate::db::driver::{Driver, ExecuteOptions};
use crate::db::pool::PooledDatabase;
use crate::error::{DbError, DbResult};
use crate::logging::Loggable;
use crate::models::{QueryParams, Row};
use futures_util::stream::{self, Stream, TryStreamExt};
use serde::de::DeserializeOwned;

impl<D: Driver> PooledDatabase<D> {
    /// Run a statement without parameters and return every row.
    pub async fn query(&self, sql: &str) -> DbResult<Vec<Row>, D::Error> {
        self.query_with(sql, &QueryParams::new()).await
    }

    /// Run a statement and return every row, in order.
    pub async fn query_with(
        &self,
        sql: &str,
        params: &QueryParams,
    ) -> DbResult<Vec<Row>, D::Error> {
        let connection = self.get_connection().await?;

        self.logger.debug(Loggable::Text(sql));
        self.logger.debug(Loggable::Text(&format!("{params:?}")));

        let (connection, result) = self.execute_and_drain(connection, sql, params).await;

        if let Err(err) = self.driver.release_connection(connection).await {
            self.logger.warn(Loggable::Text("failed to release connection"));
            self.logger.warn(Loggable::Error(&err));
        }

        result
    }

    /// Run a statement and deserialize every row into `T`.
    pub async fn query_as<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &QueryParams,
    ) -> DbResult<Vec<T>, D::Error> {
        self.query_with(sql, params)
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                serde_json::from_value(serde_json::Value::Object(row))
                    .map_err(|source| DbError::RowDecode { index, source })
            })
            .collect()
    }

    /// Hands the connection back on every path, for the caller to release.
    async fn execute_and_drain(
        &self,
        connection: D::Connection,
        sql: &str,
        params: &QueryParams,
    ) -> (D::Connection, DbResult<Vec<Row>, D::Error>) {
        let options = ExecuteOptions::result_set(self.prefetch_rows);
        let mut result_set = match self.driver.execute(connection, sql, params, options).await {
            Ok(result_set) => result_set,
            Err((err, connection)) => {
                self.log_failure("query failed", &err);
                return (connection, Err(DbError::QueryExecution(err)));
            }
        };

        let fetched: Result<Vec<Row>, D::Error> =
            pages(&self.driver, &mut result_set, self.prefetch_rows)
                .try_concat()
                .await;
        if let Err(err) = &fetched {
            self.log_failure("error fetching data from query", err);
        }

        let (connection, closed) = self.driver.close_result_set(result_set).await;
        if let Err(err) = closed {
            self.logger.warn(Loggable::Text("failed to close result set"));
            self.logger.warn(Loggable::Error(&err));
        }

        (connection, fetched.map_err(DbError::ResultFetch))
    }
}

/// Lazy, finite stream of non-empty pages from a result set.
///
/// Ends at the first empty page or the first error. Not restartable: the
/// result set's cursor advances with every page.
fn pages<'a, D: Driver>(
    driver: &'a D,
    result_set: &'a mut D::ResultSet,
    page_size: u32,
) -> impl Stream<Item = Result<Vec<Row>, D::Error>> + Send + 'a {
    stream::try_unfold(result_set, move |result_set| async move {
        let page = driver.fetch_rows(result_set, page_size).await?;
        if page.is_empty() {
            Ok(None)
        } else {
            Ok(Some((page, result_set)))
        }
    })
}
