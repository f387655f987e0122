//! sqlx-backed [`Driver`] for PostgreSQL, MySQL and SQLite.
//!
//! Pools and connections are database-specific (MySqlPool, PgPool,
//! SqlitePool) rather than `AnyPool`, so every column type the backend knows
//! can be decoded.
//!
//! A result set runs its statement on a spawned producer task that owns the
//! connection and pushes decoded rows into a channel bounded by
//! `prefetch_rows`. Closing the result set drops the receiving end, which
//! stops the producer, and takes the connection back from the task. `execute`
//! waits for the first row so that statement errors surface from `execute`
//! rather than from the first fetch.

use crate::db::driver::{Driver, ExecuteOptions};
use crate::db::types::RowToJson;
use crate::models::{DatabaseType, PoolAttributes, QueryParam, QueryParams, Row};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Database-specific connection pool.
#[derive(Debug, Clone)]
pub enum SqlxPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl SqlxPool {
    /// Close the connection pool, waiting for every connection to come back.
    pub async fn close(&self) {
        match self {
            SqlxPool::MySql(pool) => pool.close().await,
            SqlxPool::Postgres(pool) => pool.close().await,
            SqlxPool::SQLite(pool) => pool.close().await,
        }
    }
}

/// Connection checked out of an [`SqlxPool`].
#[derive(Debug)]
pub enum SqlxConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

type RowResult = Result<Row, sqlx::Error>;

/// Open result set. Its producer task holds the connection until the result
/// set is closed.
pub struct SqlxResultSet {
    rows: mpsc::Receiver<RowResult>,
    producer: JoinHandle<SqlxConnection>,
    /// First row, pulled by `execute`
    peeked: Option<Row>,
    exhausted: bool,
}

impl SqlxResultSet {
    fn start(
        connection: SqlxConnection,
        sql: &str,
        params: &QueryParams,
        prefetch_rows: u32,
    ) -> Self {
        let (tx, rx) = mpsc::channel(prefetch_rows.max(1) as usize);
        let producer = tokio::spawn(produce_rows(
            connection,
            sql.to_string(),
            params.clone(),
            tx,
        ));
        Self {
            rows: rx,
            producer,
            peeked: None,
            exhausted: false,
        }
    }

    async fn next_page(&mut self, max_rows: usize) -> Result<Vec<Row>, sqlx::Error> {
        let mut page = Vec::new();
        if let Some(row) = self.peeked.take() {
            page.push(row);
        }
        while page.len() < max_rows && !self.exhausted {
            match self.rows.recv().await {
                Some(row) => page.push(row?),
                None => self.exhausted = true,
            }
        }
        Ok(page)
    }

    /// Stop the producer and take the connection back.
    async fn reclaim(self) -> SqlxConnection {
        drop(self.rows);
        match self.producer.await {
            Ok(connection) => connection,
            // The producer is never aborted, so this is a panic in row decoding.
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

impl std::fmt::Debug for SqlxResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxResultSet")
            .field("has_peeked", &self.peeked.is_some())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

/// Run the statement and forward its rows until they run out, a row fails,
/// or the result set is closed. Returns the connection.
async fn produce_rows(
    mut connection: SqlxConnection,
    sql: String,
    params: QueryParams,
    tx: mpsc::Sender<RowResult>,
) -> SqlxConnection {
    {
        let mut rows = match &mut connection {
            SqlxConnection::MySql(conn) => mysql::fetch(conn, &sql, &params),
            SqlxConnection::Postgres(conn) => postgres::fetch(conn, &sql, &params),
            SqlxConnection::SQLite(conn) => sqlite::fetch(conn, &sql, &params),
        };
        while let Some(row) = rows.next().await {
            let failed = row.is_err();
            // A send error means the receiver is gone: the result set was closed.
            if tx.send(row).await.is_err() || failed {
                break;
            }
        }
    }
    connection
}

/// [`Driver`] implementation over sqlx.
///
/// The pool's `host:port/sid` connection string is interpreted per backend:
/// for PostgreSQL and MySQL the sid is the database name; for SQLite it is
/// the database file path and host/port are ignored.
#[derive(Debug, Clone)]
pub struct SqlxDriver {
    db_type: DatabaseType,
    acquire_timeout: Duration,
    create_if_missing: bool,
}

impl SqlxDriver {
    /// Create a driver for the given backend.
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            create_if_missing: false,
        }
    }

    /// Set how long `get_connection` waits for a free connection.
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Let SQLite create the database file when it does not exist. Off by
    /// default, so a mistyped path fails at pool creation.
    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }
}

fn configuration_error(message: String) -> sqlx::Error {
    sqlx::Error::Configuration(message.into())
}

impl Driver for SqlxDriver {
    type Pool = SqlxPool;
    type Connection = SqlxConnection;
    type ResultSet = SqlxResultSet;
    type Error = sqlx::Error;

    async fn create_pool(&self, attributes: &PoolAttributes) -> Result<SqlxPool, sqlx::Error> {
        let (host, port, sid) = attributes.host_port_sid().ok_or_else(|| {
            configuration_error(format!(
                "Invalid connection string '{}': expected host:port/sid",
                attributes.connection_string
            ))
        })?;

        info!(
            alias = %attributes.pool_alias,
            db_type = %self.db_type,
            pool_min = attributes.pool_min,
            pool_max = attributes.pool_max,
            "Creating connection pool"
        );
        // sqlx opens connections one at a time on demand
        debug!(
            pool_increment = attributes.pool_increment,
            "Pool increment is not used by sqlx pools"
        );

        let parse_port = || {
            port.parse::<u16>()
                .map_err(|e| configuration_error(format!("Invalid port '{port}': {e}")))
        };

        match self.db_type {
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::new()
                    .host(host)
                    .port(parse_port()?)
                    .database(sid)
                    .username(&attributes.user)
                    .password(&attributes.password)
                    .charset("utf8mb4");

                let pool = MySqlPoolOptions::new()
                    .min_connections(attributes.pool_min)
                    .max_connections(attributes.pool_max)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(SqlxPool::MySql(pool))
            }
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::new()
                    .host(host)
                    .port(parse_port()?)
                    .database(sid)
                    .username(&attributes.user)
                    .password(&attributes.password);

                let pool = PgPoolOptions::new()
                    .min_connections(attributes.pool_min)
                    .max_connections(attributes.pool_max)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(SqlxPool::Postgres(pool))
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::new()
                    .filename(sid)
                    .create_if_missing(self.create_if_missing);

                let pool = SqlitePoolOptions::new()
                    .min_connections(attributes.pool_min)
                    .max_connections(attributes.pool_max)
                    .acquire_timeout(self.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(SqlxPool::SQLite(pool))
            }
        }
    }

    async fn close_pool(&self, pool: &SqlxPool, drain_timeout: Duration) -> Result<(), sqlx::Error> {
        // `close` stops new acquisitions immediately; the wait only covers
        // connections still checked out.
        if timeout(drain_timeout, pool.close()).await.is_err() {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "Pool close timed out; remaining connections close when returned"
            );
        }
        Ok(())
    }

    async fn get_connection(&self, pool: &SqlxPool, alias: &str) -> Result<SqlxConnection, sqlx::Error> {
        let connection = match pool {
            SqlxPool::MySql(p) => SqlxConnection::MySql(p.acquire().await?),
            SqlxPool::Postgres(p) => SqlxConnection::Postgres(p.acquire().await?),
            SqlxPool::SQLite(p) => SqlxConnection::SQLite(p.acquire().await?),
        };
        trace!(alias = %alias, "Acquired connection");
        Ok(connection)
    }

    async fn release_connection(&self, connection: SqlxConnection) -> Result<(), sqlx::Error> {
        // Dropping a pooled connection returns it to its pool.
        drop(connection);
        Ok(())
    }

    async fn execute(
        &self,
        connection: SqlxConnection,
        sql: &str,
        params: &QueryParams,
        options: ExecuteOptions,
    ) -> Result<SqlxResultSet, (sqlx::Error, SqlxConnection)> {
        debug!(
            params = params.len(),
            prefetch_rows = options.prefetch_rows,
            "Opening result set"
        );

        let mut result_set = SqlxResultSet::start(connection, sql, params, options.prefetch_rows);
        match result_set.rows.recv().await {
            Some(Ok(row)) => result_set.peeked = Some(row),
            Some(Err(err)) => return Err((err, result_set.reclaim().await)),
            None => result_set.exhausted = true,
        }
        Ok(result_set)
    }

    async fn fetch_rows(
        &self,
        result_set: &mut SqlxResultSet,
        max_rows: u32,
    ) -> Result<Vec<Row>, sqlx::Error> {
        result_set.next_page(max_rows as usize).await
    }

    async fn close_result_set(
        &self,
        result_set: SqlxResultSet,
    ) -> (SqlxConnection, Result<(), sqlx::Error>) {
        trace!(exhausted = result_set.exhausted, "Closing result set");
        (result_set.reclaim().await, Ok(()))
    }
}

// =============================================================================
// Database-Specific Row Streams
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// Parameters bind positionally, in the mapping's insertion order. Without
// parameters the statement runs unprepared, since some statements cannot be
// prepared.

mod mysql {
    use super::*;
    use sqlx::mysql::MySqlArguments;

    pub fn fetch<'c>(
        conn: &'c mut PoolConnection<MySql>,
        sql: &'c str,
        params: &'c QueryParams,
    ) -> BoxStream<'c, Result<Row, sqlx::Error>> {
        let rows = if params.is_empty() {
            use sqlx::Executor;
            (&mut **conn).fetch(sql)
        } else {
            let mut query = sqlx::query(sql);
            for param in params.values() {
                query = bind_param(query, param);
            }
            query.fetch(&mut **conn)
        };
        rows.map(|row| row.map(|r| r.to_json_row())).boxed()
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, MySql, MySqlArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
        }
    }
}

mod postgres {
    use super::*;
    use sqlx::postgres::PgArguments;

    pub fn fetch<'c>(
        conn: &'c mut PoolConnection<Postgres>,
        sql: &'c str,
        params: &'c QueryParams,
    ) -> BoxStream<'c, Result<Row, sqlx::Error>> {
        let rows = if params.is_empty() {
            use sqlx::Executor;
            (&mut **conn).fetch(sql)
        } else {
            let mut query = sqlx::query(sql);
            for param in params.values() {
                query = bind_param(query, param);
            }
            query.fetch(&mut **conn)
        };
        rows.map(|row| row.map(|r| r.to_json_row())).boxed()
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            QueryParam::Json(v) => query.bind(sqlx::types::Json(v)),
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteArguments;

    pub fn fetch<'c>(
        conn: &'c mut PoolConnection<Sqlite>,
        sql: &'c str,
        params: &'c QueryParams,
    ) -> BoxStream<'c, Result<Row, sqlx::Error>> {
        let rows = if params.is_empty() {
            use sqlx::Executor;
            (&mut **conn).fetch(sql)
        } else {
            let mut query = sqlx::query(sql);
            for param in params.values() {
                query = bind_param(query, param);
            }
            query.fetch(&mut **conn)
        };
        rows.map(|row| row.map(|r| r.to_json_row())).boxed()
    }

    fn bind_param<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        param: &'q QueryParam,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match param {
            QueryParam::Null => query.bind(None::<String>),
            QueryParam::Bool(v) => query.bind(*v),
            QueryParam::Int(v) => query.bind(*v),
            QueryParam::Float(v) => query.bind(*v),
            QueryParam::String(v) => query.bind(v.as_str()),
            // SQLite has no native JSON type, store as string
            QueryParam::Json(v) => query.bind(v.to_string()),
        }
    }
}
