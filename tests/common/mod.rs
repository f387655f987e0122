//! Shared test fixtures: a scripted in-memory driver and a recording logger.

#![allow(dead_code)]

use pooled_sql::config::PoolOptions;
use pooled_sql::db::{Driver, ExecuteOptions, PooledDatabase};
use pooled_sql::logging::{Loggable, Logger};
use pooled_sql::models::{Credentials, PoolAttributes, QueryParams, Row};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Error returned by [`MockDriver`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for MockError {}

/// Behaviour the next driver calls should show.
#[derive(Debug, Default)]
pub struct Script {
    /// Remaining `create_pool` calls that fail
    pub failing_creates: usize,
    pub fail_close: bool,
    pub fail_connection: bool,
    pub fail_execute: bool,
    pub fail_close_result_set: bool,
    /// Zero-based `fetch_rows` call that fails
    pub fail_fetch_at: Option<usize>,
    pub rows: Vec<Row>,
    pub create_delay: Option<Duration>,
}

/// Calls observed by the driver.
#[derive(Debug, Default)]
pub struct Calls {
    pub create_pool: usize,
    pub close_pool: usize,
    pub get_connection: usize,
    pub release_connection: usize,
    pub execute: usize,
    pub close_result_set: usize,
    pub attributes: Vec<PoolAttributes>,
    pub aliases: Vec<String>,
    /// Ids of released connections, in release order
    pub released: Vec<usize>,
    pub statements: Vec<(String, QueryParams, ExecuteOptions)>,
    pub fetch_sizes: Vec<u32>,
    pub drain_timeouts: Vec<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub script: Arc<Mutex<Script>>,
    pub calls: Arc<Mutex<Calls>>,
}

impl MockDriver {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        let driver = Self::default();
        driver.script.lock().unwrap().rows = rows;
        driver
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap()
    }
}

#[derive(Debug)]
pub struct MockPool {
    pub generation: usize,
}

#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
}

#[derive(Debug)]
pub struct MockResultSet {
    connection: MockConnection,
    rows: VecDeque<Row>,
}

impl Driver for MockDriver {
    type Pool = MockPool;
    type Connection = MockConnection;
    type ResultSet = MockResultSet;
    type Error = MockError;

    async fn create_pool(&self, attributes: &PoolAttributes) -> Result<MockPool, MockError> {
        let delay = self.script().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut calls = self.calls();
        calls.create_pool += 1;
        calls.attributes.push(attributes.clone());

        let mut script = self.script();
        if script.failing_creates > 0 {
            script.failing_creates -= 1;
            return Err(MockError("ORA-12541: TNS:no listener".to_string()));
        }
        Ok(MockPool {
            generation: calls.create_pool,
        })
    }

    async fn close_pool(&self, _pool: &MockPool, drain_timeout: Duration) -> Result<(), MockError> {
        let mut calls = self.calls();
        calls.close_pool += 1;
        calls.drain_timeouts.push(drain_timeout);
        if self.script().fail_close {
            return Err(MockError("ORA-24422: connections still in use".to_string()));
        }
        Ok(())
    }

    async fn get_connection(&self, _pool: &MockPool, alias: &str) -> Result<MockConnection, MockError> {
        let mut calls = self.calls();
        calls.get_connection += 1;
        calls.aliases.push(alias.to_string());
        if self.script().fail_connection {
            return Err(MockError("ORA-24418: cannot open further sessions".to_string()));
        }
        Ok(MockConnection {
            id: calls.get_connection,
        })
    }

    async fn release_connection(&self, connection: MockConnection) -> Result<(), MockError> {
        let mut calls = self.calls();
        calls.release_connection += 1;
        calls.released.push(connection.id);
        Ok(())
    }

    async fn execute(
        &self,
        connection: MockConnection,
        sql: &str,
        params: &QueryParams,
        options: ExecuteOptions,
    ) -> Result<MockResultSet, (MockError, MockConnection)> {
        let mut calls = self.calls();
        calls.execute += 1;
        calls
            .statements
            .push((sql.to_string(), params.clone(), options));

        let script = self.script();
        if script.fail_execute {
            let err = MockError("ORA-00942: table or view does not exist".to_string());
            return Err((err, connection));
        }
        Ok(MockResultSet {
            connection,
            rows: script.rows.iter().cloned().collect(),
        })
    }

    async fn fetch_rows(
        &self,
        result_set: &mut MockResultSet,
        max_rows: u32,
    ) -> Result<Vec<Row>, MockError> {
        let mut calls = self.calls();
        let fetch_index = calls.fetch_sizes.len();
        calls.fetch_sizes.push(max_rows);
        if self.script().fail_fetch_at == Some(fetch_index) {
            return Err(MockError("ORA-01555: snapshot too old".to_string()));
        }

        let take = result_set.rows.len().min(max_rows as usize);
        Ok(result_set.rows.drain(..take).collect())
    }

    async fn close_result_set(
        &self,
        result_set: MockResultSet,
    ) -> (MockConnection, Result<(), MockError>) {
        self.calls().close_result_set += 1;
        let closed = if self.script().fail_close_result_set {
            Err(MockError("ORA-01001: invalid cursor".to_string()))
        } else {
            Ok(())
        };
        (result_set.connection, closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

/// Logger that keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<(Level, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    fn record(&self, level: Level, value: Loggable<'_>) {
        self.events.lock().unwrap().push((level, value.to_string()));
    }
}

impl Logger for RecordingLogger {
    fn error(&self, value: Loggable<'_>) {
        self.record(Level::Error, value);
    }

    fn warn(&self, value: Loggable<'_>) {
        self.record(Level::Warn, value);
    }

    fn info(&self, value: Loggable<'_>) {
        self.record(Level::Info, value);
    }

    fn debug(&self, value: Loggable<'_>) {
        self.record(Level::Debug, value);
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("127.0.0.1", "1521", "ORCTEST", "SYSADMIN", "x")
}

pub fn user_row(id: i64, name: &str) -> Row {
    let mut row = Row::new();
    row.insert("ID".to_string(), json!(id));
    row.insert("NAME".to_string(), json!(name));
    row
}

pub fn user_rows(count: i64) -> Vec<Row> {
    (1..=count).map(|id| user_row(id, &format!("user{id}"))).collect()
}

/// Build a wrapper over `driver` reporting to a fresh recording logger.
pub fn database(
    driver: &MockDriver,
    options: PoolOptions,
) -> (PooledDatabase<MockDriver>, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::default());
    let database = PooledDatabase::new(
        driver.clone(),
        &credentials(),
        options.with_logger(logger.clone()),
    )
    .unwrap();
    (database, logger)
}
