//! Connection pool management.
//!
//! [`PooledDatabase`] owns at most one driver pool. The pool is opened on the
//! first [`PooledDatabase::get_connection`] call and torn down by
//! [`PooledDatabase::release_pool`]; the next connection request after a
//! release opens a fresh one.
//!
//! # Pool slot states
//!
//! `absent -> creating -> present -> absent`
//!
//! The slot is a `tokio::sync::Mutex<Option<Arc<Pool>>>` held for the whole
//! create (and close) call, so concurrent first callers wait for a single
//! creation and then share its handle. Connections are checked out through a
//! cloned `Arc` after the lock is dropped.

use crate::config::PoolOptions;
use crate::db::driver::Driver;
use crate::error::{ConfigError, DbError, DbResult};
use crate::logging::{Loggable, Logger, TracingLogger};
use crate::models::{Credentials, PoolAttributes};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Pooled access to one database through driver `D`.
pub struct PooledDatabase<D: Driver> {
    pub(crate) driver: D,
    attributes: PoolAttributes,
    pool_close_timeout: Duration,
    pub(crate) prefetch_rows: u32,
    pub(crate) logger: Arc<dyn Logger>,
    pool: Mutex<Option<Arc<D::Pool>>>,
}

impl<D: Driver> PooledDatabase<D> {
    /// Create a wrapper. No pool is opened until the first connection request.
    ///
    /// The alias defaults to the credentials' sid.
    pub fn new(
        driver: D,
        credentials: &Credentials,
        options: PoolOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;

        let attributes = PoolAttributes {
            user: credentials.user.clone(),
            password: credentials.password.clone(),
            connection_string: credentials.connection_string(),
            pool_alias: options.alias_or(&credentials.sid),
            pool_min: options.pool_min_or_default(),
            pool_max: options.pool_max_or_default(),
            pool_increment: options.pool_increment_or_default(),
        };

        Ok(Self {
            driver,
            attributes,
            pool_close_timeout: options.pool_close_timeout_or_default(),
            prefetch_rows: options.prefetch_rows_or_default(),
            logger: options
                .logger
                .unwrap_or_else(|| Arc::new(TracingLogger) as Arc<dyn Logger>),
            pool: Mutex::new(None),
        })
    }

    /// Alias under which the pool is registered.
    pub fn alias(&self) -> &str {
        &self.attributes.pool_alias
    }

    /// Attributes handed to the driver when the pool is opened.
    pub fn pool_attributes(&self) -> &PoolAttributes {
        &self.attributes
    }

    /// Rows requested per fetch.
    pub fn prefetch_rows(&self) -> u32 {
        self.prefetch_rows
    }

    /// Drain timeout used by [`Self::release_pool`].
    pub fn pool_close_timeout(&self) -> Duration {
        self.pool_close_timeout
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Check if a pool is currently held.
    pub async fn is_pool_open(&self) -> bool {
        self.pool.lock().await.is_some()
    }

    /// Return the live pool, creating it if none exists.
    ///
    /// A failed creation leaves the slot empty; the next call tries again.
    pub async fn ensure_pool(&self) -> DbResult<Arc<D::Pool>, D::Error> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }

        match self.driver.create_pool(&self.attributes).await {
            Ok(pool) => {
                let pool = Arc::new(pool);
                *slot = Some(Arc::clone(&pool));
                Ok(pool)
            }
            Err(err) => {
                self.log_failure("failed to create pool", &err);
                Err(DbError::PoolCreation(err))
            }
        }
    }

    /// Check a connection out of the pool, opening the pool first if needed.
    ///
    /// The caller owns the connection and must hand it back with
    /// [`Self::release_connection`].
    pub async fn get_connection(&self) -> DbResult<D::Connection, D::Error> {
        let pool = self.ensure_pool().await?;
        self.driver
            .get_connection(&pool, self.alias())
            .await
            .map_err(|err| {
                self.log_failure("failed to get connection", &err);
                DbError::ConnectionAcquisition(err)
            })
    }

    /// Return a connection obtained from [`Self::get_connection`].
    pub async fn release_connection(&self, connection: D::Connection) -> Result<(), D::Error> {
        self.driver.release_connection(connection).await
    }

    /// Close the pool, waiting up to the configured drain timeout for
    /// checked-out connections.
    ///
    /// Does nothing when no pool is held. If closing fails the pool is kept,
    /// so the call can be repeated.
    pub async fn release_pool(&self) -> DbResult<(), D::Error> {
        let mut slot = self.pool.lock().await;
        let Some(pool) = slot.as_ref() else {
            return Ok(());
        };

        match self.driver.close_pool(pool, self.pool_close_timeout).await {
            Ok(()) => {
                *slot = None;
                self.logger.info(Loggable::Text("pool released"));
                Ok(())
            }
            Err(err) => {
                self.log_failure("failed to release pool", &err);
                Err(DbError::PoolRelease(err))
            }
        }
    }

    /// Report a driver failure as two events: the tag, then the raw error.
    pub(crate) fn log_failure(&self, tag: &str, err: &D::Error) {
        self.logger.error(Loggable::Text(tag));
        self.logger.error(Loggable::Error(err));
    }
}

impl<D: Driver + std::fmt::Debug> std::fmt::Debug for PooledDatabase<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledDatabase")
            .field("driver", &self.driver)
            .field("attributes", &self.attributes)
            .field("pool_close_timeout", &self.pool_close_timeout)
            .field("prefetch_rows", &self.prefetch_rows)
            .finish_non_exhaustive()
    }
}
