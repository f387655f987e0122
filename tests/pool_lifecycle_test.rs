//! Integration tests for lazy pool creation and release.
//!
//! Tests verify that:
//! - No pool exists until the first connection is requested
//! - One pool is shared by every later request, including concurrent ones
//! - A failed creation leaves no pool behind and is retried
//! - Releasing clears the pool, and the next request creates a fresh one

mod common;

use common::{Level, MockDriver, credentials, database};
use pooled_sql::config::PoolOptions;
use pooled_sql::db::PooledDatabase;
use pooled_sql::error::{ConfigError, DbError};
use std::time::Duration;

#[tokio::test]
async fn test_pool_not_created_until_first_connection() {
    let driver = MockDriver::default();
    let (db, logger) = database(&driver, PoolOptions::default());

    assert!(!db.is_pool_open().await);
    assert_eq!(driver.calls().create_pool, 0);
    assert!(logger.events().is_empty());

    let connection = db.get_connection().await.unwrap();
    db.release_connection(connection).await.unwrap();

    assert!(db.is_pool_open().await);
    let calls = driver.calls();
    assert_eq!(calls.create_pool, 1);
    assert_eq!(calls.get_connection, 1);
    assert_eq!(calls.aliases, vec!["ORCTEST".to_string()]);
}

#[tokio::test]
async fn test_pool_attributes_from_credentials() {
    let driver = MockDriver::default();
    let (db, _logger) = database(&driver, PoolOptions::default());

    db.get_connection().await.unwrap();

    let calls = driver.calls();
    let attrs = &calls.attributes[0];
    assert_eq!(attrs.user, "SYSADMIN");
    assert_eq!(attrs.password, "x");
    assert_eq!(attrs.connection_string, "127.0.0.1:1521/ORCTEST");
    assert_eq!(attrs.pool_alias, "ORCTEST");
    assert_eq!(attrs.pool_min, 0);
    assert_eq!(attrs.pool_max, 2);
    assert_eq!(attrs.pool_increment, 1);
}

#[tokio::test]
async fn test_custom_alias_and_sizes() {
    let driver = MockDriver::default();
    let options = PoolOptions {
        pool_min: Some(1),
        pool_max: Some(8),
        pool_increment: Some(2),
        ..PoolOptions::default()
    }
    .with_alias("reporting");
    let (db, _logger) = database(&driver, options);
    assert_eq!(db.alias(), "reporting");

    db.get_connection().await.unwrap();

    let calls = driver.calls();
    let attrs = &calls.attributes[0];
    assert_eq!(attrs.pool_alias, "reporting");
    assert_eq!((attrs.pool_min, attrs.pool_max, attrs.pool_increment), (1, 8, 2));
    assert_eq!(calls.aliases, vec!["reporting".to_string()]);
}

#[tokio::test]
async fn test_pool_reused_across_connections() {
    let driver = MockDriver::default();
    let (db, _logger) = database(&driver, PoolOptions::default());

    for _ in 0..3 {
        let connection = db.get_connection().await.unwrap();
        db.release_connection(connection).await.unwrap();
    }

    let calls = driver.calls();
    assert_eq!(calls.create_pool, 1);
    assert_eq!(calls.get_connection, 3);
    assert_eq!(calls.release_connection, 3);
}

#[tokio::test]
async fn test_concurrent_first_use_creates_one_pool() {
    let driver = MockDriver::default();
    driver.script().create_delay = Some(Duration::from_millis(50));
    let (db, _logger) = database(&driver, PoolOptions::default());

    let (a, b, c) = tokio::join!(db.get_connection(), db.get_connection(), db.get_connection());
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let calls = driver.calls();
    assert_eq!(calls.create_pool, 1);
    assert_eq!(calls.get_connection, 3);
}

#[tokio::test]
async fn test_pool_creation_failure_is_logged_and_retried() {
    let driver = MockDriver::default();
    driver.script().failing_creates = 1;
    let (db, logger) = database(&driver, PoolOptions::default());

    let err = db.get_connection().await.unwrap_err();
    assert!(matches!(err, DbError::PoolCreation(_)));
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "failed to create pool");
    assert_eq!(err.inner().unwrap().0, "ORA-12541: TNS:no listener");
    assert!(!db.is_pool_open().await);

    assert_eq!(
        logger.events(),
        vec![
            (Level::Error, "failed to create pool".to_string()),
            (Level::Error, "ORA-12541: TNS:no listener".to_string()),
        ]
    );

    // No pool was stored, so the next request tries again.
    db.get_connection().await.unwrap();
    assert!(db.is_pool_open().await);
    assert_eq!(driver.calls().create_pool, 2);
}

#[tokio::test]
async fn test_connection_failure_keeps_pool() {
    let driver = MockDriver::default();
    driver.script().fail_connection = true;
    let (db, logger) = database(&driver, PoolOptions::default());

    let err = db.get_connection().await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionAcquisition(_)));
    assert_eq!(
        logger.at(Level::Error),
        vec![
            "failed to get connection".to_string(),
            "ORA-24418: cannot open further sessions".to_string(),
        ]
    );
    assert!(db.is_pool_open().await);

    driver.script().fail_connection = false;
    db.get_connection().await.unwrap();
    assert_eq!(driver.calls().create_pool, 1);
}

#[tokio::test]
async fn test_release_pool_then_recreate() {
    let driver = MockDriver::default();
    let (db, logger) = database(
        &driver,
        PoolOptions::default().with_pool_close_timeout(Duration::from_secs(5)),
    );

    let connection = db.get_connection().await.unwrap();
    db.release_connection(connection).await.unwrap();
    db.release_pool().await.unwrap();

    assert!(!db.is_pool_open().await);
    assert_eq!(logger.at(Level::Info), vec!["pool released".to_string()]);
    {
        let calls = driver.calls();
        assert_eq!(calls.close_pool, 1);
        assert_eq!(calls.drain_timeouts, vec![Duration::from_secs(5)]);
    }

    db.get_connection().await.unwrap();
    assert!(db.is_pool_open().await);
    assert_eq!(driver.calls().create_pool, 2);
}

#[tokio::test]
async fn test_release_pool_without_pool_is_noop() {
    let driver = MockDriver::default();
    let (db, logger) = database(&driver, PoolOptions::default());

    db.release_pool().await.unwrap();
    db.release_pool().await.unwrap();

    assert_eq!(driver.calls().close_pool, 0);
    assert!(logger.events().is_empty());
}

#[tokio::test]
async fn test_release_pool_twice_closes_once() {
    let driver = MockDriver::default();
    let (db, logger) = database(&driver, PoolOptions::default());

    db.get_connection().await.unwrap();
    db.release_pool().await.unwrap();
    db.release_pool().await.unwrap();

    assert_eq!(driver.calls().close_pool, 1);
    assert_eq!(logger.at(Level::Info).len(), 1);
}

#[tokio::test]
async fn test_release_pool_failure_keeps_pool() {
    let driver = MockDriver::default();
    driver.script().fail_close = true;
    let (db, logger) = database(&driver, PoolOptions::default());

    db.get_connection().await.unwrap();
    let err = db.release_pool().await.unwrap_err();

    assert!(matches!(err, DbError::PoolRelease(_)));
    assert_eq!(err.to_string(), "failed to release pool");
    assert!(db.is_pool_open().await);
    assert_eq!(
        logger.at(Level::Error),
        vec![
            "failed to release pool".to_string(),
            "ORA-24422: connections still in use".to_string(),
        ]
    );
    assert!(logger.at(Level::Info).is_empty());

    // The pool was kept, so releasing can be retried.
    driver.script().fail_close = false;
    db.release_pool().await.unwrap();
    assert!(!db.is_pool_open().await);
    assert_eq!(driver.calls().close_pool, 2);
    assert_eq!(driver.calls().create_pool, 1);
}

#[tokio::test]
async fn test_invalid_options_rejected() {
    let zero_max = PoolOptions {
        pool_max: Some(0),
        ..PoolOptions::default()
    };
    let result = PooledDatabase::new(MockDriver::default(), &credentials(), zero_max);
    assert!(matches!(result, Err(ConfigError::ZeroPoolMax)));

    let min_over_max = PoolOptions {
        pool_min: Some(4),
        pool_max: Some(2),
        ..PoolOptions::default()
    };
    let result = PooledDatabase::new(MockDriver::default(), &credentials(), min_over_max);
    assert!(matches!(
        result,
        Err(ConfigError::PoolMinExceedsMax { min: 4, max: 2 })
    ));

    let zero_prefetch = PoolOptions::default().with_prefetch_rows(0);
    let result = PooledDatabase::new(MockDriver::default(), &credentials(), zero_prefetch);
    assert!(matches!(result, Err(ConfigError::ZeroPrefetchRows)));
}
