//! Error types for pooled database access.
//!
//! Every driver failure is wrapped in a [`DbError`] variant naming the stage
//! that failed. The driver error itself is carried unchanged so callers can
//! inspect or downcast it exactly as the driver produced it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError<E> {
    #[error("failed to create pool")]
    PoolCreation(#[source] E),

    #[error("failed to release pool")]
    PoolRelease(#[source] E),

    #[error("failed to get connection")]
    ConnectionAcquisition(#[source] E),

    #[error("query failed")]
    QueryExecution(#[source] E),

    #[error("error fetching data from query")]
    ResultFetch(#[source] E),

    /// A fetched row could not be deserialized into the requested type.
    #[error("failed to decode row {index}: {source}")]
    RowDecode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl<E> DbError<E> {
    /// Short name of the stage that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::PoolCreation(_) => "create pool",
            Self::PoolRelease(_) => "release pool",
            Self::ConnectionAcquisition(_) => "get connection",
            Self::QueryExecution(_) => "execute query",
            Self::ResultFetch(_) => "fetch rows",
            Self::RowDecode { .. } => "decode row",
        }
    }

    /// Borrow the underlying driver error, if this error came from the driver.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::PoolCreation(e)
            | Self::PoolRelease(e)
            | Self::ConnectionAcquisition(e)
            | Self::QueryExecution(e)
            | Self::ResultFetch(e) => Some(e),
            Self::RowDecode { .. } => None,
        }
    }

    /// Take the underlying driver error, if this error came from the driver.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::PoolCreation(e)
            | Self::PoolRelease(e)
            | Self::ConnectionAcquisition(e)
            | Self::QueryExecution(e)
            | Self::ResultFetch(e) => Some(e),
            Self::RowDecode { .. } => None,
        }
    }

    /// Check if repeating the same call may succeed.
    ///
    /// Pool state is left consistent on these failures: a failed creation
    /// leaves no pool behind and a failed release keeps the pool for another
    /// attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolCreation(_) | Self::PoolRelease(_) | Self::ConnectionAcquisition(_)
        )
    }
}

/// Result type alias for wrapper operations over a driver error `E`.
pub type DbResult<T, E> = Result<T, DbError<E>>;

/// Errors that can occur when validating pool options.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool_max must be greater than 0")]
    ZeroPoolMax,

    #[error("pool_min ({min}) cannot exceed pool_max ({max})")]
    PoolMinExceedsMax { min: u32, max: u32 },

    #[error("prefetch_rows must be greater than 0")]
    ZeroPrefetchRows,

    #[error("pool alias cannot be empty")]
    EmptyAlias,
}
