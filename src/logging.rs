//! Pluggable event sink for wrapper events.
//!
//! The wrapper reports through an injected [`Logger`] rather than calling
//! `tracing` directly, so callers can route or capture its events. When no
//! logger is supplied, [`TracingLogger`] forwards everything to `tracing`.

use std::fmt;

/// A value handed to a [`Logger`].
#[derive(Clone, Copy)]
pub enum Loggable<'a> {
    /// Human-readable message
    Text(&'a str),
    /// Raw error as produced by the driver
    Error(&'a (dyn std::error::Error + 'a)),
    /// Any other value, logged through its `Debug` representation
    Value(&'a (dyn fmt::Debug + 'a)),
}

impl fmt::Display for Loggable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Error(e) => write!(f, "{e}"),
            Self::Value(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Debug for Loggable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Error(e) => f.debug_tuple("Error").field(&e.to_string()).finish(),
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
        }
    }
}

impl<'a> From<&'a str> for Loggable<'a> {
    fn from(s: &'a str) -> Self {
        Self::Text(s)
    }
}

/// Severity-leveled event sink.
///
/// Implementations must not fail; a logger that cannot write drops the event.
pub trait Logger: Send + Sync {
    fn error(&self, value: Loggable<'_>);
    fn warn(&self, value: Loggable<'_>);
    fn info(&self, value: Loggable<'_>);
    fn debug(&self, value: Loggable<'_>);

    /// Finer than debug. Defaults to [`Logger::debug`].
    fn verbose(&self, value: Loggable<'_>) {
        self.debug(value);
    }
}

/// Logger that forwards to `tracing` under the `pooled_sql` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, value: Loggable<'_>) {
        tracing::error!(target: "pooled_sql", "{value}");
    }

    fn warn(&self, value: Loggable<'_>) {
        tracing::warn!(target: "pooled_sql", "{value}");
    }

    fn info(&self, value: Loggable<'_>) {
        tracing::info!(target: "pooled_sql", "{value}");
    }

    fn debug(&self, value: Loggable<'_>) {
        tracing::debug!(target: "pooled_sql", "{value}");
    }

    fn verbose(&self, value: Loggable<'_>) {
        tracing::trace!(target: "pooled_sql", "{value}");
    }
}
