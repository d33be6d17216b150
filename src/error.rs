//! Error types for the cache.

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cache.
///
/// All variants are cheap to clone because a single refresh outcome may have
/// to be delivered to several held requesters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The data source explicitly has no value for the key.
    /// Terminal: surfaced to the caller and never cached.
    #[error("no data for key: {0}")]
    NotFound(String),

    /// Transient failure reported by the data source. Recovered locally by
    /// serving stale data when any exists.
    #[error("data source failure: {0}")]
    Source(String),

    /// A refresh for the key is suppressed by backoff and there is no cached
    /// value to fall back to.
    #[error("refresh backed off, no cached value")]
    Backoff,

    /// The caller-side wait or a leader forward timed out. The underlying
    /// refresh keeps running and still updates the cache.
    #[error("operation timed out")]
    Timeout,

    /// The request shape does not match the cached value, e.g. a range
    /// request against a non-list value.
    #[error("bad response shape: {0}")]
    BadResponseShape(&'static str),

    /// Forwarding the request to the cluster leader failed.
    #[error("leader forward failed: {0}")]
    Forward(String),

    /// The data source does not implement modify.
    #[error("modify not supported by data source")]
    ModifyUnsupported,

    /// The owning worker is gone (pool shut down).
    #[error("cache worker closed")]
    WorkerClosed,

    /// Network or serialization error in the transport layer.
    #[error("network error: {0}")]
    Network(String),
}

impl Error {
    /// Shorthand for a transient data source failure.
    pub fn source(msg: impl Into<String>) -> Self {
        Error::Source(msg.into())
    }

    /// Shorthand for a forwarding failure.
    pub fn forward(msg: impl Into<String>) -> Self {
        Error::Forward(msg.into())
    }

    /// Shorthand for a not-found failure, keyed by the key's debug form.
    pub fn not_found(key: impl std::fmt::Debug) -> Self {
        Error::NotFound(format!("{key:?}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Network(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::not_found("user:1");
        assert_eq!(e.to_string(), "no data for key: \"user:1\"");

        let e = Error::source("db down");
        assert_eq!(e.to_string(), "data source failure: db down");
    }

    #[test]
    fn test_error_clone_for_fanout() {
        let e = Error::Timeout;
        let copies: Vec<Error> = (0..3).map(|_| e.clone()).collect();
        assert!(copies.iter().all(|c| *c == Error::Timeout));
    }
}
