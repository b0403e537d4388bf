//! Error types for Redis store operations.
//!
//! Every error converts into [`StoreError`] so the memoizer handles Redis
//! failures like those of any other store.

use std::time::Duration;

use obcache_backend::StoreError;
use redis::RedisError;

/// Error type for Redis store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error returned by the Redis client or server.
    #[error("Redis store error: {0}")]
    Redis(#[from] RedisError),

    /// Establishing the connection failed.
    #[error("Redis connection failed: {0}")]
    Connect(#[source] RedisError),

    /// The connection was not established within the configured timeout.
    #[error("Redis connection timed out after {0:?}")]
    ConnectTimeout(Duration),
}

impl From<Error> for StoreError {
    fn from(error: Error) -> Self {
        match error {
            Error::Redis(ref inner)
                if inner.is_io_error() || inner.is_connection_dropped() || inner.is_timeout() =>
            {
                Self::Connection(Box::new(error))
            }
            Error::Redis(_) => Self::Internal(Box::new(error)),
            Error::Connect(_) | Error::ConnectTimeout(_) => Self::Connection(Box::new(error)),
        }
    }
}
