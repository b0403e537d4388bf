use std::convert::Infallible;

use obcache_backend::{FormatError, StoreError};
use obcache_core::KeyError;
use thiserror::Error;

/// Error delivered by a memoized call or an administrative operation.
///
/// `E` is the error type of the wrapped operation. Administrative operations
/// never run the wrapped operation and use the default `Infallible`.
#[derive(Debug, Error)]
pub enum CacheError<E = Infallible> {
    /// The wrapped operation failed. Never cached.
    #[error("upstream operation failed")]
    Upstream(E),

    #[error("operation `{id}` was not created by this memoizer")]
    InvalidOperation { id: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The task serving the call was dropped before it delivered a result.
    #[error("memoized call was cancelled before completion")]
    Cancelled,
}

impl<E> CacheError<E> {
    /// Returns the upstream error, if that is what this is.
    pub fn into_upstream(self) -> Option<E> {
        match self {
            CacheError::Upstream(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, CacheError::Upstream(_))
    }
}
