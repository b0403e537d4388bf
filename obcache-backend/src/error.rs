//! Error types for store operations.

use crate::format::FormatError;
use thiserror::Error;

/// Error type for store operations.
///
/// The memoizer never fails a call because of a store error: reads that fail
/// are treated as misses and failed writes are logged and dropped. Operator
/// facing calls (warmup, invalidate) report them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Internal store error, state or computation error.
    ///
    /// Any error not related to network interaction.
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),

    /// Network interaction error.
    ///
    /// Errors occurring during communication with remote stores (e.g., Redis).
    #[error(transparent)]
    Connection(Box<dyn std::error::Error + Send + Sync>),

    /// Serialization or deserialization error.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The operation is not available in the store's current mode.
    #[error("operation `{operation}` is not supported: {reason}")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Why the store refused it.
        reason: &'static str,
    },
}
