#![warn(missing_docs)]
//! # obcache-core
//!
//! Key derivation types for the obcache memoization layer.
//!
//! Every memoized call is identified by a [`CacheKey`]: the identifier of the
//! wrapped operation plus a structural fingerprint of its arguments. This crate
//! holds the pieces needed to build such keys and is shared by the memoizer and
//! by every store implementation:
//!
//! - [`CacheKey`] - the fixed-shape key used for lookups
//! - [`KeyGenerator`] / [`derive_key`] - fingerprinting of serializable arguments
//! - [`SkipPositions`] - argument indices excluded from fingerprinting

pub mod fingerprint;
pub mod key;

pub use fingerprint::{DEFAULT_MAX_DEPTH, KeyError, KeyGenerator, SkipPositions, derive_key};
pub use key::CacheKey;

/// Raw byte data type used for serialized cache values.
/// Using `Bytes` provides efficient zero-copy cloning via reference counting.
pub type Raw = bytes::Bytes;
