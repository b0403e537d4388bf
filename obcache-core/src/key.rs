//! Cache key type.
//!
//! A [`CacheKey`] has two components joined by a colon:
//!
//! 1. **Operation** - the identifier of the wrapped operation (e.g. `fetch_user0`)
//! 2. **Fingerprint** - 16 lowercase hex digits of the argument hash
//!
//! ```
//! use obcache_core::CacheKey;
//!
//! let key = CacheKey::new("fetch_user0", 0xdead_beef);
//! assert_eq!(key.as_str(), "fetch_user0:00000000deadbeef");
//! assert_eq!(key.operation(), "fetch_user0");
//! assert_eq!(key.fingerprint(), Some(0xdead_beef));
//! ```
//!
//! ## Performance
//!
//! [`CacheKey`] wraps a [`SmolStr`]: short keys are stored inline and longer
//! ones share a reference-counted buffer, so cloning never copies the key.

use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::fmt;

/// Separator between the operation identifier and the fingerprint.
const SEPARATOR: char = ':';

/// A cache key identifying one memoized computation.
///
/// Keys are produced by [`KeyGenerator`](crate::KeyGenerator) and compared by
/// their string form. Two calls with equal (filtered) arguments to the same
/// operation always produce equal keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(SmolStr);

impl CacheKey {
    /// Creates a key from an operation identifier and an argument fingerprint.
    pub fn new(operation: &str, fingerprint: u64) -> Self {
        Self(format_smolstr!("{operation}{SEPARATOR}{fingerprint:016x}"))
    }

    /// Returns the key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the operation identifier part of the key.
    pub fn operation(&self) -> &str {
        self.0
            .rsplit_once(SEPARATOR)
            .map_or(self.0.as_str(), |(operation, _)| operation)
    }

    /// Returns the argument fingerprint, if the key has the expected shape.
    pub fn fingerprint(&self) -> Option<u64> {
        let (_, hex) = self.0.rsplit_once(SEPARATOR)?;
        u64::from_str_radix(hex, 16).ok()
    }

    /// Returns the estimated memory usage of this key in bytes.
    ///
    /// SmolStr stores strings up to 23 bytes inline; longer keys live on the heap.
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.0.len().saturating_sub(23)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self(SmolStr::new(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_may_contain_separator() {
        let key = CacheKey::new("ns:load", 1);
        assert_eq!(key.operation(), "ns:load");
        assert_eq!(key.fingerprint(), Some(1));
    }

    #[test]
    fn foreign_keys_have_no_fingerprint() {
        let key = CacheKey::from("plain");
        assert_eq!(key.operation(), "plain");
        assert_eq!(key.fingerprint(), None);
    }
}
