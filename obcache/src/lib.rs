//! # obcache
//!
//! Memoization for asynchronous operations.
//!
//! A [`Memoizer`] wraps an async function into a [`CachedOperation`]. Calls
//! are keyed by a structural fingerprint of their arguments; results are kept
//! in a pluggable [`Store`](obcache_backend::Store) and concurrent calls with
//! the same arguments share one invocation of the wrapped function.
//!
//! ```ignore
//! use obcache::{Memoizer, WrapOptions};
//! use obcache_moka::MokaStore;
//!
//! async fn load_user((id, trace_id): (u64, String)) -> Result<User, DbError> {
//!     // ...
//! }
//!
//! let memoizer = Memoizer::new(MokaStore::builder().max_entries(1000).build());
//! let load_user = memoizer.wrap_with(load_user, WrapOptions::new().skip([1]));
//!
//! let user = load_user.call((42, "trace-a".into())).await?;
//! ```
//!
//! ## Features
//!
//! - `moka` (default) - in-process store built by [`CacheOptions`]
//! - `redis` - redis store built by [`CacheOptions`]
//! - `metrics` - hit, miss, reset and in-flight metrics

pub mod config;
pub mod error;
mod memoizer;
pub mod metrics;
mod operation;
pub mod pending;
pub mod registry;
pub mod reset;
pub mod stats;

pub use config::{CacheOptions, ConfigError, RedisOptions};
pub use error::CacheError;
pub use memoizer::{Memoizer, MemoizerBuilder, WrapOptions};
pub use operation::{Call, CachedOperation};
pub use reset::ResetSchedule;
pub use stats::Stats;

pub use obcache_backend::{DeleteStatus, Store, StoreError};
pub use obcache_core::{CacheKey, KeyError, KeyGenerator, SkipPositions, derive_key};
