//! # obcache-redis
//!
//! Redis store for the obcache memoizer. Entries survive process restarts
//! and are shared between processes using the same instance id.
//!
//! ```no_run
//! use std::time::Duration;
//! use obcache_redis::RedisStore;
//!
//! # async fn run() -> Result<(), obcache_redis::Error> {
//! let store = RedisStore::builder(7)
//!     .host("cache.internal")
//!     .max_age(Duration::from_secs(300))
//!     .build()?;
//! store.connect().await?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

pub mod error;
pub mod store;

#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::store::{RedisStore, RedisStoreBuilder};
