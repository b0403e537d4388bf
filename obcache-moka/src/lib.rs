//! # obcache-moka
//!
//! Bounded in-process store for the obcache memoizer, built on Moka's async
//! cache. Capacity is mandatory and is either an entry count or an
//! approximate byte budget:
//!
//! ```
//! use obcache_moka::MokaStore;
//!
//! let store = MokaStore::builder()
//!     .max_entries(1_000)
//!     .build();
//! ```
#![warn(missing_docs)]

mod builder;
mod metrics;
mod store;

pub use builder::{ByteCapacity, EntryCapacity, EvictionListener, MokaStoreBuilder, NoCapacity};
pub use moka::notification::RemovalCause;
pub use moka::policy::EvictionPolicy;
pub use store::MokaStore;
