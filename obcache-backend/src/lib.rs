//! Traits and structs for obcache store interaction.
//!
//! If you want to plug in your own storage engine, you are in the right place:
//! implement [`Store`] and hand it to the memoizer.
mod error;
pub mod format;
mod store;

pub use error::StoreError;
pub use format::{FormatError, JsonFormat};
pub use store::{Store, StoreResult};

/// Status of deleting result.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Record successfully deleted.
    Deleted(u32),
    /// Record already missing.
    Missing,
}
