//! Content index for the depot repository manager.
//!
//! Remembers which concrete store served a path when it was requested
//! through a given store, so repeated lookups through deep group hierarchies
//! skip the member-by-member scan.
//!
//! # Architecture
//!
//! - [`ContentIndex`]: the concurrent `(store, path) → origin` map
//! - [`ContentResolver`]: resolves a path through a store (group or
//!   concrete), consulting and populating the index
//! - [`IndexInvalidator`] / [`AuthoritativeIndexGuard`]: registry event
//!   listeners that keep the index consistent with store changes
//! - [`ContentSource`]: the physical content layer the resolver probes
//!
//! The index is a cache: clearing or disabling it never changes what
//! [`ContentResolver::locate`] returns.

pub mod cache;
pub mod config;
pub mod error;
pub mod observer;
pub mod resolve;
pub mod source;

// Re-exports for convenience.
pub use cache::{normalize_path, CacheStats, ContentIndex, IndexEntry, IndexedStorePath};
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use observer::{attach, AuthoritativeIndexGuard, IndexInvalidator};
pub use resolve::ContentResolver;
pub use source::{ContentSource, FsContentSource, MemoryContentSource};
