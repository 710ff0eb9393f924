//! Store registry for the depot repository manager.
//!
//! Owns the authoritative set of store definitions and everything derived
//! from them: the reverse "affected by" index, group flattening, and the
//! change events other components use to keep their caches honest.
//!
//! # Architecture
//!
//! - **Snapshot reads**: the store map lives behind an `ArcSwap`; readers
//!   never block, writers publish a new map.
//! - **Per-key writes**: mutations of one key are serialized by a keyed lock
//!   with a timeout; different keys proceed in parallel.
//! - **Events**: every successful write is announced after it is visible,
//!   either inline or on a bounded worker pool.
//! - **Persistence**: definitions are written through a pluggable backend
//!   before they become visible.

pub mod affected;
pub mod config;
pub mod error;
pub mod event;
pub mod lock;
pub mod persist;
pub mod pool;
pub mod query;
pub mod registry;
pub mod resolve;

// Re-exports for convenience.
pub use affected::AffectedByIndex;
pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use event::{
    Delivery, EventDispatcher, StoreChange, StoreDeletePostEvent, StoreEvent, StoreEventListener,
    StorePostUpdateEvent, UpdateType,
};
pub use lock::{KeyGuard, KeyLocks};
pub use persist::{FlatFilePersistence, MemoryPersistence, StorePersistence};
pub use pool::WorkerPool;
pub use query::StoreQuery;
pub use registry::{IfExists, StoreLookup, StoreMap, StoreRegistry};
pub use resolve::{ordered_concrete_stores, ordered_stores_in_group};
