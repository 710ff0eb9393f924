//! Core data model for the depot repository manager.
//!
//! An artifact store is one of three kinds:
//! - **Remote**: proxies an upstream URL
//! - **Hosted**: holds locally deployed content
//! - **Group**: an ordered list of other stores, searched front to back
//!
//! Every store is identified by a [`StoreKey`] of the form
//! `packageType:storeType:name`.

pub mod error;
pub mod key;
pub mod store;

// Re-exports for convenience.
pub use error::{ModelError, Result};
pub use key::{StoreKey, StoreType, GENERIC_HTTP, MAVEN, NPM};
pub use store::{ArtifactStore, Group, HostedRepository, RemoteRepository, StoreSettings};
