//! Tag-indexed query cache for remote reads and writes.
//!
//! This module provides a transport-agnostic caching layer that:
//! - Deduplicates in-flight reads per (operation, parameters) key
//! - Reference-counts subscribers and lazily evicts idle entries
//! - Invalidates entries by resource tag after successful writes
//! - Serves the last good value while revalidating in the background

mod key;
mod mutation;
mod registry;
mod store;
mod subscription;
mod tags;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use key::{params, CacheKey, Params};
pub use mutation::{MutationDispatcher, MutationRecord, MutationStatus};
pub use registry::{OperationKind, OperationRegistry, OperationSpec};
pub use store::{CachePolicy, InvalidationReport, Store};
pub use subscription::Subscription;
pub use tags::{Tag, TagIndex};
pub use traits::{CacheEntry, EntryStatus, Transport};
