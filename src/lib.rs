//! Client-side sync layer for the Nexus knowledge API.
//!
//! Reads go through a shared, tag-indexed query cache with reference-counted
//! subscriptions; writes go through a mutation dispatcher that invalidates
//! dependent entries on success. Interaction state and the notification
//! queue are plain reducers the presentation layer drives.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod notify;
pub mod query;
pub mod state;

pub use api::NexusClient;
pub use cache::{CacheEntry, CacheKey, EntryStatus, MutationDispatcher, Store, Subscription, Tag};
pub use error::{ErrorInfo, ErrorKind};
pub use query::{Query, QueryState};
