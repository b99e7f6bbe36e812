//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::key::{CacheKey, Params};
use super::tags::Tag;
use crate::error::ErrorInfo;

/// The remote call contract.
///
/// Any request/response transport satisfying this asynchronous contract can
/// back the store. Futures are `'static` so they can be driven on a spawned
/// task after the caller has moved on.
pub trait Transport: Send + Sync + 'static {
  /// Perform a read operation.
  fn perform_read(&self, operation: &str, params: &Params) -> BoxFuture<'static, Result<Value, ErrorInfo>>;

  /// Perform a write operation.
  fn perform_write(&self, operation: &str, args: &Params) -> BoxFuture<'static, Result<Value, ErrorInfo>>;
}

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
  /// No fetch has been issued for this key
  Uninitialized,
  /// A fetch is in flight and no fresh result has arrived yet
  Loading,
  /// The last fetch succeeded; `data` is present
  Success,
  /// The last fetch failed; `error` is present
  Error,
  /// Invalidated while nobody was subscribed; refetched on next subscribe
  Stale,
}

/// Snapshot of one cache entry, as observed by subscribers.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub key: CacheKey,
  pub status: EntryStatus,
  /// Last good result. Kept while refetching and after a later failure.
  pub data: Option<Arc<Value>>,
  pub error: Option<ErrorInfo>,
  pub fetched_at: Option<DateTime<Utc>>,
  pub subscriber_count: usize,
  pub tags: BTreeSet<Tag>,
  /// A request is in flight, including background revalidation of a success
  pub is_fetching: bool,
}

impl CacheEntry {
  /// Snapshot for a key that has no entry.
  pub fn uninitialized(key: CacheKey) -> Self {
    Self {
      key,
      status: EntryStatus::Uninitialized,
      data: None,
      error: None,
      fetched_at: None,
      subscriber_count: 0,
      tags: BTreeSet::new(),
      is_fetching: false,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.status == EntryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == EntryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == EntryStatus::Error
  }

  /// A result (good or bad) is available and nothing is in flight.
  pub fn is_settled(&self) -> bool {
    matches!(self.status, EntryStatus::Success | EntryStatus::Error) && !self.is_fetching
  }

  /// Decode the cached data into a typed value.
  ///
  /// Returns `None` when no data is cached. A shape mismatch is reported as
  /// a transport error since the remote answered with something unexpected.
  pub fn decode<T: DeserializeOwned>(&self) -> Option<Result<T, ErrorInfo>> {
    self.data.as_ref().map(|value| {
      T::deserialize(value.as_ref()).map_err(|e| {
        ErrorInfo::transport(format!("unexpected response for {}: {}", self.key, e))
      })
    })
  }
}
