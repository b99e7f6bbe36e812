//! Typed view over a cache subscription.
//!
//! Inspired by TanStack Query, a `Query<T>` wraps a [`Subscription`] and
//! decodes the shared cache entry into `T`, exposing loading, success and
//! error states to whatever surface renders it.
//!
//! # Example
//!
//! ```ignore
//! let mut query: Query<Vec<SearchResult>> = client.search("rust", 10);
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(e),
//!     QueryState::Idle => {}
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::cache::{CacheEntry, EntryStatus, Subscription};
use crate::error::ErrorInfo;

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Nothing has been fetched for this key
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ErrorInfo),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&ErrorInfo> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

/// Typed query over a shared cache entry.
///
/// Several queries for the same key share one entry and one request. The
/// query releases its subscriber slot when dropped.
pub struct Query<T> {
  subscription: Subscription,
  state: QueryState<T>,
  refreshing: bool,
  fetched_at: Option<DateTime<Utc>>,
  _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Query<T> {
  pub fn new(subscription: Subscription) -> Self {
    let mut query = Self {
      subscription,
      state: QueryState::Idle,
      refreshing: false,
      fetched_at: None,
      _marker: PhantomData,
    };
    let entry = query.subscription.latest().clone();
    query.apply(&entry);
    query
  }

  /// Get the current state of the query.
  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  /// Get the data if the query succeeded.
  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&ErrorInfo> {
    self.state.error()
  }

  /// A background revalidation is running while the last value is shown.
  pub fn is_refreshing(&self) -> bool {
    self.refreshing
  }

  /// Check if the data is older than `stale_time`.
  pub fn is_stale(&self, stale_time: Duration) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| Utc::now() - t > stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  pub fn subscription(&self) -> &Subscription {
    &self.subscription
  }

  /// Force a refetch unless one is already in flight.
  pub fn refetch(&self) -> bool {
    self.subscription.refetch()
  }

  /// Pick up any snapshots that arrived since the last call.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick
  /// handler.
  pub fn poll(&mut self) -> bool {
    if !self.subscription.poll() {
      return false;
    }
    let entry = self.subscription.latest().clone();
    self.apply(&entry);
    true
  }

  /// Wait until the entry holds a result and return the resulting state.
  pub async fn settle(&mut self) -> &QueryState<T> {
    let entry = self.subscription.settled().await;
    self.apply(&entry);
    &self.state
  }

  /// Consume the query, returning the decoded data or the error.
  pub async fn into_result(mut self) -> Result<T, ErrorInfo> {
    self.settle().await;
    match std::mem::replace(&mut self.state, QueryState::Idle) {
      QueryState::Success(data) => Ok(data),
      QueryState::Error(e) => Err(e),
      QueryState::Idle | QueryState::Loading => Err(ErrorInfo::transport(format!(
        "{} ended without a result",
        self.subscription.key()
      ))),
    }
  }

  fn apply(&mut self, entry: &CacheEntry) {
    self.refreshing = entry.is_fetching && entry.status == EntryStatus::Success;
    self.fetched_at = entry.fetched_at;
    self.state = match entry.status {
      EntryStatus::Uninitialized => QueryState::Idle,
      EntryStatus::Loading | EntryStatus::Stale => QueryState::Loading,
      EntryStatus::Success => match entry.decode::<T>() {
        Some(Ok(data)) => QueryState::Success(data),
        Some(Err(e)) => QueryState::Error(e),
        None => QueryState::Loading,
      },
      EntryStatus::Error => QueryState::Error(
        entry
          .error
          .clone()
          .unwrap_or_else(|| ErrorInfo::transport("request failed")),
      ),
    };
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", self.subscription.key())
      .field("state", &self.state)
      .field("refreshing", &self.refreshing)
      .finish_non_exhaustive()
  }
}
