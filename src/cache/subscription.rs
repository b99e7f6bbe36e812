//! Reference-counted subscriber handle.

use futures::stream::{self, Stream};
use tokio::sync::mpsc;

use super::key::CacheKey;
use super::store::Store;
use super::traits::CacheEntry;

/// One consumer of a cache entry.
///
/// Holding the handle keeps the entry's subscriber count up. The count is
/// released by [`Subscription::unsubscribe`] or on drop, exactly once.
pub struct Subscription {
  store: Store,
  key: CacheKey,
  slot_id: u64,
  listener_id: u64,
  rx: mpsc::UnboundedReceiver<CacheEntry>,
  latest: CacheEntry,
  active: bool,
}

impl Subscription {
  pub(crate) fn new(
    store: Store,
    key: CacheKey,
    slot_id: u64,
    listener_id: u64,
    rx: mpsc::UnboundedReceiver<CacheEntry>,
    latest: CacheEntry,
  ) -> Self {
    Self {
      store,
      key,
      slot_id,
      listener_id,
      rx,
      latest,
      active: true,
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  /// Most recent snapshot this handle has seen.
  pub fn latest(&self) -> &CacheEntry {
    &self.latest
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  /// Take every queued snapshot without waiting.
  ///
  /// Returns `true` if at least one snapshot arrived.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok(entry) = self.rx.try_recv() {
      self.latest = entry;
      changed = true;
    }
    changed
  }

  /// Wait for the next snapshot.
  ///
  /// Returns `None` once the handle is unsubscribed or the entry has been
  /// destroyed by a cache reset.
  pub async fn next(&mut self) -> Option<CacheEntry> {
    if !self.active {
      return None;
    }
    let entry = self.rx.recv().await?;
    self.latest = entry.clone();
    Some(entry)
  }

  /// Wait until the entry holds a result and nothing is in flight.
  pub async fn settled(&mut self) -> CacheEntry {
    self.poll();
    while !self.latest.is_settled() {
      if self.next().await.is_none() {
        break;
      }
    }
    self.latest.clone()
  }

  /// Ask the store to retry this entry.
  pub fn refetch(&self) -> bool {
    self.store.refetch(&self.key)
  }

  /// Release this subscriber. Calling it again is a no-op.
  pub fn unsubscribe(&mut self) {
    if !self.active {
      return;
    }
    self.active = false;
    self
      .store
      .unsubscribe(&self.key, self.slot_id, self.listener_id);
  }

  /// Turn the handle into a stream of snapshots. The subscription is
  /// released when the stream is dropped.
  pub fn into_stream(self) -> impl Stream<Item = CacheEntry> {
    stream::unfold(self, |mut sub| async move {
      let entry = sub.next().await?;
      Some((entry, sub))
    })
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("status", &self.latest.status)
      .field("active", &self.active)
      .finish_non_exhaustive()
  }
}
