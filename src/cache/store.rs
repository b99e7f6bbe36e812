//! Process-wide query cache.
//!
//! The store owns every cache entry and the tag index. All state changes go
//! through one mutex that is never held across an `.await`, so transitions of
//! a given entry are serialized even when completions interleave.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::key::{CacheKey, Params};
use super::registry::OperationRegistry;
use super::subscription::Subscription;
use super::tags::{Tag, TagIndex};
use super::traits::{CacheEntry, EntryStatus, Transport};
use crate::error::ErrorInfo;
use crate::event::{EventSender, SyncEvent};

/// Freshness and retention knobs.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
  /// Age after which a successful entry is revalidated in the background
  /// when a new subscriber arrives. `None` disables revalidation.
  pub max_age: Option<Duration>,
  /// How many zero-subscriber entries are retained before the least
  /// recently used one is evicted.
  pub retain_idle: usize,
}

impl Default for CachePolicy {
  fn default() -> Self {
    Self {
      max_age: None,
      retain_idle: 64,
    }
  }
}

/// Outcome of an invalidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
  /// Subscribed entries that were sent back to loading
  pub refetched: Vec<CacheKey>,
  /// Unsubscribed entries marked stale
  pub marked_stale: Vec<CacheKey>,
}

type Listener = (u64, mpsc::UnboundedSender<CacheEntry>);

struct Slot {
  /// Distinguishes this entry from one recreated under the same key
  id: u64,
  key: CacheKey,
  tags: BTreeSet<Tag>,
  status: EntryStatus,
  data: Option<Arc<Value>>,
  error: Option<ErrorInfo>,
  fetched_at: Option<DateTime<Utc>>,
  /// Id of the last issued request; only its completion is applied
  generation: u64,
  /// The request for `generation` has not completed yet
  in_flight: bool,
  listeners: Vec<Listener>,
}

impl Slot {
  fn new(id: u64, key: CacheKey, tags: BTreeSet<Tag>) -> Self {
    Self {
      id,
      key,
      tags,
      status: EntryStatus::Uninitialized,
      data: None,
      error: None,
      fetched_at: None,
      generation: 0,
      in_flight: false,
      listeners: Vec::new(),
    }
  }

  fn snapshot(&self) -> CacheEntry {
    CacheEntry {
      key: self.key.clone(),
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      subscriber_count: self.listeners.len(),
      tags: self.tags.clone(),
      is_fetching: self.in_flight,
    }
  }

  fn broadcast(&self) {
    let snapshot = self.snapshot();
    for (_, tx) in &self.listeners {
      // A closed receiver belongs to a handle that is about to unsubscribe
      let _ = tx.send(snapshot.clone());
    }
  }
}

struct Inner {
  slots: HashMap<CacheKey, Slot>,
  tags: TagIndex,
  /// Zero-subscriber keys, least recently idled first
  idle: LruCache<CacheKey, ()>,
  next_id: u64,
  events: Option<EventSender>,
}

impl Inner {
  fn emit(&self, event: SyncEvent) {
    if let Some(events) = &self.events {
      events.emit(event);
    }
  }

  fn remove(&mut self, key: &CacheKey) {
    if let Some(slot) = self.slots.remove(key) {
      self.tags.remove(key, &slot.tags);
      debug!(%key, "evicted cache entry");
    }
  }

  /// Evict idle entries beyond `capacity`, skipping ones with a request in
  /// flight so their result still lands in the cache.
  fn enforce_retention(&mut self, capacity: usize) {
    let mut deferred = Vec::new();
    while self.idle.len() > capacity {
      let Some((key, ())) = self.idle.pop_lru() else {
        break;
      };
      match self.slots.get(&key) {
        Some(slot) if slot.in_flight => deferred.push(key),
        Some(_) => self.remove(&key),
        None => {}
      }
    }
    for key in deferred {
      self.idle.put(key, ());
    }
  }
}

struct Shared {
  inner: Mutex<Inner>,
  transport: Arc<dyn Transport>,
  registry: Arc<OperationRegistry>,
  policy: CachePolicy,
}

/// Handle to the cache store. Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct Store {
  shared: Arc<Shared>,
}

impl Store {
  pub fn new(
    transport: Arc<dyn Transport>,
    registry: Arc<OperationRegistry>,
    policy: CachePolicy,
  ) -> Self {
    Self {
      shared: Arc::new(Shared {
        inner: Mutex::new(Inner {
          slots: HashMap::new(),
          tags: TagIndex::new(),
          idle: LruCache::unbounded(),
          next_id: 0,
          events: None,
        }),
        transport,
        registry,
        policy,
      }),
    }
  }

  /// Publish lifecycle events to `events`.
  pub fn with_events(self, events: EventSender) -> Self {
    self.lock("with_events").events = Some(events);
    self
  }

  pub fn registry(&self) -> &OperationRegistry {
    &self.shared.registry
  }

  pub fn policy(&self) -> CachePolicy {
    self.shared.policy
  }

  pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
    &self.shared.transport
  }

  pub(crate) fn emit(&self, event: SyncEvent) {
    self.lock("emit").emit(event);
  }

  /// Subscribe to `operation` with `params`, after filling in the
  /// operation's registered defaults.
  pub fn read(&self, operation: &str, params: Params) -> Subscription {
    self.subscribe(self.key_for(operation, params))
  }

  /// Cache key for `operation` with registered defaults applied, so calls
  /// that spell a default out and calls that omit it share one entry.
  pub fn key_for(&self, operation: &str, params: Params) -> CacheKey {
    CacheKey::new(operation, self.shared.registry.with_defaults(operation, params))
  }

  /// Add a subscriber to `key`, creating the entry and fetching as needed.
  ///
  /// Joining an entry that is already loading never issues a second
  /// request. The returned handle first yields the entry's current snapshot
  /// and then every later transition.
  pub fn subscribe(&self, key: CacheKey) -> Subscription {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut guard = self.lock("subscribe");
    let inner = &mut *guard;

    let registry = &self.shared.registry;
    let Inner {
      slots,
      tags,
      idle,
      next_id,
      events,
    } = inner;

    let slot = slots.entry(key.clone()).or_insert_with(|| {
      *next_id += 1;
      let provided = registry
        .provided_tags(key.operation())
        .cloned()
        .unwrap_or_default();
      tags.insert(&key, &provided);
      debug!(%key, "created cache entry");
      Slot::new(*next_id, key.clone(), provided)
    });
    idle.pop(&key);

    *next_id += 1;
    let listener_id = *next_id;
    slot.listeners.push((listener_id, tx.clone()));

    let needs_fetch = !slot.in_flight
      && match slot.status {
        EntryStatus::Uninitialized | EntryStatus::Stale | EntryStatus::Error => true,
        EntryStatus::Success => self.is_expired(slot),
        EntryStatus::Loading => false,
      };

    if needs_fetch {
      let revalidate = slot.status == EntryStatus::Success;
      self.start_fetch(slot, events.as_ref(), revalidate);
      slot.broadcast();
    } else {
      if slot.in_flight {
        debug!(%key, "joined in-flight request");
      }
      let _ = tx.send(slot.snapshot());
    }

    Subscription::new(self.clone(), key, slot.id, listener_id, rx, slot.snapshot())
  }

  /// Remove one listener. Unknown listeners are ignored, so duplicate
  /// teardown never double-decrements.
  pub(crate) fn unsubscribe(&self, key: &CacheKey, slot_id: u64, listener_id: u64) {
    let mut guard = self.lock("unsubscribe");
    let inner = &mut *guard;

    let Some(slot) = inner.slots.get_mut(key) else {
      return;
    };
    if slot.id != slot_id {
      return;
    }

    let before = slot.listeners.len();
    slot.listeners.retain(|(id, _)| *id != listener_id);
    if slot.listeners.len() == before {
      return;
    }

    if slot.listeners.is_empty() {
      debug!(%key, "cache entry has no subscribers");
      inner.idle.put(key.clone(), ());
      inner.enforce_retention(self.shared.policy.retain_idle);
    }
  }

  /// Invalidate every entry tagged with any of `tags`.
  ///
  /// Subscribed entries go back to loading and refetch immediately; any
  /// request already in flight for them is superseded. Unsubscribed entries
  /// are only marked stale and refetch when a subscriber next arrives.
  pub fn invalidate(&self, tags: &BTreeSet<Tag>) -> InvalidationReport {
    let mut guard = self.lock("invalidate");
    let inner = &mut *guard;
    let mut report = InvalidationReport::default();

    for key in inner.tags.keys_for(tags) {
      let Some(slot) = inner.slots.get_mut(&key) else {
        continue;
      };

      if slot.listeners.is_empty() {
        slot.status = EntryStatus::Stale;
        // Drop whatever is in flight; it may predate the write
        slot.generation += 1;
        slot.in_flight = false;
        report.marked_stale.push(key);
      } else {
        self.start_fetch(slot, inner.events.as_ref(), false);
        slot.broadcast();
        report.refetched.push(key);
      }
    }

    info!(
      tags = ?tags,
      refetched = report.refetched.len(),
      marked_stale = report.marked_stale.len(),
      "invalidated tags"
    );
    inner.emit(SyncEvent::Invalidated {
      tags: tags.clone(),
      refetched: report.refetched.len(),
      marked_stale: report.marked_stale.len(),
    });

    report
  }

  /// Explicitly retry `key`. Returns false when the entry does not exist or
  /// already has a request in flight.
  pub fn refetch(&self, key: &CacheKey) -> bool {
    let mut guard = self.lock("refetch");
    let inner = &mut *guard;

    let Some(slot) = inner.slots.get_mut(key) else {
      return false;
    };
    if slot.in_flight {
      return false;
    }

    let revalidate = slot.status == EntryStatus::Success;
    self.start_fetch(slot, inner.events.as_ref(), revalidate);
    slot.broadcast();
    true
  }

  /// Drop every entry. Live subscriptions see their stream end.
  pub fn reset(&self) {
    let mut guard = self.lock("reset");
    let dropped = guard.slots.len();
    guard.slots.clear();
    guard.tags.clear();
    guard.idle.clear();
    info!(dropped, "cache reset");
  }

  /// Current snapshot for `key`, or an uninitialized one if absent.
  pub fn peek(&self, key: &CacheKey) -> CacheEntry {
    self
      .lock("peek")
      .slots
      .get(key)
      .map(Slot::snapshot)
      .unwrap_or_else(|| CacheEntry::uninitialized(key.clone()))
  }

  /// Snapshots of every entry, ordered by key.
  pub fn entries(&self) -> Vec<CacheEntry> {
    let guard = self.lock("entries");
    let mut entries: Vec<CacheEntry> = guard.slots.values().map(Slot::snapshot).collect();
    entries.sort_by_key(|e| e.key.to_string());
    entries
  }

  pub fn len(&self) -> usize {
    self.lock("len").slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of zero-subscriber entries currently retained.
  pub fn idle_len(&self) -> usize {
    self.lock("idle_len").idle.len()
  }

  fn is_expired(&self, slot: &Slot) -> bool {
    match (self.shared.policy.max_age, slot.fetched_at) {
      (Some(max_age), Some(fetched_at)) => Utc::now() - fetched_at > max_age,
      (Some(_), None) => true,
      (None, _) => false,
    }
  }

  /// Issue a new request for `slot`, superseding any earlier one.
  ///
  /// With `revalidate` the status is left alone so consumers keep showing
  /// the last good value until the new result arrives.
  fn start_fetch(&self, slot: &mut Slot, events: Option<&EventSender>, revalidate: bool) {
    let key = slot.key.clone();

    if let Err(error) = self.shared.registry.provided_tags(key.operation()) {
      warn!(%key, %error, "refusing to fetch unregistered operation");
      slot.status = EntryStatus::Error;
      slot.error = Some(error.clone());
      slot.in_flight = false;
      if let Some(events) = events {
        events.emit(SyncEvent::FetchFailed { key, error });
      }
      return;
    }

    slot.generation += 1;
    slot.in_flight = true;
    if !revalidate {
      slot.status = EntryStatus::Loading;
      slot.error = None;
    }
    debug!(%key, generation = slot.generation, revalidate, "fetch started");
    if let Some(events) = events {
      events.emit(SyncEvent::FetchStarted { key: key.clone() });
    }

    let future = self
      .shared
      .transport
      .perform_read(key.operation(), key.params());
    let weak = Arc::downgrade(&self.shared);
    let slot_id = slot.id;
    let generation = slot.generation;

    tokio::spawn(async move {
      let result = future.await;
      if let Some(shared) = weak.upgrade() {
        Store { shared }.complete(&key, slot_id, generation, result);
      }
    });
  }

  /// Apply a finished request, unless a newer one was issued meanwhile.
  fn complete(
    &self,
    key: &CacheKey,
    slot_id: u64,
    generation: u64,
    result: Result<Value, ErrorInfo>,
  ) {
    let mut guard = self.lock("complete");
    let inner = &mut *guard;

    let Some(slot) = inner.slots.get_mut(key) else {
      debug!(%key, "cache entry gone before fetch completed");
      return;
    };
    if slot.id != slot_id || slot.generation != generation {
      debug!(%key, generation, "discarding superseded fetch result");
      return;
    }

    slot.in_flight = false;
    let event = match result {
      Ok(value) => {
        slot.status = EntryStatus::Success;
        slot.data = Some(Arc::new(value));
        slot.error = None;
        slot.fetched_at = Some(Utc::now());
        debug!(%key, subscribers = slot.listeners.len(), "fetch succeeded");
        SyncEvent::FetchSucceeded { key: key.clone() }
      }
      Err(error) => {
        warn!(%key, %error, "fetch failed");
        slot.status = EntryStatus::Error;
        slot.error = Some(error.clone());
        SyncEvent::FetchFailed {
          key: key.clone(),
          error,
        }
      }
    };
    slot.broadcast();

    inner.emit(event);
    inner.enforce_retention(self.shared.policy.retain_idle);
  }

  fn lock(&self, op: &'static str) -> MutexGuard<'_, Inner> {
    match self.shared.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => {
        warn!(op, "recovered from poisoned cache lock");
        poisoned.into_inner()
      }
    }
  }
}
