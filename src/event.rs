use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cache::{CacheKey, Tag};
use crate::error::ErrorInfo;

/// Lifecycle events published by the store and the mutation dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
  FetchStarted {
    key: CacheKey,
  },
  FetchSucceeded {
    key: CacheKey,
  },
  FetchFailed {
    key: CacheKey,
    error: ErrorInfo,
  },
  Invalidated {
    tags: BTreeSet<Tag>,
    refetched: usize,
    marked_stale: usize,
  },
  MutationSucceeded {
    operation: String,
  },
  MutationFailed {
    operation: String,
    error: ErrorInfo,
  },
}

/// Application events
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
  /// Something happened in the sync layer
  Sync(SyncEvent),
  /// Periodic tick for timers such as notification expiry
  Tick,
}

/// Cloneable handle used by the sync layer to publish events
#[derive(Debug, Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
  pub fn emit(&self, event: SyncEvent) {
    // Receiver may be gone during shutdown
    let _ = self.tx.send(Event::Sync(event));
  }
}

/// Event handler that merges sync events with a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let tick_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      loop {
        interval.tick().await;
        if tick_tx.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Event handler without a tick source, for callers that only need sync events
  pub fn without_ticks() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  pub fn sender(&self) -> EventSender {
    EventSender {
      tx: self.tx.clone(),
    }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }

  /// Take an event if one is queued, without waiting
  pub fn try_next(&mut self) -> Option<Event> {
    self.rx.try_recv().ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_sender_delivers_sync_events() {
    let mut events = EventHandler::without_ticks();
    events.sender().emit(SyncEvent::MutationSucceeded {
      operation: "ingest".to_string(),
    });

    assert_eq!(
      events.try_next(),
      Some(Event::Sync(SyncEvent::MutationSucceeded {
        operation: "ingest".to_string()
      }))
    );
    assert_eq!(events.try_next(), None);
  }

  #[tokio::test]
  async fn test_ticks_arrive() {
    let mut events = EventHandler::new(Duration::from_millis(5));
    assert_eq!(events.next().await, Some(Event::Tick));
  }
}
