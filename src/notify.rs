//! User-facing alerts. Only the newest notification still queued is shown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Success,
  Error,
  Warning,
  Info,
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Severity::Success => "success",
      Severity::Error => "error",
      Severity::Warning => "warning",
      Severity::Info => "info",
    };
    f.write_str(label)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub id: u64,
  pub severity: Severity,
  pub message: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct NotificationQueue {
  items: Vec<Notification>,
  next_id: u64,
}

impl NotificationQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a notification and return its id.
  pub fn push(&mut self, severity: Severity, message: impl Into<String>) -> u64 {
    self.next_id += 1;
    self.items.push(Notification {
      id: self.next_id,
      severity,
      message: message.into(),
      created_at: Utc::now(),
    });
    self.next_id
  }

  /// Remove the notification with `id`, wherever it sits in the queue.
  pub fn dismiss(&mut self, id: u64) -> bool {
    let before = self.items.len();
    self.items.retain(|n| n.id != id);
    self.items.len() != before
  }

  /// The notification on display: the newest one still queued.
  pub fn current(&self) -> Option<&Notification> {
    self.items.last()
  }

  pub fn clear(&mut self) {
    self.items.clear();
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Notification> {
    self.items.iter()
  }
}

/// Display timer for the visible notification.
///
/// The hosting surface calls [`AutoDismiss::tick`] periodically. A
/// notification that stays on top for `duration` is dismissed exactly as if
/// the user had closed it. The clock restarts whenever a different
/// notification becomes visible.
#[derive(Debug)]
pub struct AutoDismiss {
  duration: Duration,
  shown: Option<(u64, Instant)>,
}

impl AutoDismiss {
  pub fn new(duration: Duration) -> Self {
    Self {
      duration,
      shown: None,
    }
  }

  pub fn duration(&self) -> Duration {
    self.duration
  }

  /// Returns the id dismissed on this tick, if any.
  pub fn tick(&mut self, queue: &mut NotificationQueue, now: Instant) -> Option<u64> {
    let current = queue.current().map(|n| n.id);
    match (current, self.shown) {
      (None, _) => {
        self.shown = None;
        None
      }
      (Some(id), Some((shown_id, since))) if id == shown_id => {
        if now.saturating_duration_since(since) < self.duration {
          return None;
        }
        queue.dismiss(id);
        self.shown = queue.current().map(|n| (n.id, now));
        Some(id)
      }
      (Some(id), _) => {
        self.shown = Some((id, now));
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_dismissing_newest_reveals_previous() {
    let mut queue = NotificationQueue::new();
    let a = queue.push(Severity::Info, "A");
    let b = queue.push(Severity::Error, "B");
    assert_eq!(queue.current().map(|n| n.id), Some(b));

    assert!(queue.dismiss(b));
    assert_eq!(queue.current().map(|n| n.id), Some(a));
  }

  #[test]
  fn test_dismissing_hidden_keeps_current() {
    let mut queue = NotificationQueue::new();
    let a = queue.push(Severity::Info, "A");
    let b = queue.push(Severity::Success, "B");

    assert!(queue.dismiss(a));
    assert_eq!(queue.current().map(|n| n.id), Some(b));
    assert_eq!(queue.len(), 1);
  }

  #[test]
  fn test_dismiss_unknown_is_noop() {
    let mut queue = NotificationQueue::new();
    queue.push(Severity::Warning, "A");
    assert!(!queue.dismiss(999));
    assert_eq!(queue.len(), 1);

    queue.clear();
    assert!(queue.current().is_none());
  }

  #[test]
  fn test_ids_are_unique() {
    let mut queue = NotificationQueue::new();
    let a = queue.push(Severity::Info, "same");
    let b = queue.push(Severity::Info, "same");
    assert_ne!(a, b);
  }

  #[test]
  fn test_auto_dismiss_after_duration() {
    let mut queue = NotificationQueue::new();
    let mut timer = AutoDismiss::new(Duration::from_secs(6));
    let start = Instant::now();

    let a = queue.push(Severity::Info, "A");
    let b = queue.push(Severity::Error, "B");

    assert_eq!(timer.tick(&mut queue, start), None);
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(5)), None);
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(6)), Some(b));

    // A becomes visible and gets its own full window
    assert_eq!(queue.current().map(|n| n.id), Some(a));
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(11)), None);
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(12)), Some(a));
    assert!(queue.is_empty());
  }

  #[test]
  fn test_auto_dismiss_restarts_when_newer_arrives() {
    let mut queue = NotificationQueue::new();
    let mut timer = AutoDismiss::new(Duration::from_secs(6));
    let start = Instant::now();

    queue.push(Severity::Info, "A");
    timer.tick(&mut queue, start);

    let b = queue.push(Severity::Info, "B");
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(4)), None);
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(9)), None);
    assert_eq!(timer.tick(&mut queue, start + Duration::from_secs(10)), Some(b));
  }
}
