//! Write operations and the invalidation they trigger.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};

use super::key::Params;
use super::store::Store;
use super::tags::Tag;
use crate::error::ErrorInfo;
use crate::event::SyncEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
  Pending,
  Success,
  Error,
}

/// One write, as seen by the UI (e.g. to disable a submit button).
#[derive(Debug, Clone)]
pub struct MutationRecord {
  pub id: u64,
  pub operation: String,
  pub args: Params,
  pub invalidates: BTreeSet<Tag>,
  pub status: MutationStatus,
  pub error: Option<ErrorInfo>,
  pub started_at: DateTime<Utc>,
  pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Ledger {
  next_id: u64,
  pending: BTreeMap<u64, MutationRecord>,
  last: HashMap<String, MutationRecord>,
}

/// Executes writes against the transport and invalidates tags on success.
///
/// Writes are never deduplicated: two identical concurrent calls both run.
#[derive(Clone)]
pub struct MutationDispatcher {
  store: Store,
  ledger: Arc<Mutex<Ledger>>,
}

impl MutationDispatcher {
  pub fn new(store: Store) -> Self {
    Self {
      store,
      ledger: Arc::new(Mutex::new(Ledger::default())),
    }
  }

  pub fn store(&self) -> &Store {
    &self.store
  }

  /// Run a registered write, invalidating the tags the registry declares.
  pub async fn mutate(&self, operation: &str, args: Params) -> Result<Value, ErrorInfo> {
    let invalidates = match self.store.registry().invalidated_tags(operation) {
      Ok(tags) => tags.clone(),
      Err(error) => {
        let id = self.begin(operation, &args, &BTreeSet::new());
        self.finish(id, Err(&error));
        return Err(error);
      }
    };
    self.mutate_with_tags(operation, args, invalidates).await
  }

  /// Run a write with an explicit set of tags to invalidate on success.
  ///
  /// Invalidation completes before this returns, so dependent entries are
  /// already refetching when the caller sees success. A failed write
  /// invalidates nothing.
  pub async fn mutate_with_tags(
    &self,
    operation: &str,
    args: Params,
    invalidates: BTreeSet<Tag>,
  ) -> Result<Value, ErrorInfo> {
    let id = self.begin(operation, &args, &invalidates);
    let mut guard = PendingGuard {
      dispatcher: self,
      id,
      armed: true,
    };

    let result = match self.validate(operation, &args) {
      Ok(()) => {
        self
          .store
          .transport()
          .perform_write(operation, &args)
          .await
      }
      Err(error) => Err(error),
    };

    match &result {
      Ok(_) => {
        let report = self.store.invalidate(&invalidates);
        info!(
          operation,
          refetched = report.refetched.len(),
          "mutation succeeded"
        );
        self.store.emit(SyncEvent::MutationSucceeded {
          operation: operation.to_string(),
        });
      }
      Err(error) => {
        warn!(operation, %error, "mutation failed");
        self.store.emit(SyncEvent::MutationFailed {
          operation: operation.to_string(),
          error: error.clone(),
        });
      }
    }

    guard.armed = false;
    self.finish(id, result.as_ref().map(|_| ()));
    result
  }

  /// Whether a write of `operation` is currently in flight.
  pub fn is_pending(&self, operation: &str) -> bool {
    self
      .ledger()
      .pending
      .values()
      .any(|r| r.operation == operation)
  }

  /// Writes currently in flight, oldest first.
  pub fn pending(&self) -> Vec<MutationRecord> {
    self.ledger().pending.values().cloned().collect()
  }

  /// The most recently finished write of `operation`.
  pub fn last(&self, operation: &str) -> Option<MutationRecord> {
    self.ledger().last.get(operation).cloned()
  }

  fn validate(&self, operation: &str, args: &Params) -> Result<(), ErrorInfo> {
    let registry = self.store.registry();
    if registry.get(operation).is_some() {
      registry.validate_args(operation, args)
    } else {
      Ok(())
    }
  }

  fn begin(&self, operation: &str, args: &Params, invalidates: &BTreeSet<Tag>) -> u64 {
    let mut ledger = self.ledger();
    ledger.next_id += 1;
    let id = ledger.next_id;
    ledger.pending.insert(
      id,
      MutationRecord {
        id,
        operation: operation.to_string(),
        args: args.clone(),
        invalidates: invalidates.clone(),
        status: MutationStatus::Pending,
        error: None,
        started_at: Utc::now(),
        finished_at: None,
      },
    );
    id
  }

  fn finish(&self, id: u64, outcome: Result<(), &ErrorInfo>) {
    let mut ledger = self.ledger();
    let Some(mut record) = ledger.pending.remove(&id) else {
      return;
    };
    match outcome {
      Ok(()) => record.status = MutationStatus::Success,
      Err(error) => {
        record.status = MutationStatus::Error;
        record.error = Some(error.clone());
      }
    }
    record.finished_at = Some(Utc::now());
    ledger.last.insert(record.operation.clone(), record);
  }

  fn ledger(&self) -> MutexGuard<'_, Ledger> {
    match self.ledger.lock() {
      Ok(guard) => guard,
      Err(poisoned) => {
        warn!("recovered from poisoned mutation ledger lock");
        poisoned.into_inner()
      }
    }
  }
}

/// Clears the pending record if the mutation future is dropped mid-flight.
struct PendingGuard<'a> {
  dispatcher: &'a MutationDispatcher,
  id: u64,
  armed: bool,
}

impl Drop for PendingGuard<'_> {
  fn drop(&mut self) {
    if self.armed {
      self.dispatcher.ledger().pending.remove(&self.id);
    }
  }
}
