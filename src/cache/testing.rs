//! Scripted in-memory transport for tests.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::key::Params;
use super::traits::Transport;
use crate::error::ErrorInfo;

struct Scripted {
  delay: Duration,
  result: Result<Value, ErrorInfo>,
}

/// Records every call and answers from a script, falling back to echoing
/// the request after the default delay.
pub(crate) struct FakeTransport {
  reads: Mutex<Vec<(String, Params)>>,
  writes: Mutex<Vec<(String, Params)>>,
  read_script: Mutex<VecDeque<Scripted>>,
  write_script: Mutex<VecDeque<Scripted>>,
  delay: Duration,
}

impl FakeTransport {
  pub(crate) fn new() -> Self {
    Self {
      reads: Mutex::new(Vec::new()),
      writes: Mutex::new(Vec::new()),
      read_script: Mutex::new(VecDeque::new()),
      write_script: Mutex::new(VecDeque::new()),
      delay: Duration::ZERO,
    }
  }

  pub(crate) fn with_delay(mut self, ms: u64) -> Self {
    self.delay = Duration::from_millis(ms);
    self
  }

  /// Queue the answer for the next unscripted read.
  pub(crate) fn push_read(&self, delay_ms: u64, result: Result<Value, ErrorInfo>) {
    self.read_script.lock().unwrap().push_back(Scripted {
      delay: Duration::from_millis(delay_ms),
      result,
    });
  }

  /// Queue the answer for the next unscripted write.
  pub(crate) fn push_write(&self, delay_ms: u64, result: Result<Value, ErrorInfo>) {
    self.write_script.lock().unwrap().push_back(Scripted {
      delay: Duration::from_millis(delay_ms),
      result,
    });
  }

  pub(crate) fn read_calls(&self, operation: &str) -> usize {
    self
      .reads
      .lock()
      .unwrap()
      .iter()
      .filter(|(op, _)| op == operation)
      .count()
  }

  pub(crate) fn write_calls(&self, operation: &str) -> usize {
    self
      .writes
      .lock()
      .unwrap()
      .iter()
      .filter(|(op, _)| op == operation)
      .count()
  }

  pub(crate) fn total_reads(&self) -> usize {
    self.reads.lock().unwrap().len()
  }

  pub(crate) fn last_write(&self) -> Option<(String, Params)> {
    self.writes.lock().unwrap().last().cloned()
  }

  fn answer(
    &self,
    script: &Mutex<VecDeque<Scripted>>,
    fallback: Value,
  ) -> BoxFuture<'static, Result<Value, ErrorInfo>> {
    let scripted = script.lock().unwrap().pop_front().unwrap_or(Scripted {
      delay: self.delay,
      result: Ok(fallback),
    });
    async move {
      tokio::time::sleep(scripted.delay).await;
      scripted.result
    }
    .boxed()
  }
}

impl Transport for FakeTransport {
  fn perform_read(&self, operation: &str, params: &Params) -> BoxFuture<'static, Result<Value, ErrorInfo>> {
    let call = {
      let mut reads = self.reads.lock().unwrap();
      reads.push((operation.to_string(), params.clone()));
      reads.len()
    };
    let echo = json!({ "operation": operation, "params": params, "call": call });
    self.answer(&self.read_script, echo)
  }

  fn perform_write(&self, operation: &str, args: &Params) -> BoxFuture<'static, Result<Value, ErrorInfo>> {
    self
      .writes
      .lock()
      .unwrap()
      .push((operation.to_string(), args.clone()));
    self.answer(&self.write_script, json!({ "message": "ok", "operation": operation }))
  }
}
