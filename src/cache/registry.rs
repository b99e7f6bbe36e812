//! Static operation table: which tags each read provides and each write
//! invalidates.
//!
//! The registry is configuration data, loaded once at start-up and shared
//! read-only by the store and the mutation dispatcher.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::key::Params;
use super::tags::Tag;
use crate::error::ErrorInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
  Read,
  Write,
}

/// Declaration for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSpec {
  pub kind: OperationKind,
  /// Tags provided (reads) or invalidated on success (writes)
  #[serde(default)]
  pub tags: BTreeSet<Tag>,
  /// Argument names that must be present before a write is dispatched
  #[serde(default)]
  pub required: Vec<String>,
  /// Values filled in for parameters the caller leaves out
  #[serde(default)]
  pub defaults: Params,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationRegistry {
  operations: BTreeMap<String, OperationSpec>,
}

impl OperationRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare a read operation and the tags its result depends on.
  pub fn read<I>(mut self, operation: &str, tags: I) -> Self
  where
    I: IntoIterator<Item = Tag>,
  {
    self.insert(
      operation,
      OperationSpec {
        kind: OperationKind::Read,
        tags: tags.into_iter().collect(),
        required: Vec::new(),
        defaults: Params::new(),
      },
    );
    self
  }

  /// Declare a write operation, the tags it invalidates and its required args.
  pub fn write<I>(mut self, operation: &str, tags: I, required: &[&str]) -> Self
  where
    I: IntoIterator<Item = Tag>,
  {
    self.insert(
      operation,
      OperationSpec {
        kind: OperationKind::Write,
        tags: tags.into_iter().collect(),
        required: required.iter().map(|s| s.to_string()).collect(),
        defaults: Params::new(),
      },
    );
    self
  }

  /// Set default parameters on an already declared operation.
  pub fn defaults(mut self, operation: &str, defaults: Params) -> Self {
    if let Some(spec) = self.operations.get_mut(operation) {
      spec.defaults = defaults;
    }
    self
  }

  pub fn insert(&mut self, operation: impl Into<String>, spec: OperationSpec) {
    self.operations.insert(operation.into(), spec);
  }

  /// Overlay `overrides` on top of this table; matching names are replaced.
  pub fn merge(&mut self, overrides: OperationRegistry) {
    self.operations.extend(overrides.operations);
  }

  pub fn get(&self, operation: &str) -> Option<&OperationSpec> {
    self.operations.get(operation)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &OperationSpec)> {
    self.operations.iter().map(|(k, v)| (k.as_str(), v))
  }

  pub fn len(&self) -> usize {
    self.operations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.operations.is_empty()
  }

  /// `params` with the operation's defaults filled in. Unknown operations
  /// get `params` back unchanged.
  pub fn with_defaults(&self, operation: &str, mut params: Params) -> Params {
    if let Some(spec) = self.operations.get(operation) {
      for (name, value) in &spec.defaults {
        params.entry(name.clone()).or_insert_with(|| value.clone());
      }
    }
    params
  }

  /// Tags a read operation's result depends on.
  pub fn provided_tags(&self, operation: &str) -> Result<&BTreeSet<Tag>, ErrorInfo> {
    self.spec_of_kind(operation, OperationKind::Read).map(|s| &s.tags)
  }

  /// Tags a write operation invalidates on success.
  pub fn invalidated_tags(&self, operation: &str) -> Result<&BTreeSet<Tag>, ErrorInfo> {
    self
      .spec_of_kind(operation, OperationKind::Write)
      .map(|s| &s.tags)
  }

  /// Reject a write whose required arguments are missing, null or blank.
  pub fn validate_args(&self, operation: &str, args: &Params) -> Result<(), ErrorInfo> {
    let spec = self.spec_of_kind(operation, OperationKind::Write)?;
    let missing: Vec<&str> = spec
      .required
      .iter()
      .filter(|name| match args.get(name.as_str()) {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
      })
      .map(String::as_str)
      .collect();

    if missing.is_empty() {
      Ok(())
    } else {
      Err(ErrorInfo::validation(format!(
        "{} is missing required argument(s): {}",
        operation,
        missing.join(", ")
      )))
    }
  }

  fn spec_of_kind(&self, operation: &str, kind: OperationKind) -> Result<&OperationSpec, ErrorInfo> {
    match self.operations.get(operation) {
      Some(spec) if spec.kind == kind => Ok(spec),
      Some(_) => Err(ErrorInfo::validation(format!(
        "operation {} is not a {} operation",
        operation,
        match kind {
          OperationKind::Read => "read",
          OperationKind::Write => "write",
        }
      ))),
      None => Err(ErrorInfo::validation(format!(
        "unknown operation: {}",
        operation
      ))),
    }
  }
}
