//! Canonical identity of a read operation plus its parameters.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Parameters of a remote call. Keys are kept sorted so equivalent calls
/// serialize identically.
pub type Params = BTreeMap<String, Value>;

/// Build a parameter map from `(name, value)` pairs.
pub fn params<I, K, V>(pairs: I) -> Params
where
  I: IntoIterator<Item = (K, V)>,
  K: Into<String>,
  V: Into<Value>,
{
  pairs
    .into_iter()
    .map(|(k, v)| (k.into(), v.into()))
    .collect()
}

/// Cache key for one read operation with one parameter set.
///
/// Null parameters are treated as absent, so `{status: null, limit: 50}` and
/// `{limit: 50}` address the same entry. Operation defaults are not applied
/// here; build keys through `Store::key_for` when a call may omit a
/// defaulted parameter. Immutable once constructed.
#[derive(Clone)]
pub struct CacheKey {
  operation: String,
  params: Params,
  hash: String,
}

impl CacheKey {
  pub fn new(operation: impl Into<String>, params: Params) -> Self {
    let operation = operation.into();
    let params: Params = params.into_iter().filter(|(_, v)| !v.is_null()).collect();
    let hash = cache_hash(&operation, &params);
    Self {
      operation,
      params,
      hash,
    }
  }

  /// Key for an operation that takes no parameters.
  pub fn bare(operation: impl Into<String>) -> Self {
    Self::new(operation, Params::new())
  }

  pub fn operation(&self) -> &str {
    &self.operation
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  /// Stable, fixed-length hex digest of the canonical form.
  pub fn cache_hash(&self) -> &str {
    &self.hash
  }
}

fn cache_hash(operation: &str, params: &Params) -> String {
  // BTreeMap and serde_json's default object map both serialize in key order
  let canonical = serde_json::to_string(params).unwrap_or_default();
  let input = format!("{}:{}", operation, canonical);

  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

impl PartialEq for CacheKey {
  fn eq(&self, other: &Self) -> bool {
    self.hash == other.hash
  }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.hash.hash(state);
  }
}

impl fmt::Debug for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "CacheKey({})", self)
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}(", self.operation)?;
    for (i, (name, value)) in self.params.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}={}", name, value)?;
    }
    write!(f, ")")
  }
}
