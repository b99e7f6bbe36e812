//! Error values that travel through the cache boundary.
//!
//! Fetch and mutation failures are never thrown across the store. They are
//! captured as an [`ErrorInfo`] and carried on the cache entry snapshot or
//! returned to the mutation caller.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a failed remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// The remote call failed (network or status failure). Carries no partial data.
  Transport,
  /// Arguments were rejected before or by the remote service.
  Validation,
  /// The addressed resource does not exist.
  NotFound,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::Transport => write!(f, "transport error"),
      ErrorKind::Validation => write!(f, "validation error"),
      ErrorKind::NotFound => write!(f, "not found"),
    }
  }
}

/// A failure surfaced on a cache entry or mutation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ErrorInfo {
  pub kind: ErrorKind,
  pub message: String,
}

impl ErrorInfo {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  pub fn transport(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Transport, message)
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Validation, message)
  }

  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, message)
  }

  pub fn is_not_found(&self) -> bool {
    self.kind == ErrorKind::NotFound
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_includes_kind_and_message() {
    let err = ErrorInfo::not_found("feedback abc");
    assert_eq!(err.to_string(), "not found: feedback abc");
    assert!(err.is_not_found());
  }

  #[test]
  fn test_serializes_kind_in_snake_case() {
    let err = ErrorInfo::transport("connection refused");
    let json = serde_json::to_value(&err).unwrap();
    assert_eq!(json["kind"], "transport");
    assert_eq!(json["message"], "connection refused");
  }
}
