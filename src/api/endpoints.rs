//! Remote API surface: one entry per operation name.

use serde_json::Value;
use url::Url;

use crate::cache::{params, OperationKind, OperationRegistry, Params, Tag};
use crate::error::ErrorInfo;

/// Operation names used by the typed client and the shell.
pub mod ops {
  pub const GET_STATUS: &str = "getStatus";
  pub const SEARCH: &str = "search";
  pub const SUBMIT_FEEDBACK: &str = "submitFeedback";
  pub const GET_FEEDBACK: &str = "getFeedback";
  pub const LIST_FEEDBACK: &str = "listFeedback";
  pub const UPDATE_FEEDBACK: &str = "updateFeedback";
  pub const INGEST: &str = "ingest";
  pub const GET_INGESTION_STATUS: &str = "getIngestionStatus";
  pub const QUEUE_ANALYSIS: &str = "queueAnalysis";
  pub const GET_ANALYSIS_STATUS: &str = "getAnalysisStatus";
  pub const QUEUE_CORRELATION: &str = "queueCorrelation";
  pub const GET_CORRELATION_CANDIDATES: &str = "getCorrelationCandidates";
  pub const FUSE_CORRELATION: &str = "fuseCorrelation";
  pub const QUEUE_OBSIDIAN_EXPORT: &str = "queueObsidianExport";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
  Get,
  Post,
  Patch,
}

#[derive(Debug)]
pub struct Endpoint {
  pub operation: &'static str,
  pub method: HttpMethod,
  /// Path relative to the API base, with `{name}` placeholders.
  pub path: &'static str,
  pub kind: OperationKind,
  pub tags: &'static [Tag],
  pub required: &'static [&'static str],
  /// Values filled in when the caller leaves a parameter out.
  pub defaults: &'static [(&'static str, u64)],
}

pub static ENDPOINTS: &[Endpoint] = &[
  Endpoint {
    operation: ops::GET_STATUS,
    method: HttpMethod::Get,
    path: "/status",
    kind: OperationKind::Read,
    tags: &[Tag::STATUS],
    required: &[],
    defaults: &[],
  },
  Endpoint {
    operation: ops::SEARCH,
    method: HttpMethod::Get,
    path: "/search",
    kind: OperationKind::Read,
    tags: &[Tag::SEARCH],
    required: &[],
    defaults: &[("limit", 10)],
  },
  Endpoint {
    operation: ops::SUBMIT_FEEDBACK,
    method: HttpMethod::Post,
    path: "/feedback",
    kind: OperationKind::Write,
    tags: &[Tag::FEEDBACK],
    required: &["type", "message"],
    defaults: &[],
  },
  Endpoint {
    operation: ops::GET_FEEDBACK,
    method: HttpMethod::Get,
    path: "/feedback/{feedbackId}",
    kind: OperationKind::Read,
    tags: &[Tag::FEEDBACK],
    required: &[],
    defaults: &[],
  },
  Endpoint {
    operation: ops::LIST_FEEDBACK,
    method: HttpMethod::Get,
    path: "/feedback",
    kind: OperationKind::Read,
    tags: &[Tag::FEEDBACK],
    required: &[],
    defaults: &[("limit", 50)],
  },
  Endpoint {
    operation: ops::UPDATE_FEEDBACK,
    method: HttpMethod::Patch,
    path: "/feedback/{feedbackId}",
    kind: OperationKind::Write,
    tags: &[Tag::FEEDBACK],
    required: &["feedbackId", "status"],
    defaults: &[],
  },
  Endpoint {
    operation: ops::INGEST,
    method: HttpMethod::Post,
    path: "/ingest",
    kind: OperationKind::Write,
    tags: &[Tag::INGESTION],
    required: &["sourceType", "content"],
    defaults: &[],
  },
  Endpoint {
    operation: ops::GET_INGESTION_STATUS,
    method: HttpMethod::Get,
    path: "/ingest/{rawDataId}",
    kind: OperationKind::Read,
    tags: &[Tag::INGESTION],
    required: &[],
    defaults: &[],
  },
  Endpoint {
    operation: ops::QUEUE_ANALYSIS,
    method: HttpMethod::Post,
    path: "/analysis",
    kind: OperationKind::Write,
    tags: &[Tag::ANALYSIS],
    required: &["rawDataId"],
    defaults: &[],
  },
  Endpoint {
    operation: ops::GET_ANALYSIS_STATUS,
    method: HttpMethod::Get,
    path: "/analysis/{rawDataId}",
    kind: OperationKind::Read,
    tags: &[Tag::ANALYSIS],
    required: &[],
    defaults: &[],
  },
  Endpoint {
    operation: ops::QUEUE_CORRELATION,
    method: HttpMethod::Post,
    path: "/correlation",
    kind: OperationKind::Write,
    tags: &[Tag::CORRELATION],
    required: &["rawDataId"],
    defaults: &[],
  },
  Endpoint {
    operation: ops::GET_CORRELATION_CANDIDATES,
    method: HttpMethod::Get,
    path: "/correlation/{rawDataId}",
    kind: OperationKind::Read,
    tags: &[Tag::CORRELATION],
    required: &[],
    defaults: &[],
  },
  Endpoint {
    operation: ops::FUSE_CORRELATION,
    method: HttpMethod::Post,
    path: "/correlation/{rawDataId}/fuse",
    kind: OperationKind::Write,
    tags: &[Tag::CORRELATION],
    required: &["rawDataId"],
    defaults: &[],
  },
  Endpoint {
    operation: ops::QUEUE_OBSIDIAN_EXPORT,
    method: HttpMethod::Post,
    path: "/export/obsidian",
    kind: OperationKind::Write,
    tags: &[Tag::EXPORT],
    required: &["rawDataId", "exportPath"],
    defaults: &[],
  },
];

/// Look up the endpoint serving `operation`.
pub fn endpoint(operation: &str) -> Option<&'static Endpoint> {
  ENDPOINTS.iter().find(|e| e.operation == operation)
}

/// Registry built from [`ENDPOINTS`].
pub fn default_registry() -> OperationRegistry {
  ENDPOINTS
    .iter()
    .fold(OperationRegistry::new(), |registry, e| {
      let registry = match e.kind {
        OperationKind::Read => registry.read(e.operation, e.tags.iter().cloned()),
        OperationKind::Write => registry.write(e.operation, e.tags.iter().cloned(), e.required),
      };
      registry.defaults(e.operation, params(e.defaults.iter().copied()))
    })
}

/// A call ready to hand to the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
  pub method: HttpMethod,
  pub url: Url,
  /// Parameters not consumed by the path. Sent as the query string for GET
  /// and as the JSON body otherwise.
  pub rest: Params,
}

impl Endpoint {
  /// Substitute path placeholders and apply defaults.
  pub fn resolve(&self, base: &Url, params: &Params) -> Result<ResolvedRequest, ErrorInfo> {
    let mut rest = params.clone();
    for (name, value) in self.defaults {
      rest
        .entry(name.to_string())
        .or_insert_with(|| Value::from(*value));
    }

    let mut segments = Vec::new();
    for raw in self.path.split('/').filter(|s| !s.is_empty()) {
      match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(name) => {
          let value = rest.remove(name).ok_or_else(|| {
            ErrorInfo::validation(format!("{}: missing path parameter {}", self.operation, name))
          })?;
          segments.push(path_value(self.operation, name, &value)?);
        }
        None => segments.push(raw.to_string()),
      }
    }

    let mut url = base.clone();
    url
      .path_segments_mut()
      .map_err(|_| ErrorInfo::validation(format!("invalid API base URL: {}", base)))?
      .pop_if_empty()
      .extend(segments.iter());

    Ok(ResolvedRequest {
      method: self.method,
      url,
      rest,
    })
  }
}

fn path_value(operation: &str, name: &str, value: &Value) -> Result<String, ErrorInfo> {
  let text = match value {
    Value::String(s) => s.trim().to_string(),
    Value::Number(n) => n.to_string(),
    _ => String::new(),
  };
  if text.is_empty() {
    return Err(ErrorInfo::validation(format!(
      "{}: path parameter {} must be a non-empty string",
      operation, name
    )));
  }
  Ok(text)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;
  use serde_json::json;

  fn base() -> Url {
    Url::parse("http://localhost:8000/api/v1").unwrap()
  }

  #[test]
  fn test_default_registry_covers_every_endpoint() {
    let registry = default_registry();
    assert_eq!(registry.len(), ENDPOINTS.len());
    assert!(registry.provided_tags(ops::SEARCH).unwrap().contains(&Tag::SEARCH));
    assert!(registry
      .invalidated_tags(ops::INGEST)
      .unwrap()
      .contains(&Tag::INGESTION));
    // Reads cannot be used as writes
    assert!(registry.invalidated_tags(ops::SEARCH).is_err());
    let filled = registry.with_defaults(ops::LIST_FEEDBACK, Params::new());
    assert_eq!(filled.get("limit"), Some(&json!(50)));
  }

  #[test]
  fn test_search_applies_default_limit() {
    let req = endpoint(ops::SEARCH)
      .unwrap()
      .resolve(&base(), &params([("q", json!("rust"))]))
      .unwrap();
    assert_eq!(req.url.as_str(), "http://localhost:8000/api/v1/search");
    assert_eq!(req.rest.get("limit"), Some(&json!(10)));
    assert_eq!(req.rest.get("q"), Some(&json!("rust")));
  }

  #[test]
  fn test_explicit_limit_wins() {
    let req = endpoint(ops::LIST_FEEDBACK)
      .unwrap()
      .resolve(&base(), &params([("limit", json!(5))]))
      .unwrap();
    assert_eq!(req.rest.get("limit"), Some(&json!(5)));
  }

  #[test]
  fn test_path_parameters_are_consumed() {
    let req = endpoint(ops::UPDATE_FEEDBACK)
      .unwrap()
      .resolve(
        &base(),
        &params([("feedbackId", json!("fb-1")), ("status", json!("resolved"))]),
      )
      .unwrap();
    assert_eq!(req.method, HttpMethod::Patch);
    assert_eq!(req.url.path(), "/api/v1/feedback/fb-1");
    assert_eq!(req.rest, params([("status", json!("resolved"))]));

    let fuse = endpoint(ops::FUSE_CORRELATION)
      .unwrap()
      .resolve(&base(), &params([("rawDataId", json!("r 1"))]))
      .unwrap();
    assert_eq!(fuse.url.path(), "/api/v1/correlation/r%201/fuse");
    assert!(fuse.rest.is_empty());
  }

  #[test]
  fn test_missing_path_parameter() {
    let err = endpoint(ops::GET_INGESTION_STATUS)
      .unwrap()
      .resolve(&base(), &Params::new())
      .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("rawDataId"));
  }

  #[test]
  fn test_trailing_slash_base() {
    let base = Url::parse("http://example.com/api/v1/").unwrap();
    let req = endpoint(ops::GET_STATUS)
      .unwrap()
      .resolve(&base, &Params::new())
      .unwrap();
    assert_eq!(req.url.as_str(), "http://example.com/api/v1/status");
  }
}
