//! Request and response records exchanged with the knowledge API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::Params;
use crate::error::ErrorInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
  pub status: String,
  pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
  pub turn_id: String,
  pub conversation_id: String,
  pub turn_index: i64,
  pub timestamp: String,
  pub snippet: String,
  pub score: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sentiment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
  #[serde(rename = "type")]
  pub feedback_type: String,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
  pub message: String,
  pub feedback_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackListItem {
  pub feedback_id: String,
  pub feedback_type: String,
  pub message: String,
  pub status: String,
  pub submitted_at: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionRequest {
  pub source_type: String,
  pub content: Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Map<String, Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResponse {
  pub message: String,
  pub raw_data_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStatusResponse {
  pub raw_data_id: String,
  pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
  pub raw_data_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
  pub message: String,
  pub raw_data_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatusResponse {
  pub raw_data_id: String,
  pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationRequest {
  pub raw_data_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationQueuedResponse {
  pub message: String,
  pub raw_data_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationCandidate {
  pub id: String,
  pub raw_data_id: String,
  pub source_entity_id: String,
  pub target_entity_id: String,
  pub score: f64,
  pub status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationFusionResponse {
  pub message: String,
  pub raw_data_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsidianExportRequest {
  pub raw_data_id: String,
  pub export_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObsidianExportResponse {
  pub message: String,
  pub raw_data_id: String,
}

/// Flatten a request record into cache parameters using its wire names.
pub fn to_params<T: Serialize>(value: &T) -> Result<Params, ErrorInfo> {
  match serde_json::to_value(value) {
    Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
    Ok(other) => Err(ErrorInfo::validation(format!(
      "expected an object of named arguments, got {}",
      other
    ))),
    Err(e) => Err(ErrorInfo::validation(format!("failed to encode arguments: {}", e))),
  }
}
