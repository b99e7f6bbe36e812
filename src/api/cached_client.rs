//! Typed client over the shared cache store and mutation dispatcher.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::cache::{params, MutationDispatcher, Params, Store};
use crate::config::Config;
use crate::error::ErrorInfo;
use crate::event::EventSender;
use crate::query::Query;

use super::client::HttpTransport;
use super::endpoints::ops;
use super::types::{
  to_params, AnalysisRequest, AnalysisResponse, AnalysisStatusResponse, CorrelationCandidate,
  CorrelationFusionResponse, CorrelationQueuedResponse, CorrelationRequest, FeedbackListItem,
  FeedbackRequest, FeedbackResponse, IngestionRequest, IngestionResponse, IngestionStatusResponse,
  ObsidianExportRequest, ObsidianExportResponse, SearchResult, StatusResponse,
};

/// Knowledge API client with shared caching.
///
/// Reads return [`Query`] handles backed by the store, so concurrent callers
/// asking for the same thing share one request. Writes go through the
/// dispatcher and invalidate the tags their operation declares.
#[derive(Clone)]
pub struct NexusClient {
  store: Store,
  mutations: MutationDispatcher,
}

impl NexusClient {
  pub fn new(store: Store) -> Self {
    let mutations = MutationDispatcher::new(store.clone());
    Self { store, mutations }
  }

  /// Create a client talking HTTP to the configured API.
  pub fn from_config(config: &Config, events: Option<EventSender>) -> color_eyre::Result<Self> {
    let transport = HttpTransport::new(config)?;
    let mut store = Store::new(
      Arc::new(transport),
      Arc::new(config.registry()),
      config.cache_policy()?,
    );
    if let Some(events) = events {
      store = store.with_events(events);
    }
    Ok(Self::new(store))
  }

  pub fn store(&self) -> &Store {
    &self.store
  }

  pub fn mutations(&self) -> &MutationDispatcher {
    &self.mutations
  }

  /// Subscribe to an arbitrary read.
  pub fn query<T: DeserializeOwned>(&self, operation: &str, params: Params) -> Query<T> {
    Query::new(self.store.read(operation, params))
  }

  pub fn status(&self) -> Query<StatusResponse> {
    self.query(ops::GET_STATUS, Params::new())
  }

  pub fn search(&self, q: &str, limit: u32) -> Query<Vec<SearchResult>> {
    self.query(ops::SEARCH, params([("q", json!(q)), ("limit", json!(limit))]))
  }

  pub fn feedback(&self, feedback_id: &str) -> Query<FeedbackResponse> {
    self.query(ops::GET_FEEDBACK, params([("feedbackId", feedback_id)]))
  }

  pub fn list_feedback(&self, status: Option<&str>, limit: u32) -> Query<Vec<FeedbackListItem>> {
    self.query(
      ops::LIST_FEEDBACK,
      params([("status", json!(status)), ("limit", json!(limit))]),
    )
  }

  pub fn ingestion_status(&self, raw_data_id: &str) -> Query<IngestionStatusResponse> {
    self.query(ops::GET_INGESTION_STATUS, params([("rawDataId", raw_data_id)]))
  }

  pub fn analysis_status(&self, raw_data_id: &str) -> Query<AnalysisStatusResponse> {
    self.query(ops::GET_ANALYSIS_STATUS, params([("rawDataId", raw_data_id)]))
  }

  pub fn correlation_candidates(&self, raw_data_id: &str) -> Query<Vec<CorrelationCandidate>> {
    self.query(
      ops::GET_CORRELATION_CANDIDATES,
      params([("rawDataId", raw_data_id)]),
    )
  }

  pub async fn submit_feedback(&self, request: &FeedbackRequest) -> Result<FeedbackResponse, ErrorInfo> {
    self.write(ops::SUBMIT_FEEDBACK, request).await
  }

  pub async fn update_feedback(&self, feedback_id: &str, status: &str) -> Result<FeedbackListItem, ErrorInfo> {
    let args = params([("feedbackId", feedback_id), ("status", status)]);
    self.write_params(ops::UPDATE_FEEDBACK, args).await
  }

  pub async fn ingest(&self, request: &IngestionRequest) -> Result<IngestionResponse, ErrorInfo> {
    self.write(ops::INGEST, request).await
  }

  pub async fn queue_analysis(&self, raw_data_id: &str) -> Result<AnalysisResponse, ErrorInfo> {
    let request = AnalysisRequest {
      raw_data_id: raw_data_id.to_string(),
    };
    self.write(ops::QUEUE_ANALYSIS, &request).await
  }

  pub async fn queue_correlation(&self, raw_data_id: &str) -> Result<CorrelationQueuedResponse, ErrorInfo> {
    let request = CorrelationRequest {
      raw_data_id: raw_data_id.to_string(),
    };
    self.write(ops::QUEUE_CORRELATION, &request).await
  }

  pub async fn fuse_correlation(&self, raw_data_id: &str) -> Result<CorrelationFusionResponse, ErrorInfo> {
    let args = params([("rawDataId", raw_data_id)]);
    self.write_params(ops::FUSE_CORRELATION, args).await
  }

  pub async fn queue_obsidian_export(
    &self,
    request: &ObsidianExportRequest,
  ) -> Result<ObsidianExportResponse, ErrorInfo> {
    self.write(ops::QUEUE_OBSIDIAN_EXPORT, request).await
  }

  async fn write<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, ErrorInfo>
  where
    Req: Serialize,
    Resp: DeserializeOwned,
  {
    self.write_params(operation, to_params(request)?).await
  }

  async fn write_params<Resp: DeserializeOwned>(&self, operation: &str, args: Params) -> Result<Resp, ErrorInfo> {
    let value: Value = self.mutations.mutate(operation, args).await?;
    serde_json::from_value(value)
      .map_err(|e| ErrorInfo::transport(format!("unexpected response for {}: {}", operation, e)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::endpoints::default_registry;
  use crate::cache::testing::FakeTransport;
  use crate::cache::{CacheKey, CachePolicy, EntryStatus};
  use crate::error::ErrorKind;

  fn client(fake: &Arc<FakeTransport>) -> NexusClient {
    NexusClient::new(Store::new(
      fake.clone(),
      Arc::new(default_registry()),
      CachePolicy::default(),
    ))
  }

  fn hit(turn: &str, score: f64) -> Value {
    json!({
      "turnId": turn,
      "conversationId": "c1",
      "turnIndex": 0,
      "timestamp": "2024-05-01T10:00:00Z",
      "snippet": "...",
      "score": score
    })
  }

  #[tokio::test]
  async fn test_search_decodes_results() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(json!([hit("t1", 0.9), hit("t2", 0.4)])));
    let client = client(&fake);

    let results = client.search("rust", 10).into_result().await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].turn_id, "t1");
  }

  #[tokio::test]
  async fn test_equal_reads_share_one_request() {
    let fake = Arc::new(FakeTransport::new().with_delay(10));
    fake.push_read(10, Ok(json!({"status": "ok", "version": "0.3.0"})));
    let client = client(&fake);

    let mut a = client.status();
    let mut b = client.status();
    a.settle().await;
    b.settle().await;

    assert_eq!(a.data(), b.data());
    assert_eq!(fake.read_calls(ops::GET_STATUS), 1);
  }

  #[tokio::test]
  async fn test_ingest_refreshes_ingestion_but_not_search() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(50, Ok(json!([hit("1", 0.9)])));
    let client = client(&fake);

    // Two consumers subscribe while the read is in flight
    let mut first = client.search("x", 10);
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let mut second = client.search("x", 10);
    assert!(first.is_loading() && second.is_loading());

    first.settle().await;
    second.settle().await;
    assert_eq!(first.data(), second.data());
    assert_eq!(first.data().map(|r| r[0].turn_id.as_str()), Some("1"));
    assert_eq!(fake.read_calls(ops::SEARCH), 1);

    fake.push_read(0, Ok(json!({"rawDataId": "r1", "status": "pending"})));
    let mut ingestion = client.ingestion_status("r1");
    ingestion.settle().await;

    fake.push_write(0, Ok(json!({"message": "queued", "rawDataId": "r2"})));
    fake.push_read(0, Ok(json!({"rawDataId": "r1", "status": "complete"})));
    client
      .ingest(&IngestionRequest {
        source_type: "chat".to_string(),
        content: json!({"turns": []}),
        metadata: None,
        source_id: None,
      })
      .await
      .unwrap();

    assert!(ingestion.poll());
    assert!(ingestion.is_loading());
    ingestion.settle().await;
    assert_eq!(ingestion.data().map(|s| s.status.as_str()), Some("complete"));
    assert_eq!(fake.read_calls(ops::GET_INGESTION_STATUS), 2);

    // Different tag, untouched
    assert!(!first.poll());
    assert!(first.is_success());
    assert_eq!(fake.read_calls(ops::SEARCH), 1);
  }

  #[tokio::test]
  async fn test_unfiltered_list_omits_status() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(json!([])));
    let client = client(&fake);

    let query = client.list_feedback(None, 50);
    assert_eq!(
      query.subscription().key(),
      &CacheKey::new(ops::LIST_FEEDBACK, params([("limit", 50)]))
    );
  }

  #[tokio::test]
  async fn test_submit_feedback_refreshes_lists() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(json!([])));
    fake.push_write(0, Ok(json!({"message": "received", "feedbackId": "fb-1"})));
    let client = client(&fake);

    let mut list = client.list_feedback(None, 50);
    list.settle().await;

    let response = client
      .submit_feedback(&FeedbackRequest {
        feedback_type: "bug".to_string(),
        message: "results missing".to_string(),
        user_id: None,
      })
      .await
      .unwrap();
    assert_eq!(response.feedback_id, "fb-1");

    let (op, args) = fake.last_write().unwrap();
    assert_eq!(op, ops::SUBMIT_FEEDBACK);
    assert_eq!(args.get("type"), Some(&json!("bug")));

    list.settle().await;
    assert_eq!(fake.read_calls(ops::LIST_FEEDBACK), 2);
  }

  #[tokio::test]
  async fn test_not_found_surfaces_on_query() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Err(ErrorInfo::not_found("Feedback fb-9 not found")));
    let client = client(&fake);

    let mut query = client.feedback("fb-9");
    query.settle().await;
    assert_eq!(query.error().map(|e| e.kind), Some(ErrorKind::NotFound));
    assert_eq!(
      client.store().peek(query.subscription().key()).status,
      EntryStatus::Error
    );
  }

  #[tokio::test]
  async fn test_blank_raw_data_id_rejected() {
    let fake = Arc::new(FakeTransport::new());
    let client = client(&fake);

    let err = client.queue_analysis("  ").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(fake.write_calls(ops::QUEUE_ANALYSIS), 0);
  }
}
