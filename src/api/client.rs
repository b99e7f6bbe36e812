use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::endpoints::{endpoint, HttpMethod, ResolvedRequest};
use crate::cache::{OperationKind, Params, Transport};
use crate::config::Config;
use crate::error::ErrorInfo;

/// HTTP transport for the knowledge API
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(config: &Config) -> color_eyre::Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .user_agent(concat!("nexus-sync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url: config.api.base_url()?,
      token: Config::get_api_token(),
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn call(
    &self,
    operation: &str,
    kind: OperationKind,
    params: &Params,
  ) -> BoxFuture<'static, Result<Value, ErrorInfo>> {
    let prepared = endpoint(operation)
      .ok_or_else(|| ErrorInfo::validation(format!("no endpoint for operation {}", operation)))
      .and_then(|e| {
        if e.kind != kind {
          return Err(ErrorInfo::validation(format!(
            "{} is not a {:?} operation",
            operation, kind
          )));
        }
        e.resolve(&self.base_url, params)
      });

    let client = self.client.clone();
    let token = self.token.clone();
    let operation = operation.to_string();
    async move { send(client, token, &operation, prepared?).await }.boxed()
  }
}

impl Transport for HttpTransport {
  fn perform_read(&self, operation: &str, params: &Params) -> BoxFuture<'static, Result<Value, ErrorInfo>> {
    self.call(operation, OperationKind::Read, params)
  }

  fn perform_write(&self, operation: &str, args: &Params) -> BoxFuture<'static, Result<Value, ErrorInfo>> {
    self.call(operation, OperationKind::Write, args)
  }
}

async fn send(
  client: reqwest::Client,
  token: Option<String>,
  operation: &str,
  request: ResolvedRequest,
) -> Result<Value, ErrorInfo> {
  debug!(operation, url = %request.url, "sending request");

  let mut builder = match request.method {
    HttpMethod::Get => client.get(request.url).query(&query_pairs(&request.rest)),
    HttpMethod::Post => client.post(request.url),
    HttpMethod::Patch => client.patch(request.url),
  };
  if request.method != HttpMethod::Get && !request.rest.is_empty() {
    builder = builder.json(&request.rest);
  }
  if let Some(token) = token {
    builder = builder.bearer_auth(token);
  }

  let response = builder
    .send()
    .await
    .map_err(|e| ErrorInfo::transport(format!("{} request failed: {}", operation, e)))?;

  let status = response.status();
  let body = response
    .bytes()
    .await
    .map_err(|e| ErrorInfo::transport(format!("{} response unreadable: {}", operation, e)))?;

  if !status.is_success() {
    return Err(status_error(operation, status, &body));
  }
  if body.is_empty() {
    return Ok(Value::Null);
  }
  serde_json::from_slice(&body)
    .map_err(|e| ErrorInfo::transport(format!("{} returned invalid JSON: {}", operation, e)))
}

/// Query strings only carry scalars; anything nested is sent as JSON text.
fn query_pairs(params: &Params) -> Vec<(String, String)> {
  params
    .iter()
    .map(|(k, v)| {
      let text = match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      (k.clone(), text)
    })
    .collect()
}

fn status_error(operation: &str, status: StatusCode, body: &[u8]) -> ErrorInfo {
  let detail = serde_json::from_slice::<Value>(body)
    .ok()
    .and_then(|v| v.get("detail").cloned())
    .map(|d| match d {
      Value::String(s) => s,
      other => other.to_string(),
    })
    .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

  let message = if detail.is_empty() {
    format!("{} failed with HTTP {}", operation, status.as_u16())
  } else {
    format!("{} failed with HTTP {}: {}", operation, status.as_u16(), detail)
  };

  match status {
    StatusCode::NOT_FOUND => ErrorInfo::not_found(message),
    StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorInfo::validation(message),
    _ => ErrorInfo::transport(message),
  }
}
