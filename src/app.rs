use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::api::types::{
  AnalysisStatusResponse, FeedbackListItem, FeedbackRequest, IngestionRequest,
  IngestionStatusResponse, ObsidianExportRequest, SearchResult,
};
use crate::api::NexusClient;
use crate::commands::{self, COMMANDS};
use crate::config::Config;
use crate::error::ErrorInfo;
use crate::event::{Event, EventHandler, SyncEvent};
use crate::notify::{AutoDismiss, NotificationQueue, Severity};
use crate::query::{Query, QueryState};
use crate::state::{
  feedback_state, search_state, FeedbackPatch, FeedbackState, PaginationPatch, SearchSort,
  SearchState, SortDirection,
};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Status queries kept live for one ingested data item
struct Watch {
  ingestion: Query<IngestionStatusResponse>,
  analysis: Query<AnalysisStatusResponse>,
}

/// Interactive session: cached client, per-surface state and alerts
pub struct App {
  config: Config,
  client: NexusClient,

  search: SearchState,
  feedback: FeedbackState,

  /// Live subscriptions for what is on display. Invalidation refetches them.
  active_search: Option<Query<Vec<SearchResult>>>,
  active_feedback: Option<Query<Vec<FeedbackListItem>>>,
  watches: BTreeMap<String, Watch>,

  notifications: NotificationQueue,
  auto_dismiss: AutoDismiss,
  shown_notification: Option<u64>,

  events: Option<EventHandler>,
  output: Vec<String>,
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let events = EventHandler::new(TICK_RATE);
    let client = NexusClient::from_config(&config, Some(events.sender()))?;
    Ok(Self::with_client(config, client, events))
  }

  /// Build a session around an existing client. The client's store should
  /// publish to `events` so background failures reach the notification queue.
  pub fn with_client(config: Config, client: NexusClient, events: EventHandler) -> Self {
    let display = Duration::from_secs(config.notifications.display_secs);
    Self {
      search: search_state(&config.search),
      feedback: feedback_state(&config.feedback),
      config,
      client,
      active_search: None,
      active_feedback: None,
      watches: BTreeMap::new(),
      notifications: NotificationQueue::new(),
      auto_dismiss: AutoDismiss::new(display),
      shown_notification: None,
      events: Some(events),
      output: Vec::new(),
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = self
      .events
      .take()
      .ok_or_else(|| eyre!("Session is already running"))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(base_url = %self.config.api.base_url, "shell started");
    self.say("nexus-sync shell. Type `help` for commands.");
    self.flush()?;
    prompt()?;

    while !self.should_quit {
      tokio::select! {
        line = lines.next_line() => {
          match line? {
            Some(line) => self.execute(&line).await,
            None => self.should_quit = true,
          }
          self.process_pending(&mut events);
          self.flush()?;
          if !self.should_quit {
            prompt()?;
          }
        }
        Some(event) = events.next() => {
          self.handle_event(event);
          if self.has_output() {
            println!();
            self.flush()?;
            prompt()?;
          }
        }
      }
    }

    self.events = Some(events);
    Ok(())
  }

  /// Run one command outside the shell and print what it produced.
  pub async fn run_once(&mut self, line: &str) -> Result<()> {
    self.execute(line).await;
    self.finish()
  }

  /// Handle queued events and print any pending output.
  pub fn finish(&mut self) -> Result<()> {
    self.drain_events();
    self.flush()
  }

  /// Handle every event that is already queued.
  pub fn drain_events(&mut self) {
    if let Some(mut events) = self.events.take() {
      self.process_pending(&mut events);
      self.events = Some(events);
    }
  }

  fn process_pending(&mut self, events: &mut EventHandler) {
    while let Some(event) = events.try_next() {
      self.handle_event(event);
    }
  }

  pub fn handle_event(&mut self, event: Event) {
    match event {
      Event::Tick => {
        self.refresh_views();
        if let Some(id) = self.auto_dismiss.tick(&mut self.notifications, Instant::now()) {
          debug!(id, "notification expired");
        }
      }
      Event::Sync(SyncEvent::FetchFailed { key, error }) => {
        self
          .notifications
          .push(Severity::Error, format!("{} failed: {}", key.operation(), error.message));
      }
      Event::Sync(event) => debug!(?event, "sync event"),
    }
    self.show_notification();
  }

  pub async fn execute(&mut self, line: &str) {
    let line = line.trim();
    if line.is_empty() {
      return;
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
      Some((verb, rest)) => (verb, rest.trim()),
      None => (line, ""),
    };

    let Some(cmd) = commands::resolve(verb) else {
      self.say(format!("Unknown command: {} (try `help`)", verb));
      return;
    };

    match cmd.name {
      "search" => self.search(rest, None).await,
      "status" => self.show_status().await,
      "feedback" => {
        let status = (!rest.is_empty()).then_some(rest);
        self.list_feedback(status).await;
      }
      "submit" => self.submit_feedback(rest).await,
      "update" => self.update_feedback(rest).await,
      "ingest" => self.ingest(rest).await,
      "analyze" => self.queue_analysis(rest).await,
      "correlate" => self.queue_correlation(rest).await,
      "candidates" => self.show_candidates(rest).await,
      "fuse" => self.fuse(rest).await,
      "export" => self.export(rest).await,
      "watch" => self.watch(rest),
      "unwatch" => {
        if self.watches.remove(rest).is_some() {
          self.say(format!("Stopped watching {}", rest));
        } else {
          self.say(format!("Not watching {}", rest));
        }
      }
      "sort" => self.sort(rest),
      "filter" => self.filter(rest),
      "page" => match rest.parse::<u32>() {
        Ok(page) if page > 0 => {
          self.search.set_pagination(PaginationPatch {
            page: Some(page),
            ..Default::default()
          });
          self.render_search();
        }
        _ => self.usage(cmd),
      },
      "history" => {
        if rest == "clear" {
          self.search.clear_history();
          self.say("Search history cleared");
        } else {
          let entries = self.search.history().entries().to_vec();
          if entries.is_empty() {
            self.say("No recent searches");
          }
          for (i, entry) in entries.iter().enumerate() {
            self.say(format!("{:>3}  {}", i + 1, entry));
          }
        }
      }
      "clear" => {
        self.search.clear();
        self.active_search = None;
        self.say("Search cleared");
      }
      "notifications" => {
        let lines: Vec<String> = self
          .notifications
          .iter()
          .map(|n| format!("#{} [{}] {}", n.id, n.severity, n.message))
          .collect();
        if lines.is_empty() {
          self.say("No notifications");
        }
        for line in lines {
          self.say(line);
        }
      }
      "dismiss" => {
        let id = if rest.is_empty() {
          self.notifications.current().map(|n| n.id)
        } else {
          rest.trim_start_matches('#').parse().ok()
        };
        if !id.is_some_and(|id| self.notifications.dismiss(id)) {
          self.say("Nothing to dismiss");
        }
        self.show_notification();
      }
      "refresh" => {
        let mut started = 0;
        if let Some(q) = &self.active_search {
          started += q.refetch() as usize;
        }
        if let Some(q) = &self.active_feedback {
          started += q.refetch() as usize;
        }
        for watch in self.watches.values() {
          started += watch.ingestion.refetch() as usize;
          started += watch.analysis.refetch() as usize;
        }
        self.say(format!("Refreshing {} queries", started));
      }
      "help" => {
        for c in COMMANDS {
          self.say(format!("{:<45} {}", c.usage, c.description));
        }
      }
      "quit" => self.should_quit = true,
      _ => self.usage(cmd),
    }

    self.show_notification();
  }

  /// Run a search and keep it subscribed so later invalidation refreshes it.
  pub async fn search(&mut self, text: &str, limit: Option<u32>) {
    let text = text.trim();
    if text.is_empty() {
      self.say("Usage: search <query>");
      return;
    }
    let limit = limit.unwrap_or(self.config.search.default_limit);

    self.search.set_query(text);
    self.search.set_pagination(PaginationPatch {
      page: Some(1),
      limit: Some(limit),
      total: None,
    });
    self.search.set_busy(true);

    let mut query = self.client.search(text, limit);
    query.settle().await;

    self.search.set_busy(false);
    self.search.set_last_run_at(Utc::now());
    if let QueryState::Success(results) = query.state() {
      self.search.set_results(results.clone());
      self.search.record_history(text);
      self.render_search();
    }
    self.active_search = Some(query);
  }

  pub async fn show_status(&mut self) {
    match self.client.status().into_result().await {
      Ok(status) => self.say(format!("API {} (version {})", status.status, status.version)),
      Err(e) => debug!(%e, "status unavailable"),
    }
  }

  pub async fn list_feedback(&mut self, status: Option<&str>) {
    let limit = self.feedback.pagination().limit;
    self.feedback.set_filters([("status", status.map(Value::from))]);

    let mut query = self.client.list_feedback(status, limit);
    query.settle().await;
    if let QueryState::Success(items) = query.state() {
      self.feedback.set_results(items.clone());
      self.render_feedback();
    }
    self.active_feedback = Some(query);
  }

  async fn submit_feedback(&mut self, args: &str) {
    let Some((kind, message)) = args.split_once(char::is_whitespace) else {
      self.say("Usage: submit <type> <message>");
      return;
    };
    let request = FeedbackRequest {
      feedback_type: kind.to_string(),
      message: message.trim().to_string(),
      user_id: None,
    };

    self.feedback.set_busy(true);
    let result = self.client.submit_feedback(&request).await;
    self.feedback.set_busy(false);
    self.feedback.set_last_run_at(Utc::now());

    if let Ok(response) = &result {
      self.say(format!("Feedback id {}", response.feedback_id));
    }
    self.report(result.map(|r| r.message), "Feedback submitted");
  }

  async fn update_feedback(&mut self, args: &str) {
    let Some((id, status)) = args.split_once(char::is_whitespace) else {
      self.say("Usage: update <feedbackId> <status>");
      return;
    };
    let status = status.trim();
    let result = self.client.update_feedback(id, status).await;
    if result.is_ok() {
      self.feedback.update_item(
        id,
        FeedbackPatch {
          status: Some(status.to_string()),
          ..Default::default()
        },
      );
    }
    self.report(result.map(|_| format!("{} is now {}", id, status)), "Feedback updated");
  }

  async fn ingest(&mut self, args: &str) {
    let Some((source_type, content)) = args.split_once(char::is_whitespace) else {
      self.say("Usage: ingest <sourceType> <json>");
      return;
    };
    let content: Value = match serde_json::from_str(content.trim()) {
      Ok(content) => content,
      Err(e) => {
        let error = ErrorInfo::validation(format!("content is not valid JSON: {}", e));
        self.report::<String>(Err(error), "");
        return;
      }
    };
    let request = IngestionRequest {
      source_type: source_type.to_string(),
      content,
      metadata: None,
      source_id: None,
    };
    let result = self.client.ingest(&request).await;
    self.report(
      result.map(|r| format!("{} (raw data {})", r.message, r.raw_data_id)),
      "Ingestion queued",
    );
  }

  async fn queue_analysis(&mut self, raw_data_id: &str) {
    let result = self.client.queue_analysis(raw_data_id).await;
    self.report(result.map(|r| r.message), "Analysis queued");
  }

  async fn queue_correlation(&mut self, raw_data_id: &str) {
    let result = self.client.queue_correlation(raw_data_id).await;
    self.report(result.map(|r| r.message), "Correlation queued");
  }

  async fn fuse(&mut self, raw_data_id: &str) {
    let result = self.client.fuse_correlation(raw_data_id).await;
    self.report(result.map(|r| r.message), "Fusion started");
  }

  async fn export(&mut self, args: &str) {
    let Some((raw_data_id, path)) = args.split_once(char::is_whitespace) else {
      self.say("Usage: export <rawDataId> <path>");
      return;
    };
    let request = ObsidianExportRequest {
      raw_data_id: raw_data_id.to_string(),
      export_path: path.trim().to_string(),
    };
    let result = self.client.queue_obsidian_export(&request).await;
    self.report(result.map(|r| r.message), "Export queued");
  }

  async fn show_candidates(&mut self, raw_data_id: &str) {
    if raw_data_id.is_empty() {
      self.say("Usage: candidates <rawDataId>");
      return;
    }
    let Ok(candidates) = self.client.correlation_candidates(raw_data_id).into_result().await else {
      return;
    };
    if candidates.is_empty() {
      self.say("No candidates");
    }
    for c in candidates {
      self.say(format!(
        "{:.2}  {} -> {}  [{}] {}",
        c.score,
        c.source_entity_id,
        c.target_entity_id,
        c.status,
        c.rationale.unwrap_or_default()
      ));
    }
  }

  fn watch(&mut self, raw_data_id: &str) {
    if raw_data_id.is_empty() {
      self.say("Usage: watch <rawDataId>");
      return;
    }
    let watch = Watch {
      ingestion: self.client.ingestion_status(raw_data_id),
      analysis: self.client.analysis_status(raw_data_id),
    };
    self.watches.insert(raw_data_id.to_string(), watch);
    self.say(format!("Watching {}", raw_data_id));
  }

  fn sort(&mut self, args: &str) {
    let mut parts = args.split_whitespace();
    let Some(key) = parts.next().and_then(SearchSort::parse) else {
      self.say("Usage: sort <score|timestamp|turnIndex> [asc|desc]");
      return;
    };
    let direction = match parts.next() {
      Some("asc") => SortDirection::Asc,
      Some("desc") | None => SortDirection::Desc,
      Some(other) => {
        self.say(format!("Unknown direction: {}", other));
        return;
      }
    };
    self.search.set_sort(key, direction);
    self.render_search();
  }

  fn filter(&mut self, args: &str) {
    match args.split_once(char::is_whitespace) {
      _ if args == "clear" => self.search.clear_filters(),
      None if args.is_empty() => {
        let lines: Vec<String> = self
          .search
          .filters()
          .iter()
          .map(|(k, v)| format!("{} = {}", k, v))
          .collect();
        if lines.is_empty() {
          self.say("No filters");
        }
        for line in lines {
          self.say(line);
        }
        return;
      }
      None => self.search.set_filters([(args, None)]),
      Some((name, value)) => {
        // Bare words are taken as strings
        let value = serde_json::from_str(value.trim()).unwrap_or_else(|_| Value::from(value.trim()));
        self.search.set_filters([(name, Some(value))]);
      }
    }
    self.render_search();
  }

  /// Pick up refetched data for everything on display.
  fn refresh_views(&mut self) {
    if let Some(query) = self.active_search.as_mut() {
      if query.poll() {
        if let Some(results) = query.data() {
          self.search.set_results(results.clone());
          self.say(format!("Search results for '{}' refreshed", self.search.query()));
          self.render_search();
        }
      }
    }

    if let Some(query) = self.active_feedback.as_mut() {
      if query.poll() {
        if let Some(items) = query.data() {
          self.feedback.set_results(items.clone());
          self.say("Feedback list refreshed");
          self.render_feedback();
        }
      }
    }

    let mut changed = Vec::new();
    for (id, watch) in self.watches.iter_mut() {
      let a = watch.ingestion.poll();
      let b = watch.analysis.poll();
      if a || b {
        changed.push(format!(
          "{}: ingestion {}, analysis {}",
          id,
          describe(watch.ingestion.state(), |s| s.status.as_str()),
          describe(watch.analysis.state(), |s| s.status.as_str()),
        ));
      }
    }
    for line in changed {
      self.say(line);
    }
  }

  fn render_search(&mut self) {
    let lines: Vec<String> = self
      .search
      .visible_results()
      .iter()
      .map(|r| {
        format!(
          "{:.2}  {}#{}  {}",
          r.score, r.conversation_id, r.turn_index, r.snippet
        )
      })
      .collect();
    let page = self.search.pagination();

    if lines.is_empty() {
      self.say("No results");
    }
    for line in lines {
      self.say(line);
    }
    self.say(format!(
      "page {} ({} results, limit {})",
      page.page, page.total, page.limit
    ));
  }

  fn render_feedback(&mut self) {
    let lines: Vec<String> = self
      .feedback
      .visible_items()
      .iter()
      .map(|f| {
        format!(
          "{}  [{}] {}: {}",
          f.feedback_id, f.status, f.feedback_type, f.message
        )
      })
      .collect();
    if lines.is_empty() {
      self.say("No feedback");
    }
    for line in lines {
      self.say(line);
    }
  }

  /// Route a write outcome into the notification queue.
  fn report<T: std::fmt::Display>(&mut self, result: Result<T, ErrorInfo>, success: &str) {
    match result {
      Ok(detail) => {
        self
          .notifications
          .push(Severity::Success, format!("{}: {}", success, detail));
      }
      Err(e) => {
        let severity = match e.kind {
          crate::error::ErrorKind::Validation => Severity::Warning,
          _ => Severity::Error,
        };
        self.notifications.push(severity, e.to_string());
      }
    }
  }

  fn usage(&mut self, cmd: &commands::Command) {
    self.say(format!("Usage: {}", cmd.usage));
  }

  /// Print the visible notification when it changes.
  fn show_notification(&mut self) {
    let current = self
      .notifications
      .current()
      .map(|n| (n.id, format!("[{}] {}", n.severity, n.message)));
    let id = current.as_ref().map(|(id, _)| *id);
    if id != self.shown_notification {
      self.shown_notification = id;
      if let Some((_, line)) = current {
        self.say(line);
      }
    }
  }

  fn say(&mut self, line: impl Into<String>) {
    self.output.push(line.into());
  }

  fn has_output(&self) -> bool {
    !self.output.is_empty()
  }

  /// Take everything printed since the last call.
  pub fn take_output(&mut self) -> Vec<String> {
    std::mem::take(&mut self.output)
  }

  fn flush(&mut self) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    for line in self.take_output() {
      writeln!(stdout, "{}", line)?;
    }
    stdout.flush()?;
    Ok(())
  }

  // Accessors
  pub fn search_state(&self) -> &SearchState {
    &self.search
  }

  pub fn feedback_state(&self) -> &FeedbackState {
    &self.feedback
  }

  pub fn notifications(&self) -> &NotificationQueue {
    &self.notifications
  }

  pub fn client(&self) -> &NexusClient {
    &self.client
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }
}

fn describe<T>(state: &QueryState<T>, label: impl Fn(&T) -> &str) -> String {
  match state {
    QueryState::Idle => "idle".to_string(),
    QueryState::Loading => "loading".to_string(),
    QueryState::Success(value) => label(value).to_string(),
    QueryState::Error(e) => format!("error ({})", e.kind),
  }
}

fn prompt() -> Result<()> {
  let mut stdout = std::io::stdout().lock();
  write!(stdout, "nexus> ")?;
  stdout.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::endpoints::{default_registry, ops};
  use crate::cache::testing::FakeTransport;
  use crate::cache::{CachePolicy, Store};
  use serde_json::json;
  use std::sync::Arc;

  fn app(fake: &Arc<FakeTransport>) -> App {
    let events = EventHandler::without_ticks();
    let store = Store::new(
      fake.clone(),
      Arc::new(default_registry()),
      CachePolicy::default(),
    )
    .with_events(events.sender());
    App::with_client(Config::default(), NexusClient::new(store), events)
  }

  fn hits() -> Value {
    json!([
      {"turnId": "1", "conversationId": "c1", "turnIndex": 0, "timestamp": "2024-05-01T10:00:00Z", "snippet": "first", "score": 0.4},
      {"turnId": "2", "conversationId": "c1", "turnIndex": 1, "timestamp": "2024-05-01T10:01:00Z", "snippet": "second", "score": 0.9}
    ])
  }

  #[tokio::test]
  async fn test_search_sets_results_and_history() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(hits()));
    let mut app = app(&fake);

    app.execute("search  knowledge graph ").await;

    let state = app.search_state();
    assert_eq!(state.query(), "knowledge graph");
    assert_eq!(state.results().len(), 2);
    assert_eq!(state.pagination().total, 2);
    assert_eq!(state.history().entries(), &["knowledge graph"]);
    assert!(!state.is_busy());
    assert!(state.last_run_at().is_some());

    let output = app.take_output();
    assert!(output[0].contains("second"));
  }

  #[tokio::test]
  async fn test_failed_search_raises_notification() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Err(ErrorInfo::transport("connection refused")));
    let mut app = app(&fake);

    app.execute("s rust").await;
    app.drain_events();

    let current = app.notifications().current().unwrap();
    assert_eq!(current.severity, Severity::Error);
    assert!(current.message.contains("connection refused"));
    assert!(app.search_state().history().is_empty());
  }

  #[tokio::test]
  async fn test_malformed_ingest_is_rejected_locally() {
    let fake = Arc::new(FakeTransport::new());
    let mut app = app(&fake);

    app.execute("ingest chat {not json").await;

    assert_eq!(fake.write_calls(ops::INGEST), 0);
    let current = app.notifications().current().unwrap();
    assert_eq!(current.severity, Severity::Warning);
    assert!(current.message.starts_with("validation"));
  }

  #[tokio::test]
  async fn test_submit_refreshes_feedback_list() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(json!([])));
    fake.push_write(0, Ok(json!({"message": "received", "feedbackId": "fb-7"})));
    fake.push_read(
      0,
      Ok(json!([{"feedbackId": "fb-7", "feedbackType": "bug", "message": "slow", "status": "open", "submittedAt": "2024-05-01T10:00:00Z"}])),
    );
    let mut app = app(&fake);

    app.execute("feedback").await;
    assert!(app.feedback_state().results().is_empty());

    app.execute("submit bug slow").await;
    assert_eq!(
      app.notifications().current().map(|n| n.severity),
      Some(Severity::Success)
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    app.handle_event(Event::Tick);
    assert_eq!(app.feedback_state().results().len(), 1);
    assert_eq!(fake.read_calls(ops::LIST_FEEDBACK), 2);
  }

  #[tokio::test]
  async fn test_sort_and_filter_rerender() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(hits()));
    let mut app = app(&fake);

    app.execute("search graph").await;
    app.take_output();

    app.execute("sort turnIndex asc").await;
    let output = app.take_output();
    assert!(output[0].contains("first"));

    app.execute("filter minScore 0.5").await;
    let output = app.take_output();
    assert!(output[0].contains("second"));
    assert_eq!(output.len(), 2);
  }

  #[tokio::test]
  async fn test_clear_keeps_history() {
    let fake = Arc::new(FakeTransport::new());
    fake.push_read(0, Ok(hits()));
    let mut app = app(&fake);

    app.execute("search graph").await;
    app.execute("clear").await;

    assert_eq!(app.search_state().query(), "");
    assert!(app.search_state().results().is_empty());
    assert_eq!(app.search_state().history().len(), 1);
  }

  #[tokio::test]
  async fn test_dismiss_and_quit() {
    let fake = Arc::new(FakeTransport::new());
    let mut app = app(&fake);

    app.execute("analyze r1").await;
    assert_eq!(app.notifications().len(), 1);
    app.execute("dismiss").await;
    assert!(app.notifications().is_empty());

    app.execute("bogus").await;
    assert!(app.take_output().iter().any(|l| l.starts_with("Unknown command")));

    app.execute("q").await;
    assert!(app.should_quit());
  }
}
