use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use super::interaction::{InteractionState, SortDirection};
use crate::api::types::SearchResult;
use crate::config::SearchConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchSort {
  #[default]
  Score,
  Timestamp,
  TurnIndex,
}

impl SearchSort {
  pub fn parse(name: &str) -> Option<Self> {
    match name.to_lowercase().as_str() {
      "score" => Some(SearchSort::Score),
      "timestamp" | "time" => Some(SearchSort::Timestamp),
      "turnindex" | "turn" => Some(SearchSort::TurnIndex),
      _ => None,
    }
  }

  fn compare(self, a: &SearchResult, b: &SearchResult) -> Ordering {
    match self {
      SearchSort::Score => a.score.total_cmp(&b.score),
      SearchSort::Timestamp => compare_timestamps(&a.timestamp, &b.timestamp),
      SearchSort::TurnIndex => a.turn_index.cmp(&b.turn_index),
    }
  }
}

pub type SearchState = InteractionState<SearchResult, SearchSort>;

pub fn search_state(config: &SearchConfig) -> SearchState {
  SearchState::new(
    SearchSort::Score,
    SortDirection::Desc,
    config.default_limit,
    config.history_limit,
  )
}

impl InteractionState<SearchResult, SearchSort> {
  /// Results after filters, sort and the current page.
  ///
  /// Recognised filters: `sentiment`, `conversationId`, `minScore` and
  /// `dateRange` (`{start, end}` as RFC 3339 timestamps).
  pub fn visible_results(&self) -> Vec<&SearchResult> {
    let mut visible: Vec<&SearchResult> = self
      .results()
      .iter()
      .filter(|r| self.matches(r))
      .collect();

    let (key, direction) = self.sort();
    visible.sort_by(|a, b| direction.apply(key.compare(a, b)));

    let window = self.pagination().window();
    visible
      .into_iter()
      .skip(window.start)
      .take(window.len())
      .collect()
  }

  /// Past queries matching the current input.
  pub fn suggestions(&self) -> Vec<&str> {
    self.history().suggest(self.query())
  }

  fn matches(&self, result: &SearchResult) -> bool {
    if let Some(sentiment) = self.filter("sentiment").and_then(|v| v.as_str()) {
      if result.sentiment.as_deref() != Some(sentiment) {
        return false;
      }
    }
    if let Some(conversation) = self.filter("conversationId").and_then(|v| v.as_str()) {
      if result.conversation_id != conversation {
        return false;
      }
    }
    if let Some(min) = self.filter("minScore").and_then(|v| v.as_f64()) {
      if result.score < min {
        return false;
      }
    }
    if let Some(range) = self.filter("dateRange") {
      if !in_date_range(range, &result.timestamp) {
        return false;
      }
    }
    true
  }
}

/// Whether `timestamp` falls inside a `{start, end}` filter. Both bounds are
/// optional and inclusive.
pub(super) fn in_date_range(range: &Value, timestamp: &str) -> bool {
  let start = range.get("start").and_then(|v| v.as_str());
  let end = range.get("end").and_then(|v| v.as_str());
  if start.is_some_and(|s| compare_timestamps(timestamp, s) == Ordering::Less) {
    return false;
  }
  !end.is_some_and(|e| compare_timestamps(timestamp, e) == Ordering::Greater)
}

/// Compare RFC 3339 timestamps by instant, falling back to text order.
pub(super) fn compare_timestamps(a: &str, b: &str) -> Ordering {
  match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
    (Ok(a), Ok(b)) => a.cmp(&b),
    _ => a.cmp(b),
  }
}
