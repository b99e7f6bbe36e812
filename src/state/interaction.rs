//! Reducers shared by every browsing surface.
//!
//! Everything here is synchronous and side-effect free. Fetching is driven
//! from outside: a surface subscribes to a cache entry and feeds the result
//! back through [`InteractionState::set_results`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Named predicates. An absent name means no constraint.
pub type Filters = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
  Asc,
  #[default]
  Desc,
}

impl SortDirection {
  pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
    match self {
      SortDirection::Asc => ordering,
      SortDirection::Desc => ordering.reverse(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub page: u32,
  pub limit: u32,
  pub total: usize,
}

impl Pagination {
  pub fn first_page(limit: u32) -> Self {
    Self {
      page: 1,
      limit,
      total: 0,
    }
  }

  /// Index range of the current page within `total` items.
  pub fn window(&self) -> std::ops::Range<usize> {
    let limit = self.limit.max(1) as usize;
    let start = (self.page.max(1) as usize - 1) * limit;
    start..start + limit
  }
}

/// Partial pagination update. Unset fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationPatch {
  pub page: Option<u32>,
  pub limit: Option<u32>,
  pub total: Option<usize>,
}

/// Recent queries, most recent first, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
  entries: Vec<String>,
  limit: usize,
}

impl Default for History {
  fn default() -> Self {
    Self::new(DEFAULT_HISTORY_LIMIT)
  }
}

impl History {
  pub fn new(limit: usize) -> Self {
    Self {
      entries: Vec::new(),
      limit,
    }
  }

  /// Returns `false` when `text` is blank and nothing was recorded.
  pub fn record(&mut self, text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
      return false;
    }
    self.entries.retain(|e| e != text);
    self.entries.insert(0, text.to_string());
    self.entries.truncate(self.limit);
    true
  }

  pub fn entries(&self) -> &[String] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  /// Past queries matching `input`: prefix matches first, then containment.
  /// Recency order is kept within each group.
  pub fn suggest(&self, input: &str) -> Vec<&str> {
    let needle = input.trim().to_lowercase();
    if needle.is_empty() {
      return self.entries.iter().map(String::as_str).collect();
    }

    let mut matches: Vec<(&str, u8)> = self
      .entries
      .iter()
      .filter_map(|entry| {
        let lower = entry.to_lowercase();
        if lower.starts_with(&needle) {
          Some((entry.as_str(), 0))
        } else if lower.contains(&needle) {
          Some((entry.as_str(), 1))
        } else {
          None
        }
      })
      .collect();

    // Stable sort keeps recency order inside each group
    matches.sort_by_key(|(_, priority)| *priority);
    matches.into_iter().map(|(entry, _)| entry).collect()
  }
}

#[derive(Debug, Clone, Copy)]
struct Initial<S> {
  sort_key: S,
  sort_direction: SortDirection,
  limit: u32,
}

/// Query, filters, sort, paging, results and history for one surface.
#[derive(Debug, Clone)]
pub struct InteractionState<R, S> {
  query: String,
  filters: Filters,
  sort_key: S,
  sort_direction: SortDirection,
  pagination: Pagination,
  results: Vec<R>,
  history: History,
  busy: bool,
  last_run_at: Option<DateTime<Utc>>,
  initial: Initial<S>,
}

impl<R, S: Copy> InteractionState<R, S> {
  pub fn new(sort_key: S, sort_direction: SortDirection, limit: u32, history_limit: usize) -> Self {
    Self {
      query: String::new(),
      filters: Filters::new(),
      sort_key,
      sort_direction,
      pagination: Pagination::first_page(limit),
      results: Vec::new(),
      history: History::new(history_limit),
      busy: false,
      last_run_at: None,
      initial: Initial {
        sort_key,
        sort_direction,
        limit,
      },
    }
  }

  pub fn query(&self) -> &str {
    &self.query
  }

  pub fn filters(&self) -> &Filters {
    &self.filters
  }

  pub fn filter(&self, name: &str) -> Option<&Value> {
    self.filters.get(name)
  }

  pub fn sort(&self) -> (S, SortDirection) {
    (self.sort_key, self.sort_direction)
  }

  pub fn pagination(&self) -> Pagination {
    self.pagination
  }

  pub fn results(&self) -> &[R] {
    &self.results
  }

  pub fn history(&self) -> &History {
    &self.history
  }

  pub fn is_busy(&self) -> bool {
    self.busy
  }

  pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
    self.last_run_at
  }

  pub fn set_query(&mut self, text: impl Into<String>) {
    self.query = text.into();
  }

  /// Shallow-merge `patch` into the filters. `None` or null removes a name.
  pub fn set_filters<I, K>(&mut self, patch: I)
  where
    I: IntoIterator<Item = (K, Option<Value>)>,
    K: Into<String>,
  {
    for (name, value) in patch {
      match value {
        Some(Value::Null) | None => {
          self.filters.remove(&name.into());
        }
        Some(value) => {
          self.filters.insert(name.into(), value);
        }
      }
    }
  }

  pub fn clear_filters(&mut self) {
    self.filters.clear();
  }

  pub fn set_sort(&mut self, key: S, direction: SortDirection) {
    self.sort_key = key;
    self.sort_direction = direction;
  }

  pub fn set_pagination(&mut self, patch: PaginationPatch) {
    if let Some(page) = patch.page {
      self.pagination.page = page;
    }
    if let Some(limit) = patch.limit {
      self.pagination.limit = limit;
    }
    if let Some(total) = patch.total {
      self.pagination.total = total;
    }
  }

  /// Replace the result set and set `total` to its length.
  pub fn set_results(&mut self, results: Vec<R>) {
    self.pagination.total = results.len();
    self.results = results;
  }

  /// Prepend one result, bumping `total`.
  pub fn prepend_result(&mut self, item: R) {
    self.results.insert(0, item);
    self.pagination.total += 1;
  }

  /// Apply `update` to the first result matching `pred`.
  pub fn update_result<P, F>(&mut self, pred: P, update: F) -> bool
  where
    P: Fn(&R) -> bool,
    F: FnOnce(&mut R),
  {
    match self.results.iter_mut().find(|r| pred(r)) {
      Some(item) => {
        update(item);
        true
      }
      None => false,
    }
  }

  pub fn record_history(&mut self, text: &str) -> bool {
    self.history.record(text)
  }

  pub fn clear_history(&mut self) {
    self.history.clear();
  }

  pub fn set_busy(&mut self, busy: bool) {
    self.busy = busy;
  }

  pub fn set_last_run_at(&mut self, at: DateTime<Utc>) {
    self.last_run_at = Some(at);
  }

  /// Reset query, filters, pagination and results. History and sort survive.
  pub fn clear(&mut self) {
    self.query.clear();
    self.filters.clear();
    self.pagination = Pagination::first_page(self.initial.limit);
    self.results.clear();
    self.busy = false;
  }

  /// Restore the sort order the surface started with.
  pub fn reset_sort(&mut self) {
    self.sort_key = self.initial.sort_key;
    self.sort_direction = self.initial.sort_direction;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  type State = InteractionState<u32, ()>;

  fn state() -> State {
    State::new((), SortDirection::Desc, 10, DEFAULT_HISTORY_LIMIT)
  }

  #[test]
  fn test_history_keeps_twenty_most_recent() {
    let mut history = History::default();
    for i in 0..25 {
      assert!(history.record(&format!("query {}", i)));
    }

    assert_eq!(history.len(), 20);
    assert_eq!(history.entries()[0], "query 24");
    assert_eq!(history.entries()[19], "query 5");
  }

  #[test]
  fn test_history_reinsert_moves_to_front() {
    let mut history = History::default();
    for q in ["alpha", "beta", "gamma"] {
      history.record(q);
    }
    history.record("alpha");
    assert_eq!(history.entries(), &["alpha", "gamma", "beta"]);

    // Surrounding whitespace does not create a duplicate
    history.record("  beta ");
    assert_eq!(history.entries(), &["beta", "alpha", "gamma"]);
  }

  #[test]
  fn test_history_ignores_blank() {
    let mut history = History::default();
    assert!(!history.record(""));
    assert!(!history.record("   \t"));
    assert!(history.is_empty());
  }

  #[test]
  fn test_history_suggest_ranks_prefix_first() {
    let mut history = History::default();
    for q in ["tokio runtime", "rust async", "async rust", "rusqlite"] {
      history.record(q);
    }
    assert_eq!(
      history.suggest("rus"),
      vec!["rusqlite", "rust async", "async rust"]
    );
    assert_eq!(history.suggest("").len(), 4);
  }

  #[test]
  fn test_set_filters_merges_and_removes() {
    let mut s = state();
    s.set_filters([("sentiment", Some(json!("positive"))), ("minScore", Some(json!(0.5)))]);
    s.set_filters([("minScore", Some(json!(0.7)))]);
    assert_eq!(s.filter("sentiment"), Some(&json!("positive")));
    assert_eq!(s.filter("minScore"), Some(&json!(0.7)));

    s.set_filters([("sentiment", None::<Value>)]);
    assert!(s.filter("sentiment").is_none());

    s.clear_filters();
    assert!(s.filters().is_empty());
  }

  #[test]
  fn test_set_results_sets_total() {
    let mut s = state();
    s.set_pagination(PaginationPatch {
      page: Some(3),
      ..Default::default()
    });
    s.set_results(vec![1, 2, 3]);
    assert_eq!(s.pagination().total, 3);
    assert_eq!(s.pagination().page, 3);
    assert_eq!(s.pagination().limit, 10);
  }

  #[test]
  fn test_clear_keeps_history() {
    let mut s = state();
    s.set_query("rust");
    s.set_filters([("sentiment", Some(json!("negative")))]);
    s.set_results(vec![7]);
    s.record_history("rust");
    s.set_pagination(PaginationPatch {
      page: Some(2),
      limit: Some(25),
      total: None,
    });

    s.clear();
    assert_eq!(s.query(), "");
    assert!(s.filters().is_empty());
    assert!(s.results().is_empty());
    assert_eq!(s.pagination(), Pagination::first_page(10));
    assert_eq!(s.history().entries(), &["rust"]);
  }

  #[test]
  fn test_prepend_and_update() {
    let mut s = state();
    s.set_results(vec![1, 2]);
    s.prepend_result(9);
    assert_eq!(s.results(), &[9, 1, 2]);
    assert_eq!(s.pagination().total, 3);

    assert!(s.update_result(|r| *r == 1, |r| *r = 10));
    assert!(!s.update_result(|r| *r == 42, |r| *r = 0));
    assert_eq!(s.results(), &[9, 10, 2]);
  }

  #[test]
  fn test_pagination_window() {
    let p = Pagination {
      page: 2,
      limit: 10,
      total: 35,
    };
    assert_eq!(p.window(), 10..20);
  }
}
