use serde::{Deserialize, Serialize};

use super::interaction::{InteractionState, SortDirection, DEFAULT_HISTORY_LIMIT};
use super::search::{compare_timestamps, in_date_range};
use crate::api::types::FeedbackListItem;
use crate::config::FeedbackConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackSort {
  #[default]
  SubmittedAt,
  Status,
  Type,
}

pub type FeedbackState = InteractionState<FeedbackListItem, FeedbackSort>;

pub fn feedback_state(config: &FeedbackConfig) -> FeedbackState {
  FeedbackState::new(
    FeedbackSort::SubmittedAt,
    SortDirection::Desc,
    config.default_limit,
    DEFAULT_HISTORY_LIMIT,
  )
}

/// Fields of a feedback item that can change after submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackPatch {
  pub status: Option<String>,
  pub message: Option<String>,
  pub feedback_type: Option<String>,
}

impl InteractionState<FeedbackListItem, FeedbackSort> {
  /// Prepend a freshly submitted item.
  pub fn add_item(&mut self, item: FeedbackListItem) {
    self.prepend_result(item);
  }

  /// Patch the item with `feedback_id`. Returns `false` if it is not loaded.
  pub fn update_item(&mut self, feedback_id: &str, patch: FeedbackPatch) -> bool {
    self.update_result(
      |item| item.feedback_id == feedback_id,
      |item| {
        if let Some(status) = patch.status {
          item.status = status;
        }
        if let Some(message) = patch.message {
          item.message = message;
        }
        if let Some(feedback_type) = patch.feedback_type {
          item.feedback_type = feedback_type;
        }
      },
    )
  }

  /// Items matching the `status` and `type` filters, sorted and paged.
  pub fn visible_items(&self) -> Vec<&FeedbackListItem> {
    let status = self.filter("status").and_then(|v| v.as_str());
    let kind = self.filter("type").and_then(|v| v.as_str());
    let range = self.filter("dateRange");

    let mut visible: Vec<&FeedbackListItem> = self
      .results()
      .iter()
      .filter(|item| status.map_or(true, |s| item.status == s))
      .filter(|item| kind.map_or(true, |t| item.feedback_type == t))
      .filter(|item| range.map_or(true, |r| in_date_range(r, &item.submitted_at)))
      .collect();

    let (key, direction) = self.sort();
    visible.sort_by(|a, b| {
      let ordering = match key {
        FeedbackSort::SubmittedAt => compare_timestamps(&a.submitted_at, &b.submitted_at),
        FeedbackSort::Status => a.status.cmp(&b.status),
        FeedbackSort::Type => a.feedback_type.cmp(&b.feedback_type),
      };
      direction.apply(ordering)
    });

    let window = self.pagination().window();
    visible
      .into_iter()
      .skip(window.start)
      .take(window.len())
      .collect()
  }
}
