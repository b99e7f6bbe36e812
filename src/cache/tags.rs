//! Resource tags and the tag → cache key index.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::key::CacheKey;

/// Label for a logical resource category. Invalidation operates on tags,
/// never on individual keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Cow<'static, str>);

impl Tag {
  pub const STATUS: Tag = Tag::from_static("Status");
  pub const SEARCH: Tag = Tag::from_static("Search");
  pub const FEEDBACK: Tag = Tag::from_static("Feedback");
  pub const INGESTION: Tag = Tag::from_static("Ingestion");
  pub const ANALYSIS: Tag = Tag::from_static("Analysis");
  pub const CORRELATION: Tag = Tag::from_static("Correlation");
  pub const EXPORT: Tag = Tag::from_static("Export");

  pub const fn from_static(name: &'static str) -> Self {
    Tag(Cow::Borrowed(name))
  }

  pub fn new(name: impl Into<String>) -> Self {
    Tag(Cow::Owned(name.into()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for Tag {
  fn from(s: &str) -> Self {
    Tag::new(s)
  }
}

/// Maps each tag to the cache keys whose entries declare it.
///
/// Derived state: keys are added when an entry is created and removed when
/// it is destroyed, so the index never outgrows the entry table.
#[derive(Debug, Default)]
pub struct TagIndex {
  tag_to_keys: HashMap<Tag, HashSet<CacheKey>>,
}

impl TagIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a key under each of its tags.
  pub fn insert(&mut self, key: &CacheKey, tags: &BTreeSet<Tag>) {
    for tag in tags {
      self
        .tag_to_keys
        .entry(tag.clone())
        .or_default()
        .insert(key.clone());
    }
  }

  /// Drop a key from each of its tags, pruning tags left empty.
  pub fn remove(&mut self, key: &CacheKey, tags: &BTreeSet<Tag>) {
    for tag in tags {
      if let Some(keys) = self.tag_to_keys.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
          self.tag_to_keys.remove(tag);
        }
      }
    }
  }

  /// All keys tagged by any of `tags`, without duplicates.
  pub fn keys_for(&self, tags: &BTreeSet<Tag>) -> HashSet<CacheKey> {
    tags
      .iter()
      .filter_map(|tag| self.tag_to_keys.get(tag))
      .flat_map(|keys| keys.iter().cloned())
      .collect()
  }

  pub fn clear(&mut self) {
    self.tag_to_keys.clear();
  }

  /// Number of tags with at least one key.
  pub fn tag_count(&self) -> usize {
    self.tag_to_keys.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::key::params;
  use serde_json::json;

  fn tags(list: &[Tag]) -> BTreeSet<Tag> {
    list.iter().cloned().collect()
  }

  #[test]
  fn test_keys_for_unions_without_duplicates() {
    let mut index = TagIndex::new();
    let search = CacheKey::new("search", params([("q", json!("x"))]));
    let feedback = CacheKey::bare("listFeedback");

    index.insert(&search, &tags(&[Tag::SEARCH, Tag::FEEDBACK]));
    index.insert(&feedback, &tags(&[Tag::FEEDBACK]));

    let hit = index.keys_for(&tags(&[Tag::SEARCH, Tag::FEEDBACK]));
    assert_eq!(hit.len(), 2);

    let only_search = index.keys_for(&tags(&[Tag::SEARCH]));
    assert_eq!(only_search.len(), 1);
    assert!(only_search.contains(&search));

    assert!(index.keys_for(&tags(&[Tag::EXPORT])).is_empty());
  }

  #[test]
  fn test_remove_prunes_empty_tags() {
    let mut index = TagIndex::new();
    let key = CacheKey::bare("getStatus");
    index.insert(&key, &tags(&[Tag::STATUS]));
    assert_eq!(index.tag_count(), 1);

    index.remove(&key, &tags(&[Tag::STATUS]));
    assert_eq!(index.tag_count(), 0);
  }

  #[test]
  fn test_static_and_owned_tags_compare_equal() {
    assert_eq!(Tag::SEARCH, Tag::new("Search"));
    let parsed: Tag = serde_json::from_str("\"Feedback\"").unwrap();
    assert_eq!(parsed, Tag::FEEDBACK);
  }
}
