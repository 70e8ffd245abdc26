use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::cursor::Cursor;

/// A full feed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
  pub id: String,
  /// Unix timestamp; the feed is ordered by this, then by id
  pub published_at: i64,
  #[serde(default)]
  pub body: Value,
}

impl FeedItem {
  pub fn entry(&self) -> FeedEntry {
    FeedEntry {
      id: self.id.clone(),
      published_at: self.published_at,
    }
  }
}

/// What a feed list holds for each item. Full items live in the entity cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedEntry {
  pub id: String,
  pub published_at: i64,
}

impl FeedEntry {
  pub fn cursor(&self) -> Cursor {
    Cursor::at(self.published_at, &self.id)
  }
}

/// Feed metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedInfo {
  #[serde(default)]
  pub title: Option<String>,
  /// Number of items published so far
  pub total_items: usize,
}
