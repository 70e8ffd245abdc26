//! Feed client backed by the caching primitives.

use color_eyre::Result;
use futures::FutureExt;
use std::sync::Arc;

use crate::cache::{
  EntityCache, LoadError, ObservableCell, OffsetRange, Paginator, Range, RangeDirection,
  RangeLoadFn, RepairRegistry, SegmentedListCache, SerializedMutator, SingletonCache, SkimCache,
};
use crate::config::Config;

use super::client::ApiClient;
use super::cursor::Cursor;
use super::types::{FeedEntry, FeedInfo, FeedItem};

/// Feed client with transparent caching.
///
/// Lists only hold entries. Every item a list fetches is also committed to the
/// item cache, so reading an item that was seen in a list never refetches it.
#[derive(Clone)]
pub struct CachedApiClient {
  info: SingletonCache<FeedInfo>,
  items: EntityCache<String, FeedItem>,
  entries: RangeLoadFn<Cursor, FeedEntry>,
  feed: SegmentedListCache<Cursor, FeedEntry>,
  skim: SerializedMutator<SkimCache<FeedEntry>>,
  repair: Arc<RepairRegistry>,
}

impl CachedApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::with_client(ApiClient::new(config)?)
  }

  pub fn with_client(client: ApiClient) -> Result<Self> {
    let items = {
      let single = client.clone();
      let batch = client.clone();
      EntityCache::new("items", move |id: String| {
        let client = single.clone();
        async move { client.get_item(&id).await }
      })
      .with_load_many(move |ids: Vec<String>| {
        let client = batch.clone();
        async move { client.get_many_items(&ids).await }
      })
    };

    let info = {
      let client = client.clone();
      SingletonCache::new("info", move || {
        let client = client.clone();
        async move { client.get_info().await }
      })
    };

    let entries: RangeLoadFn<Cursor, FeedEntry> = {
      let client = client.clone();
      let items = items.clone();
      Arc::new(move |range: Range<Cursor>| {
        let client = client.clone();
        let items = items.clone();
        async move {
          let fetched = client.get_items(&range).await?;
          Ok(commit(&items, fetched))
        }
        .boxed()
      })
    };

    let feed = {
      let entries = Arc::clone(&entries);
      SegmentedListCache::new("feed", FeedEntry::cursor, move |range| entries(range))
    };

    let skim = {
      let items = items.clone();
      SkimCache::new(move |range: OffsetRange| {
        let client = client.clone();
        let items = items.clone();
        async move {
          let fetched = client.get_items_at(range).await?;
          Ok(commit(&items, fetched))
        }
      })
    };

    let repair = Arc::new(RepairRegistry::new());
    repair.register("items", Arc::new(items.clone()))?;
    repair.register("info", Arc::new(info.clone()))?;

    Ok(Self {
      info,
      items,
      entries,
      feed,
      skim: SerializedMutator::new(ObservableCell::new(skim)),
      repair,
    })
  }

  /// The newest page of the feed, checking for items published since the
  /// last call.
  pub async fn feed_first(&self, count: usize) -> Result<Vec<FeedEntry>> {
    Ok(self.feed.load_first(count).await?)
  }

  pub async fn feed_next(&self, count: usize) -> Result<Vec<FeedEntry>> {
    Ok(self.feed.load_next(count).await?)
  }

  pub async fn feed_last(&self, count: usize) -> Result<Vec<FeedEntry>> {
    Ok(self.feed.load_last(count).await?)
  }

  pub async fn feed_prev(&self, count: usize) -> Result<Vec<FeedEntry>> {
    Ok(self.feed.load_prev(count).await?)
  }

  /// Feed metadata, fetched once and then served from cache.
  pub async fn info(&self) -> Result<FeedInfo> {
    Ok(self.info.load().await?)
  }

  /// A fresh one-direction list over the feed. `First` walks from the oldest
  /// item, `Last` from the newest. Fetched items land in the item cache.
  pub fn paginate(&self, direction: RangeDirection) -> Paginator<Cursor, FeedEntry> {
    let entries = Arc::clone(&self.entries);
    Paginator::new(direction, FeedEntry::cursor, move |range| entries(range))
  }

  /// Get a single item, from cache when possible.
  pub async fn item(&self, id: &str) -> Result<FeedItem> {
    Ok(self.items.load(id.to_string()).await?)
  }

  /// Get many items with one request for those not yet cached.
  pub async fn items(&self, ids: &[String]) -> Vec<Result<FeedItem, LoadError>> {
    self.items.load_many(ids.to_vec()).await
  }

  /// Load the window around `range` into the skim list and return the list.
  pub async fn skim(&self, range: OffsetRange) -> Result<SkimCache<FeedEntry>> {
    Ok(self.skim.update(move |current| async move { current.load(range).await }).await?)
  }

  /// Retry every failed item load. Returns how many were restarted.
  pub fn repair(&self) -> usize {
    self.repair.attempt()
  }

  pub fn item_cache(&self) -> &EntityCache<String, FeedItem> {
    &self.items
  }

  pub fn feed(&self) -> &SegmentedListCache<Cursor, FeedEntry> {
    &self.feed
  }
}

fn commit(items: &EntityCache<String, FeedItem>, fetched: Vec<FeedItem>) -> Vec<FeedEntry> {
  fetched
    .into_iter()
    .map(|item| {
      let entry = item.entry();
      items.insert(item.id.clone(), item);
      entry
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_client_has_nothing_to_repair() {
    let config = Config::with_api_url("http://127.0.0.1:9/");
    let client = CachedApiClient::new(&config).unwrap();

    assert_eq!(client.repair(), 0);
    assert_eq!(client.repair.names(), vec!["info".to_string(), "items".to_string()]);
    assert!(client.item_cache().is_empty());
    assert!(client.paginate(RangeDirection::Last).is_empty());
    assert!(client.feed().snapshot().segments.is_empty());
  }

  #[test]
  fn test_commit_fills_item_cache() {
    let items: EntityCache<String, FeedItem> =
      EntityCache::new("items", |id: String| async move { Err(LoadError::NotFound(id)) });
    let fetched = vec![FeedItem {
      id: "p1".into(),
      published_at: 5,
      body: serde_json::json!({ "title": "hello" }),
    }];

    let entries = commit(&items, fetched);

    assert_eq!(
      entries,
      vec![FeedEntry {
        id: "p1".into(),
        published_at: 5
      }]
    );
    assert_eq!(
      items.read("p1".to_string()).ready().map(|item| item.published_at),
      Some(5)
    );
  }
}
