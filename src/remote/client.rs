use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::cache::{LoadError, OffsetRange, Range};
use crate::config::Config;

use super::cursor::Cursor;
use super::types::{FeedInfo, FeedItem};

#[derive(Debug, Deserialize)]
struct ItemsResponse {
  items: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
  items: Vec<Option<FeedItem>>,
}

/// Feed API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("API url {} cannot be used as a base", base));
    }

    let http = reqwest::Client::builder()
      .timeout(config.api.timeout())
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      token: Config::get_api_token(),
    })
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let request = self.http.request(method, url);
    match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send<T: DeserializeOwned>(
    &self,
    what: &str,
    request: RequestBuilder,
  ) -> Result<T, LoadError> {
    let response = request
      .send()
      .await
      .map_err(|e| LoadError::upstream(eyre!("Failed to fetch {}: {}", what, e)))?;

    if response.status() == StatusCode::NOT_FOUND {
      return Err(LoadError::NotFound(what.to_string()));
    }

    let response = response
      .error_for_status()
      .map_err(|e| LoadError::upstream(eyre!("Failed to fetch {}: {}", what, e)))?;

    response
      .json()
      .await
      .map_err(|e| LoadError::upstream(eyre!("Failed to parse {}: {}", what, e)))
  }

  /// Get the items of a cursor range
  pub async fn get_items(&self, range: &Range<Cursor>) -> Result<Vec<FeedItem>, LoadError> {
    let url = range_url(&self.base, range);
    debug!(%url, "fetching feed range");
    let response: ItemsResponse = self.send("feed items", self.request(Method::GET, url)).await?;
    Ok(response.items)
  }

  /// Get the items of an offset/limit window
  pub async fn get_items_at(&self, range: OffsetRange) -> Result<Vec<FeedItem>, LoadError> {
    let url = offset_url(&self.base, range);
    debug!(%url, "fetching feed window");
    let response: ItemsResponse = self.send("feed items", self.request(Method::GET, url)).await?;
    Ok(response.items)
  }

  /// Get the feed metadata
  pub async fn get_info(&self) -> Result<FeedInfo, LoadError> {
    let url = api_url(&self.base, &["info"]);
    self.send("feed info", self.request(Method::GET, url)).await
  }

  /// Get a single item by id
  pub async fn get_item(&self, id: &str) -> Result<FeedItem, LoadError> {
    let url = item_url(&self.base, id);
    self.send(&format!("item {}", id), self.request(Method::GET, url)).await
  }

  /// Get many items at once. Returns one result per id, in order; ids the
  /// server does not know come back as `NotFound`.
  pub async fn get_many_items(
    &self,
    ids: &[String],
  ) -> Result<Vec<Result<FeedItem, LoadError>>, LoadError> {
    let url = items_url(&self.base, &["batch"]);
    let body = serde_json::json!({ "ids": ids });
    let response: BatchResponse = self
      .send("item batch", self.request(Method::POST, url).json(&body))
      .await?;

    batch_results(response.items, ids)
  }
}

/// Pair each batch slot with its id. The server must answer every id exactly
/// once, in order.
fn batch_results(
  items: Vec<Option<FeedItem>>,
  ids: &[String],
) -> Result<Vec<Result<FeedItem, LoadError>>, LoadError> {
  if items.len() != ids.len() {
    return Err(LoadError::ContractViolation {
      expected: ids.len(),
      actual: items.len(),
    });
  }

  Ok(
    items
      .into_iter()
      .zip(ids)
      .map(|(item, id)| item.ok_or_else(|| LoadError::NotFound(format!("item {}", id))))
      .collect(),
  )
}

/// `{base}/{segments..}`
fn api_url(base: &Url, segments: &[&str]) -> Url {
  let mut url = base.clone();
  if let Ok(mut path) = url.path_segments_mut() {
    path.pop_if_empty().extend(segments);
  }
  url
}

/// `{base}/items/{segments..}`
fn items_url(base: &Url, segments: &[&str]) -> Url {
  let mut url = api_url(base, &["items"]);
  if let Ok(mut path) = url.path_segments_mut() {
    path.extend(segments);
  }
  url
}

fn item_url(base: &Url, id: &str) -> Url {
  items_url(base, &[id])
}

fn range_url(base: &Url, range: &Range<Cursor>) -> Url {
  let mut url = items_url(base, &[]);
  {
    let mut query = url.query_pairs_mut();
    query
      .append_pair("direction", range.direction.as_str())
      .append_pair("count", &range.count.to_string());
    if let Some(after) = &range.after {
      query.append_pair("after", after.as_str());
    }
    if let Some(before) = &range.before {
      query.append_pair("before", before.as_str());
    }
  }
  url
}

fn offset_url(base: &Url, range: OffsetRange) -> Url {
  let mut url = items_url(base, &[]);
  url
    .query_pairs_mut()
    .append_pair("offset", &range.offset.to_string())
    .append_pair("limit", &range.limit.to_string());
  url
}
