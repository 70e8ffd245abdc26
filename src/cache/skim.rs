//! Offset/limit list cache that can be read at any position.

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::error::LoadError;
use super::traits::{OffsetLoadFn, OffsetRange};

/// A sparse list loaded with offset/limit pagination, so any part of it can
/// be "skimmed" without loading what comes before.
///
/// The source must be append-only: items never move and new ones only appear
/// at the end. Every operation returns a new `SkimCache` and leaves `self`
/// untouched. Callers that want sequential updates chain them, for instance
/// through a `SerializedMutator`.
pub struct SkimCache<I> {
  load: OffsetLoadFn<I>,
  items: Arc<Vec<Option<I>>>,
  no_more_items: bool,
}

impl<I> Clone for SkimCache<I> {
  fn clone(&self) -> Self {
    Self {
      load: Arc::clone(&self.load),
      items: Arc::clone(&self.items),
      no_more_items: self.no_more_items,
    }
  }
}

impl<I> PartialEq for SkimCache<I> {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.items, &other.items) && self.no_more_items == other.no_more_items
  }
}

impl<I> fmt::Debug for SkimCache<I> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SkimCache")
      .field("len", &self.items.len())
      .field("loaded", &self.items.iter().filter(|i| i.is_some()).count())
      .field("no_more_items", &self.no_more_items)
      .finish()
  }
}

impl<I> SkimCache<I>
where
  I: Clone + Send + Sync + 'static,
{
  pub fn new<F, Fut>(load: F) -> Self
  where
    F: Fn(OffsetRange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<I>, LoadError>> + Send + 'static,
  {
    Self {
      load: Arc::new(move |range| load(range).boxed()),
      items: Arc::new(Vec::new()),
      no_more_items: false,
    }
  }

  fn with_items(&self, items: Vec<Option<I>>, no_more_items: bool) -> Self {
    Self {
      load: Arc::clone(&self.load),
      items: Arc::new(items),
      no_more_items,
    }
  }

  /// Every slot, with `None` where nothing has been loaded yet.
  pub fn items(&self) -> &[Option<I>] {
    &self.items
  }

  pub fn get(&self, index: usize) -> Option<&I> {
    self.items.get(index).and_then(Option::as_ref)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Whether the end of the source has been seen.
  pub fn has_no_more_items(&self) -> bool {
    self.no_more_items
  }

  fn is_loaded(&self, index: usize) -> bool {
    matches!(self.items.get(index), Some(Some(_)))
  }

  /// The window `load(range)` would fetch, or `None` if it would not fetch.
  ///
  /// The window starts at the first unloaded slot of `range` and covers up to
  /// `limit` unloaded slots, stopping at the next loaded one. When that leaves
  /// room it grows backwards over unloaded slots before `range`.
  ///
  /// With a range like `[gap, loaded, gap]` only the first gap is picked.
  /// Call `load` again to fill the rest.
  pub fn window(&self, range: OffsetRange) -> Option<OffsetRange> {
    let OffsetRange { limit, offset } = range;
    let len = self.items.len();

    let mut max_start = offset.saturating_add(limit);
    if self.no_more_items {
      max_start = max_start.min(len);
    }

    let mut start = offset.min(max_start);
    while start < max_start.saturating_sub(1) && start < len && self.is_loaded(start) {
      start += 1;
    }

    let mut end = start;
    while end < usize::MAX
      && (!self.no_more_items || end < len)
      && end - start < limit
      && !self.is_loaded(end)
    {
      end += 1;
    }

    if !self.is_loaded(start) {
      while end - start < limit && start > 0 && !self.is_loaded(start - 1) {
        start -= 1;
      }
    }

    if end == start {
      return None;
    }
    Some(OffsetRange::new(start, end - start))
  }

  /// Load whatever is missing around `range`, returning the updated cache.
  ///
  /// Already loaded slots are never fetched again. When nothing is missing the
  /// loader is not called and an unchanged copy is returned.
  pub async fn load(&self, range: OffsetRange) -> Result<Self, LoadError> {
    let Some(window) = self.window(range) else {
      return Ok(self.clone());
    };

    debug!(offset = window.offset, limit = window.limit, "fetching skim window");
    let fetched = (self.load)(window).await?;

    let previous_len = self.items.len();
    let short = fetched.len() < window.limit;
    // An empty page past the known tail only says the end is somewhere before
    // it, so it can neither grow the list nor pin its length
    let past_tail = fetched.is_empty() && window.offset > previous_len;

    let mut items = (*self.items).clone();
    if !fetched.is_empty() {
      let needed = window.offset + fetched.len();
      if items.len() < needed {
        items.resize(needed, None);
      }
      for (slot, item) in items[window.offset..].iter_mut().zip(fetched) {
        *slot = Some(item);
      }
    }

    // A short page that reached the known tail means the source ended
    let no_more_items =
      self.no_more_items || (short && !past_tail && window.end() >= previous_len);
    if no_more_items && !self.no_more_items {
      debug!(len = items.len(), "reached the end of the skim list");
    }
    Ok(self.with_items(items, no_more_items))
  }

  /// Fix the length of the list. Nothing past `length` will be loaded.
  pub fn set_length(&self, length: usize) -> Self {
    let mut items = (*self.items).clone();
    items.resize(length, None);
    self.with_items(items, true)
  }

  /// Put `item` at `index`, growing the list if needed.
  pub fn set_item(&self, index: usize, item: I) -> Self {
    let mut items = (*self.items).clone();
    if items.len() <= index {
      items.resize(index + 1, None);
    }
    items[index] = Some(item);
    self.with_items(items, self.no_more_items)
  }
}
