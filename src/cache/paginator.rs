//! One-direction progressively loaded list.

use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::error::LoadError;
use super::traits::{CursorFn, Range, RangeDirection, RangeLoadFn};

/// An immutable list that grows from one end, for infinite-scroll views.
///
/// Loading in the `First` direction starts at the beginning of the source and
/// appends later pages after the last item. `Last` starts at the end and
/// prepends earlier pages before the first item. The first page fetched is
/// taken to be the true start (or end) of the list; items published at that
/// end afterwards are only picked up through `insert`.
///
/// Unlike `SegmentedListCache` there are no gaps to merge and no locking: each
/// operation returns a new `Paginator` and leaves `self` untouched.
pub struct Paginator<C, I> {
  direction: RangeDirection,
  cursor: CursorFn<I, C>,
  load: RangeLoadFn<C, I>,
  items: Arc<Vec<I>>,
  no_more_items: bool,
}

impl<C, I> Clone for Paginator<C, I> {
  fn clone(&self) -> Self {
    Self {
      direction: self.direction,
      cursor: Arc::clone(&self.cursor),
      load: Arc::clone(&self.load),
      items: Arc::clone(&self.items),
      no_more_items: self.no_more_items,
    }
  }
}

impl<C, I> PartialEq for Paginator<C, I> {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.items, &other.items) && self.no_more_items == other.no_more_items
  }
}

impl<C, I> fmt::Debug for Paginator<C, I> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Paginator")
      .field("direction", &self.direction)
      .field("len", &self.items.len())
      .field("no_more_items", &self.no_more_items)
      .finish()
  }
}

impl<C, I> Paginator<C, I>
where
  C: Clone + Send + Sync + 'static,
  I: Clone + Send + Sync + 'static,
{
  /// An empty paginator. Nothing is fetched until `load_more`.
  pub fn new<X, F, Fut>(direction: RangeDirection, cursor: X, load: F) -> Self
  where
    X: Fn(&I) -> C + Send + Sync + 'static,
    F: Fn(Range<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<I>, LoadError>> + Send + 'static,
  {
    Self {
      direction,
      cursor: Arc::new(cursor),
      load: Arc::new(move |range| load(range).boxed()),
      items: Arc::new(Vec::new()),
      no_more_items: false,
    }
  }

  /// Fetch the first page.
  pub async fn load<X, F, Fut>(
    direction: RangeDirection,
    count: usize,
    cursor: X,
    load: F,
  ) -> Result<Self, LoadError>
  where
    X: Fn(&I) -> C + Send + Sync + 'static,
    F: Fn(Range<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<I>, LoadError>> + Send + 'static,
  {
    Self::new(direction, cursor, load).load_more(count).await
  }

  pub fn direction(&self) -> RangeDirection {
    self.direction
  }

  /// Items in ascending cursor order, whichever the direction.
  pub fn items(&self) -> &[I] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Whether a short page has been seen. Once set, `load_more` never fetches.
  pub fn has_no_more_items(&self) -> bool {
    self.no_more_items
  }

  fn next_range(&self, count: usize) -> Range<C> {
    match self.direction {
      RangeDirection::First => Range {
        direction: RangeDirection::First,
        count,
        after: self.items.last().map(|item| (self.cursor)(item)),
        before: None,
      },
      RangeDirection::Last => Range {
        direction: RangeDirection::Last,
        count,
        after: None,
        before: self.items.first().map(|item| (self.cursor)(item)),
      },
    }
  }

  /// Fetch up to `count` more items past the loaded end.
  ///
  /// Returns an unchanged copy without fetching once the end has been seen,
  /// or when `count` is zero.
  pub async fn load_more(&self, count: usize) -> Result<Self, LoadError> {
    if self.no_more_items || count == 0 {
      return Ok(self.clone());
    }

    let range = self.next_range(count);
    debug!(direction = range.direction.as_str(), count, "fetching next page");
    let fetched = (self.load)(range).await?;
    let no_more_items = fetched.len() < count;

    let mut items = Vec::with_capacity(self.items.len() + fetched.len());
    match self.direction {
      RangeDirection::First => {
        items.extend(self.items.iter().cloned());
        items.extend(fetched);
      }
      RangeDirection::Last => {
        items.extend(fetched);
        items.extend(self.items.iter().cloned());
      }
    }

    if no_more_items {
      debug!(len = items.len(), "reached the end of the paginated list");
    }
    Ok(self.with_items(items, no_more_items))
  }

  /// Add `item` at the end opposite to the loading direction: the front for
  /// `First`, the back for `Last`.
  pub fn insert(&self, item: I) -> Self {
    let mut items = Vec::with_capacity(self.items.len() + 1);
    match self.direction {
      RangeDirection::First => {
        items.push(item);
        items.extend(self.items.iter().cloned());
      }
      RangeDirection::Last => {
        items.extend(self.items.iter().cloned());
        items.push(item);
      }
    }
    self.with_items(items, self.no_more_items)
  }

  fn with_items(&self, items: Vec<I>, no_more_items: bool) -> Self {
    Self {
      direction: self.direction,
      cursor: Arc::clone(&self.cursor),
      load: Arc::clone(&self.load),
      items: Arc::new(items),
      no_more_items,
    }
  }
}
