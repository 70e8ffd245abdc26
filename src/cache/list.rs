//! Cursor-anchored list cache for append-only lists.
//!
//! Items are loaded from either end of the list and kept in segments. A gap
//! between two segments means there may be unknown items there:
//!
//! ```text
//! segments = [[1, 2, 3], [7, 8, 9]]
//! ```
//!
//! Once an item is in a segment it never leaves, so this only suits lists
//! that grow at their ends. Cache keys in the list and keep full entities in
//! an `EntityCache`.

use futures::FutureExt;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use super::async_value::{AsyncValue, Read};
use super::cell::ObservableCell;
use super::error::LoadError;
use super::lock;
use super::traits::{CursorFn, Range, RangeDirection, RangeLoadFn};

/// The known runs of a list, in ascending cursor order. No segment is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segments<I> {
  segments: Vec<Vec<I>>,
}

impl<I> Default for Segments<I> {
  fn default() -> Self {
    Self {
      segments: Vec::new(),
    }
  }
}

impl<I: Clone> Segments<I> {
  pub fn len(&self) -> usize {
    self.segments.len()
  }

  pub fn is_empty(&self) -> bool {
    self.segments.is_empty()
  }

  pub fn first(&self) -> Option<&[I]> {
    self.segments.first().map(Vec::as_slice)
  }

  pub fn last(&self) -> Option<&[I]> {
    self.segments.last().map(Vec::as_slice)
  }

  pub fn get(&self, index: usize) -> Option<&[I]> {
    self.segments.get(index).map(Vec::as_slice)
  }

  pub fn iter(&self) -> impl Iterator<Item = &[I]> {
    self.segments.iter().map(Vec::as_slice)
  }

  /// Total number of cached items across all segments.
  pub fn item_count(&self) -> usize {
    self.segments.iter().map(Vec::len).sum()
  }

  fn first_len(&self) -> usize {
    self.segments.first().map_or(0, Vec::len)
  }

  fn last_len(&self) -> usize {
    self.segments.last().map_or(0, Vec::len)
  }

  fn boundary(&self, edge: Edge) -> &[I] {
    let segment = match edge {
      Edge::First | Edge::Next => self.first(),
      Edge::Last | Edge::Prev => self.last(),
    };
    segment.unwrap_or(&[])
  }

  fn prepend_first(&mut self, mut items: Vec<I>) {
    if let Some(first) = self.segments.first_mut() {
      items.append(first);
      *first = items;
    } else if !items.is_empty() {
      self.segments.push(items);
    }
  }

  fn push_first(&mut self, items: Vec<I>) {
    if !items.is_empty() {
      self.segments.insert(0, items);
    }
  }

  fn append_first(&mut self, mut items: Vec<I>) {
    if let Some(first) = self.segments.first_mut() {
      first.append(&mut items);
    } else if !items.is_empty() {
      self.segments.push(items);
    }
  }

  /// Join the first two segments around `items`.
  fn merge_first(&mut self, mut items: Vec<I>) {
    if self.segments.len() < 2 {
      return self.append_first(items);
    }
    let mut second = self.segments.remove(1);
    let first = &mut self.segments[0];
    first.append(&mut items);
    first.append(&mut second);
  }

  fn append_last(&mut self, mut items: Vec<I>) {
    if let Some(last) = self.segments.last_mut() {
      last.append(&mut items);
    } else if !items.is_empty() {
      self.segments.push(items);
    }
  }

  fn push_last(&mut self, items: Vec<I>) {
    if !items.is_empty() {
      self.segments.push(items);
    }
  }

  fn prepend_last(&mut self, mut items: Vec<I>) {
    if let Some(last) = self.segments.last_mut() {
      items.append(last);
      *last = items;
    } else if !items.is_empty() {
      self.segments.push(items);
    }
  }

  /// Join the last two segments around `items`.
  fn merge_last(&mut self, mut items: Vec<I>) {
    let n = self.segments.len();
    if n < 2 {
      return self.prepend_last(items);
    }
    let mut last = self.segments.remove(n - 1);
    let second_last = &mut self.segments[n - 2];
    second_last.append(&mut items);
    second_last.append(&mut last);
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
  First,
  Next,
  Last,
  Prev,
}

/// The list as a renderer should show it: the last good segments plus
/// whether an operation is still running.
#[derive(Debug, Clone)]
pub struct ListSnapshot<I> {
  pub loading: bool,
  pub segments: Arc<Segments<I>>,
}

struct Inner<C, I> {
  name: Arc<str>,
  cursor: CursorFn<I, C>,
  load: RangeLoadFn<C, I>,
  segments: ObservableCell<AsyncValue<Arc<Segments<I>>>>,
  /// Segments as of the last operation that succeeded
  settled: Mutex<Arc<Segments<I>>>,
  /// Held for the whole of an operation so merges see settled boundaries
  op_lock: tokio::sync::Mutex<()>,
}

/// A lazily loaded, bidirectionally extendable list.
///
/// `load_first` and `load_last` always go to the network, even when cached
/// items exist at that end, so new items published at the edge are found.
/// `load_next` and `load_prev` only fetch the range that is still unknown.
///
/// All four operations on one list run one after another.
pub struct SegmentedListCache<C, I> {
  inner: Arc<Inner<C, I>>,
}

impl<C, I> Clone for SegmentedListCache<C, I> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<C, I> SegmentedListCache<C, I>
where
  C: Clone + Debug + Send + Sync + 'static,
  I: Clone + Send + Sync + 'static,
{
  pub fn new<X, F, Fut>(name: impl Into<Arc<str>>, cursor: X, load: F) -> Self
  where
    X: Fn(&I) -> C + Send + Sync + 'static,
    F: Fn(Range<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<I>, LoadError>> + Send + 'static,
  {
    let empty = Arc::new(Segments::default());
    Self {
      inner: Arc::new(Inner {
        name: name.into(),
        cursor: Arc::new(cursor),
        load: Arc::new(move |range| load(range).boxed()),
        segments: ObservableCell::new(AsyncValue::resolved(Arc::clone(&empty))),
        settled: Mutex::new(empty),
        op_lock: tokio::sync::Mutex::new(()),
      }),
    }
  }

  /// Load the first `count` items, probing for items newer than the cache.
  ///
  /// Returns the whole first segment, which may hold more than `count` items.
  pub async fn load_first(&self, count: usize) -> Result<Vec<I>, LoadError> {
    self.run(Edge::First, count).await
  }

  /// Load `count` items following the first segment.
  pub async fn load_next(&self, count: usize) -> Result<Vec<I>, LoadError> {
    self.run(Edge::Next, count).await
  }

  /// Load the last `count` items, probing for items newer than the cache.
  ///
  /// Returns the whole last segment.
  pub async fn load_last(&self, count: usize) -> Result<Vec<I>, LoadError> {
    self.run(Edge::Last, count).await
  }

  /// Load `count` items preceding the last segment.
  pub async fn load_prev(&self, count: usize) -> Result<Vec<I>, LoadError> {
    self.run(Edge::Prev, count).await
  }

  /// The observable segment state, for subscribing to changes.
  pub fn segments(&self) -> ObservableCell<AsyncValue<Arc<Segments<I>>>> {
    self.inner.segments.clone()
  }

  pub fn read(&self) -> Read<Arc<Segments<I>>> {
    self.inner.segments.get().suspend()
  }

  /// The last good segments, without suspending while an operation runs.
  pub fn snapshot(&self) -> ListSnapshot<I> {
    let current = self.inner.segments.get();
    let loading = current.is_pending();
    let segments = match current.suspend() {
      Read::Ready(segments) => segments,
      Read::Pending(_) | Read::Failed(_) => Arc::clone(&lock(&self.inner.settled)),
    };
    ListSnapshot { loading, segments }
  }

  async fn run(&self, edge: Edge, count: usize) -> Result<Vec<I>, LoadError> {
    let inner = &self.inner;
    let _guard = inner.op_lock.lock().await;

    // An earlier caller may have been dropped while its fetch kept running
    let current = inner.segments.get();
    if current.is_pending() {
      let _ = current.promise().await;
    }

    let base = Arc::clone(&lock(&inner.settled));
    if count == 0 {
      return Ok(base.boundary(edge).to_vec());
    }

    let worker = Arc::clone(inner);
    let value = AsyncValue::pending(async move {
      let segments = Arc::new(worker.extend(edge, &base, count).await?);
      *lock(&worker.settled) = Arc::clone(&segments);
      Ok(segments)
    });
    inner.segments.set(value.clone());

    let segments = value.promise().await?;
    Ok(segments.boundary(edge).to_vec())
  }
}

impl<C, I> Inner<C, I>
where
  C: Clone + Debug + Send + Sync + 'static,
  I: Clone + Send + Sync + 'static,
{
  fn cursor_of(&self, item: &I) -> C {
    (self.cursor)(item)
  }

  async fn fetch(&self, range: Range<C>) -> Result<Vec<I>, LoadError> {
    debug!(
      list = %self.name,
      direction = range.direction.as_str(),
      count = range.count,
      after = ?range.after,
      before = ?range.before,
      "fetching range"
    );
    (self.load)(range).await
  }

  async fn extend(
    &self,
    edge: Edge,
    base: &Segments<I>,
    count: usize,
  ) -> Result<Segments<I>, LoadError> {
    let mut segments = base.clone();
    match edge {
      Edge::First => self.load_first(&mut segments, count).await?,
      Edge::Next => self.fill_next(&mut segments, count).await?,
      Edge::Last => self.load_last(&mut segments, count).await?,
      Edge::Prev => self.fill_prev(&mut segments, count).await?,
    }
    Ok(segments)
  }

  async fn load_first(&self, segments: &mut Segments<I>, count: usize) -> Result<(), LoadError> {
    let before = segments.first().map(|s| self.cursor_of(&s[0]));
    let items = self
      .fetch(Range {
        direction: RangeDirection::First,
        count,
        after: None,
        before,
      })
      .await?;

    // A short page proves nothing new sits in front of the first segment
    if items.len() < count && !segments.is_empty() {
      segments.prepend_first(items);
      let len = segments.first_len();
      if len < count {
        self.fill_next(segments, count - len).await?;
      }
    } else {
      segments.push_first(items);
    }
    Ok(())
  }

  async fn fill_next(&self, segments: &mut Segments<I>, mut count: usize) -> Result<(), LoadError> {
    loop {
      let expected = segments.first_len() + count;
      let after = segments.first().and_then(<[I]>::last).map(|i| self.cursor_of(i));
      let before = segments.get(1).map(|s| self.cursor_of(&s[0]));
      let items = self
        .fetch(Range {
          direction: RangeDirection::First,
          count,
          after,
          before,
        })
        .await?;

      // A short page closes the gap to the second segment
      if items.len() < count && segments.len() > 1 {
        trace!(list = %self.name, "merging first two segments");
        segments.merge_first(items);
        let len = segments.first_len();
        if len < expected {
          count = expected - len;
          continue;
        }
      } else {
        segments.append_first(items);
      }
      return Ok(());
    }
  }

  async fn load_last(&self, segments: &mut Segments<I>, count: usize) -> Result<(), LoadError> {
    let after = segments.last().and_then(<[I]>::last).map(|i| self.cursor_of(i));
    let items = self
      .fetch(Range {
        direction: RangeDirection::Last,
        count,
        after,
        before: None,
      })
      .await?;

    if items.len() < count && !segments.is_empty() {
      segments.append_last(items);
      let len = segments.last_len();
      if len < count {
        self.fill_prev(segments, count - len).await?;
      }
    } else {
      segments.push_last(items);
    }
    Ok(())
  }

  async fn fill_prev(&self, segments: &mut Segments<I>, mut count: usize) -> Result<(), LoadError> {
    loop {
      let expected = segments.last_len() + count;
      let n = segments.len();
      let before = segments.last().map(|s| self.cursor_of(&s[0]));
      let after = n
        .checked_sub(2)
        .and_then(|i| segments.get(i))
        .and_then(<[I]>::last)
        .map(|i| self.cursor_of(i));
      let items = self
        .fetch(Range {
          direction: RangeDirection::Last,
          count,
          after,
          before,
        })
        .await?;

      if items.len() < count && n > 1 {
        trace!(list = %self.name, "merging last two segments");
        segments.merge_last(items);
        let len = segments.last_len();
        if len < expected {
          count = expected - len;
          continue;
        }
      } else {
        segments.prepend_last(items);
      }
      return Ok(());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::time::Duration;

  struct Feed {
    items: Arc<Mutex<Vec<u32>>>,
    calls: Arc<Mutex<Vec<Range<u32>>>>,
    failing: Arc<AtomicBool>,
  }

  impl Feed {
    fn new(items: Vec<u32>) -> Self {
      Self {
        items: Arc::new(Mutex::new(items)),
        calls: Arc::new(Mutex::new(Vec::new())),
        failing: Arc::new(AtomicBool::new(false)),
      }
    }

    fn ten() -> Self {
      Self::new((201..=210).collect())
    }

    fn list(&self) -> SegmentedListCache<u32, u32> {
      let items = self.items.clone();
      let calls = self.calls.clone();
      let failing = self.failing.clone();
      SegmentedListCache::new(
        "numbers",
        |item: &u32| *item,
        move |range: Range<u32>| {
          let items = items.clone();
          let calls = calls.clone();
          let failing = failing.clone();
          async move {
            calls.lock().unwrap().push(range.clone());
            if failing.load(Ordering::SeqCst) {
              return Err(LoadError::Abandoned);
            }
            let within: Vec<u32> = items
              .lock()
              .unwrap()
              .iter()
              .copied()
              .filter(|i| range.after.map_or(true, |a| *i > a))
              .filter(|i| range.before.map_or(true, |b| *i < b))
              .collect();
            let selected: Vec<u32> = match range.direction {
              RangeDirection::First => within.into_iter().take(range.count).collect(),
              RangeDirection::Last => within[within.len().saturating_sub(range.count)..].to_vec(),
            };
            Ok(selected)
          }
        },
      )
    }

    fn publish_first(&self, new: &[u32]) {
      let mut items = self.items.lock().unwrap();
      for (i, item) in new.iter().enumerate() {
        items.insert(i, *item);
      }
    }

    fn calls(&self) -> Vec<Range<u32>> {
      self.calls.lock().unwrap().clone()
    }
  }

  fn first(count: usize, after: Option<u32>, before: Option<u32>) -> Range<u32> {
    Range {
      direction: RangeDirection::First,
      count,
      after,
      before,
    }
  }

  fn last(count: usize, after: Option<u32>, before: Option<u32>) -> Range<u32> {
    Range {
      direction: RangeDirection::Last,
      count,
      after,
      before,
    }
  }

  #[tokio::test]
  async fn test_zero_count_makes_no_request() {
    let feed = Feed::ten();
    let list = feed.list();

    assert!(list.load_first(0).await.unwrap().is_empty());
    assert!(list.load_next(0).await.unwrap().is_empty());
    assert!(feed.calls().is_empty());
  }

  #[tokio::test]
  async fn test_zero_count_returns_cached_boundary() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(5).await.unwrap();
    assert_eq!(list.load_first(0).await.unwrap(), vec![201, 202, 203, 204, 205]);
    assert_eq!(feed.calls(), vec![first(5, None, None)]);
  }

  #[tokio::test]
  async fn test_load_first_twice_checks_for_new_items() {
    let feed = Feed::ten();
    let list = feed.list();

    assert_eq!(list.load_first(3).await.unwrap(), vec![201, 202, 203]);
    assert_eq!(list.load_first(3).await.unwrap(), vec![201, 202, 203]);
    assert_eq!(
      feed.calls(),
      vec![first(3, None, None), first(3, None, Some(201))]
    );
  }

  #[tokio::test]
  async fn test_load_first_merges_newly_published_items() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(3).await.unwrap();
    feed.publish_first(&[101, 102]);

    assert_eq!(
      list.load_first(3).await.unwrap(),
      vec![101, 102, 201, 202, 203]
    );
  }

  #[tokio::test]
  async fn test_load_first_keeps_a_gap_when_page_is_full() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(3).await.unwrap();
    feed.publish_first(&[101, 102, 103]);

    assert_eq!(list.load_first(3).await.unwrap(), vec![101, 102, 103]);
    let segments = list.read().ready().unwrap();
    assert_eq!(segments.len(), 2);
  }

  #[tokio::test]
  async fn test_load_first_fills_shortfall_after_cached_segment() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(3).await.unwrap();
    assert_eq!(
      list.load_first(5).await.unwrap(),
      vec![201, 202, 203, 204, 205]
    );
    assert_eq!(
      feed.calls(),
      vec![
        first(3, None, None),
        first(5, None, Some(201)),
        first(2, Some(203), None),
      ]
    );
  }

  #[tokio::test]
  async fn test_load_first_returns_more_than_requested() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(5).await.unwrap();
    assert_eq!(
      list.load_first(3).await.unwrap(),
      vec![201, 202, 203, 204, 205]
    );
    assert_eq!(
      feed.calls(),
      vec![first(5, None, None), first(3, None, Some(201))]
    );
  }

  #[tokio::test]
  async fn test_next_merges_with_last_segment() {
    let feed = Feed::ten();
    let list = feed.list();

    assert_eq!(
      list.load_next(5).await.unwrap(),
      vec![201, 202, 203, 204, 205]
    );
    assert_eq!(
      list.load_last(5).await.unwrap(),
      vec![206, 207, 208, 209, 210]
    );
    assert_eq!(
      list.load_next(1).await.unwrap(),
      (201..=210).collect::<Vec<_>>()
    );
    assert_eq!(
      feed.calls(),
      vec![
        first(5, None, None),
        last(5, Some(205), None),
        first(1, Some(205), Some(206)),
      ]
    );
    assert_eq!(list.read().ready().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_next_continues_past_merged_segment() {
    let feed = Feed::new((201..=220).collect());
    let list = feed.list();

    list.load_first(3).await.unwrap();
    list.load_last(3).await.unwrap();
    feed.items.lock().unwrap().retain(|i| *i <= 205 || *i >= 218);

    // 204 and 205 close the gap, then 2 more are owed past the merged segment
    assert_eq!(
      list.load_next(7).await.unwrap(),
      vec![201, 202, 203, 204, 205, 218, 219, 220]
    );
    assert_eq!(
      feed.calls(),
      vec![
        first(3, None, None),
        last(3, Some(203), None),
        first(7, Some(203), Some(218)),
        first(2, Some(220), None),
      ]
    );
  }

  #[tokio::test]
  async fn test_load_last_then_prev() {
    let feed = Feed::ten();
    let list = feed.list();

    assert_eq!(list.load_last(3).await.unwrap(), vec![208, 209, 210]);
    assert_eq!(
      list.load_prev(2).await.unwrap(),
      vec![206, 207, 208, 209, 210]
    );
    assert_eq!(
      feed.calls(),
      vec![last(3, None, None), last(2, None, Some(208))]
    );
  }

  #[tokio::test]
  async fn test_load_last_fills_shortfall_before_cached_segment() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_last(3).await.unwrap();
    assert_eq!(
      list.load_last(5).await.unwrap(),
      vec![206, 207, 208, 209, 210]
    );
    assert_eq!(
      feed.calls(),
      vec![
        last(3, None, None),
        last(5, Some(210), None),
        last(2, None, Some(208)),
      ]
    );
  }

  #[tokio::test]
  async fn test_prev_merges_with_first_segment() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(4).await.unwrap();
    list.load_last(4).await.unwrap();
    assert_eq!(
      list.load_prev(4).await.unwrap(),
      (201..=210).collect::<Vec<_>>()
    );
    assert_eq!(
      feed.calls()[2],
      last(4, Some(204), Some(207))
    );
  }

  #[tokio::test]
  async fn test_concurrent_operations_run_in_order() {
    let feed = Feed::ten();
    let list = feed.list();

    let (a, b) = tokio::join!(list.load_first(3), list.load_next(2));

    assert_eq!(a.unwrap(), vec![201, 202, 203]);
    assert_eq!(b.unwrap(), vec![201, 202, 203, 204, 205]);
    assert_eq!(
      feed.calls(),
      vec![first(3, None, None), first(2, Some(203), None)]
    );
  }

  #[tokio::test]
  async fn test_failed_operation_keeps_last_good_segments() {
    let feed = Feed::ten();
    let list = feed.list();

    list.load_first(3).await.unwrap();
    feed.failing.store(true, Ordering::SeqCst);
    assert!(list.load_next(2).await.is_err());
    assert!(list.read().is_failed());

    let snapshot = list.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.segments.first(), Some(&[201, 202, 203][..]));

    feed.failing.store(false, Ordering::SeqCst);
    assert_eq!(
      list.load_next(2).await.unwrap(),
      vec![201, 202, 203, 204, 205]
    );
    assert_eq!(feed.calls()[2], first(2, Some(203), None));
  }

  #[tokio::test]
  async fn test_subscribers_hear_about_loads() {
    let feed = Feed::ten();
    let list = feed.list();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    list.segments().subscribe(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
    });

    list.load_first(3).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(notified.load(Ordering::SeqCst) >= 1);
    assert_eq!(list.snapshot().segments.item_count(), 3);
  }
}
