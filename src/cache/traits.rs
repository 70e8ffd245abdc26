//! Core traits and types for the caching system.
//!
//! These are the contracts between the caches and the loaders supplied by
//! the caller. The caches never talk to the network themselves.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::LoadError;

/// A boxed future resolving to a loaded value.
pub type LoadFuture<T> = BoxFuture<'static, Result<T, LoadError>>;

/// Loads a single entity by key.
pub type LoadFn<K, D> = Arc<dyn Fn(K) -> LoadFuture<D> + Send + Sync>;

/// Loads many entities at once. The result must have one slot per key, in the
/// order the keys were given.
pub type LoadManyFn<K, D> =
  Arc<dyn Fn(Vec<K>) -> LoadFuture<Vec<Result<D, LoadError>>> + Send + Sync>;

/// Loads a value that has no key.
pub type SingletonLoadFn<D> = Arc<dyn Fn() -> LoadFuture<D> + Send + Sync>;

/// Loads the items of a cursor-bounded range.
pub type RangeLoadFn<C, I> = Arc<dyn Fn(Range<C>) -> LoadFuture<Vec<I>> + Send + Sync>;

/// Loads the items of an offset/limit window.
pub type OffsetLoadFn<I> = Arc<dyn Fn(OffsetRange) -> LoadFuture<Vec<I>> + Send + Sync>;

/// Extracts the cursor of an item.
pub type CursorFn<I, C> = Arc<dyn Fn(&I) -> C + Send + Sync>;

/// Which end of a range the loader should select items from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeDirection {
  /// Select the first `count` items after `after`.
  First,
  /// Select the last `count` items before `before`.
  Last,
}

impl RangeDirection {
  pub fn as_str(&self) -> &'static str {
    match self {
      RangeDirection::First => "first",
      RangeDirection::Last => "last",
    }
  }
}

/// A page of a cursor-ordered list.
///
/// Loaders must return at most `count` items lying strictly between `after`
/// and `before`, in ascending cursor order. Returning fewer than `count` items
/// means the range is exhausted; the list cache merges segments based on that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<C> {
  pub direction: RangeDirection,
  pub count: usize,
  /// Exclusive lower bound
  pub after: Option<C>,
  /// Exclusive upper bound
  pub before: Option<C>,
}

/// An offset/limit window into an append-only list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
  pub limit: usize,
  pub offset: usize,
}

impl OffsetRange {
  pub fn new(offset: usize, limit: usize) -> Self {
    Self { limit, offset }
  }

  /// One past the last index covered by this window, saturating at
  /// `usize::MAX`.
  pub fn end(&self) -> usize {
    self.offset.saturating_add(self.limit)
  }
}

/// A cache whose failed entries can be reloaded on demand.
pub trait Repairable: Send + Sync {
  /// Reload every entry currently in a failed state. Returns how many
  /// reloads were started.
  fn force_reload_failed_entries(&self) -> usize;
}
