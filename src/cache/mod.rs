//! Client-side caching primitives.
//!
//! Every cache here is fed by loader functions supplied by the caller and
//! never talks to the network itself:
//! - `AsyncValue` and `ObservableCell` are the building blocks for
//!   synchronous-looking reads of asynchronously loaded data
//! - `EntityCache` holds entities by key with at most one load in flight per key
//! - `SegmentedListCache` holds cursor-paginated, append-only lists
//! - `SkimCache` holds offset/limit lists that can be read at any position
//! - `Paginator` holds a list that only ever grows from one end
//! - `SingletonCache` holds one lazily loaded value
//! - `SerializedMutator` queues async updates against one cell
//! - `RepairRegistry` retries failed entries across caches

mod async_value;
mod cell;
mod entity;
mod error;
mod list;
mod mutator;
mod paginator;
mod repair;
mod singleton;
mod skim;
mod traits;

pub use async_value::{AsyncStatus, AsyncValue, LoadHandle, Peek, Read};
pub use cell::{ObservableCell, SubscriptionId};
pub use entity::EntityCache;
pub use error::{LoadError, RepairError};
pub use list::{ListSnapshot, SegmentedListCache, Segments};
pub use mutator::SerializedMutator;
pub use paginator::Paginator;
pub use repair::RepairRegistry;
pub use singleton::SingletonCache;
pub use skim::SkimCache;
pub use traits::{
  CursorFn, LoadFn, LoadFuture, LoadManyFn, OffsetLoadFn, OffsetRange, Range, RangeDirection,
  RangeLoadFn, Repairable, SingletonLoadFn,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
