//! Per-key entity cache with deduplicated loads.

use futures::future::{join_all, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

use super::async_value::{AsyncValue, Read};
use super::cell::ObservableCell;
use super::error::LoadError;
use super::lock;
use super::traits::{LoadFn, LoadFuture, LoadManyFn, Repairable};

type Entry<D> = ObservableCell<AsyncValue<D>>;

/// A cache of entities addressed by key.
///
/// Every key owns exactly one observable entry. The first access starts the
/// load, and every later caller shares it until it settles, so there is at
/// most one fetch in flight per key.
pub struct EntityCache<K, D> {
  name: Arc<str>,
  load: LoadFn<K, D>,
  load_many: Option<LoadManyFn<K, D>>,
  entries: Arc<Mutex<HashMap<K, Entry<D>>>>,
}

impl<K, D> Clone for EntityCache<K, D> {
  fn clone(&self) -> Self {
    Self {
      name: Arc::clone(&self.name),
      load: Arc::clone(&self.load),
      load_many: self.load_many.clone(),
      entries: Arc::clone(&self.entries),
    }
  }
}

impl<K, D> EntityCache<K, D>
where
  K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
  D: Clone + Send + Sync + 'static,
{
  /// Create a cache with a single-key loader.
  pub fn new<F, Fut>(name: impl Into<Arc<str>>, load: F) -> Self
  where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, LoadError>> + Send + 'static,
  {
    Self {
      name: name.into(),
      load: Arc::new(move |key| load(key).boxed()),
      load_many: None,
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Add a batch loader used by `preload_many` and `load_many`.
  ///
  /// It must return one result per key, in the order the keys were given.
  pub fn with_load_many<F, Fut>(mut self, load_many: F) -> Self
  where
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Result<D, LoadError>>, LoadError>> + Send + 'static,
  {
    self.load_many = Some(Arc::new(move |keys| load_many(keys).boxed()));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<D>>> {
    lock(&self.entries)
  }

  /// Start a load for `key`. The loader itself is not called until the
  /// returned value is first polled, so it never runs under the entries lock.
  fn fetch(&self, key: K) -> AsyncValue<D> {
    let load = Arc::clone(&self.load);
    let name = Arc::clone(&self.name);
    AsyncValue::pending(async move {
      debug!(cache = %name, ?key, "loading entry");
      let result = load(key.clone()).await;
      if let Err(e) = &result {
        warn!(cache = %name, ?key, error = %e, "entry failed to load");
      }
      result
    })
  }

  /// The entry for `key`, created (and its load started) if absent.
  pub fn entry(&self, key: K) -> Entry<D> {
    let mut entries = self.entries();
    if let Some(cell) = entries.get(&key) {
      return cell.clone();
    }
    let cell = ObservableCell::new(self.fetch(key.clone()));
    entries.insert(key, cell.clone());
    cell
  }

  pub fn contains(&self, key: &K) -> bool {
    self.entries().contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }

  /// Load the value for `key`, sharing any load already in flight.
  pub fn load(&self, key: K) -> LoadFuture<D> {
    self.entry(key).get().promise()
  }

  /// Start loading `key` without waiting for it.
  pub fn preload(&self, key: K) {
    self.entry(key);
  }

  /// Read `key` synchronously. A pending read carries the handle to wait on.
  pub fn read(&self, key: K) -> Read<D> {
    self.entry(key).get().suspend()
  }

  /// Commit `data` for `key`, replacing whatever the entry held before,
  /// including a load still in flight.
  pub fn insert(&self, key: K, data: D) {
    let value = AsyncValue::resolved(data);
    let existing = {
      let mut entries = self.entries();
      match entries.get(&key) {
        Some(cell) => cell.clone(),
        None => {
          trace!(cache = %self.name, ?key, "inserting new entry");
          entries.insert(key, ObservableCell::new(value));
          return;
        }
      }
    };
    existing.set(value);
  }

  /// Start loading every key not already cached.
  ///
  /// Duplicate keys are fetched once. With a batch loader, all missing keys
  /// go out in a single call and each key settles on its own slot of the
  /// result. Without one, each key is preloaded individually.
  pub fn preload_many(&self, keys: impl IntoIterator<Item = K>) {
    let Some(load_many) = self.load_many.clone() else {
      for key in keys {
        self.preload(key);
      }
      return;
    };

    let mut entries = self.entries();
    let mut seen = HashSet::new();
    let missing: Vec<K> = keys
      .into_iter()
      .filter(|key| !entries.contains_key(key) && seen.insert(key.clone()))
      .collect();
    if missing.is_empty() {
      return;
    }

    debug!(cache = %self.name, count = missing.len(), "loading entries in batch");
    let expected = missing.len();
    let name = Arc::clone(&self.name);
    let batch_keys = missing.clone();
    let batch: Shared<LoadFuture<Arc<Vec<Result<D, LoadError>>>>> = async move {
      let results = load_many(batch_keys).await?;
      if results.len() != expected {
        error!(
          cache = %name,
          expected,
          actual = results.len(),
          "batch loader returned the wrong number of results"
        );
        return Err(LoadError::ContractViolation {
          expected,
          actual: results.len(),
        });
      }
      Ok(Arc::new(results))
    }
    .boxed()
    .shared();

    for (index, key) in missing.into_iter().enumerate() {
      let batch = batch.clone();
      let value = AsyncValue::pending(async move {
        let results = batch.await?;
        results[index].clone()
      });
      entries.insert(key, ObservableCell::new(value));
    }
  }

  /// Load every key, batching the ones not yet cached. Results are returned
  /// in the order of `keys`; one failed key does not fail its siblings.
  pub async fn load_many(&self, keys: Vec<K>) -> Vec<Result<D, LoadError>> {
    self.preload_many(keys.iter().cloned());
    join_all(keys.into_iter().map(|key| self.load(key))).await
  }

  /// Reload `key` regardless of its current state.
  ///
  /// A load already in flight is reused rather than duplicated.
  pub fn force_reload(&self, key: K) -> LoadFuture<D> {
    let existing = self.entries().get(&key).cloned();
    let Some(cell) = existing else {
      return self.load(key);
    };
    let current = cell.get();
    if current.is_pending() {
      return current.promise();
    }
    debug!(cache = %self.name, ?key, "reloading entry");
    let value = self.fetch(key);
    cell.set(value.clone());
    value.promise()
  }
}

impl<K, D> Repairable for EntityCache<K, D>
where
  K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
  D: Clone + Send + Sync + 'static,
{
  fn force_reload_failed_entries(&self) -> usize {
    let failed: Vec<(K, Entry<D>)> = self
      .entries()
      .iter()
      .filter(|(_, cell)| cell.get().is_rejected())
      .map(|(key, cell)| (key.clone(), cell.clone()))
      .collect();

    for (key, cell) in &failed {
      cell.set(self.fetch(key.clone()));
    }
    if !failed.is_empty() {
      debug!(cache = %self.name, count = failed.len(), "reloading failed entries");
    }
    failed.len()
  }
}
