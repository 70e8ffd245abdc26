//! Cache for a value that is the only one of its kind.

use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use super::async_value::{AsyncValue, Read};
use super::cell::ObservableCell;
use super::error::LoadError;
use super::traits::{LoadFuture, Repairable, SingletonLoadFn};

/// A single lazily loaded value, such as the signed-in account or the
/// metadata of a feed.
///
/// Nothing is fetched until the first read or `preload()`. After that every
/// reader shares the one entry.
pub struct SingletonCache<D> {
  name: Arc<str>,
  load: SingletonLoadFn<D>,
  entry: Arc<OnceLock<ObservableCell<AsyncValue<D>>>>,
}

impl<D> Clone for SingletonCache<D> {
  fn clone(&self) -> Self {
    Self {
      name: Arc::clone(&self.name),
      load: Arc::clone(&self.load),
      entry: Arc::clone(&self.entry),
    }
  }
}

impl<D> SingletonCache<D>
where
  D: Clone + Send + Sync + 'static,
{
  pub fn new<F, Fut>(name: impl Into<Arc<str>>, load: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, LoadError>> + Send + 'static,
  {
    Self {
      name: name.into(),
      load: Arc::new(move || load().boxed()),
      entry: Arc::new(OnceLock::new()),
    }
  }

  fn fetch(&self) -> AsyncValue<D> {
    let load = Arc::clone(&self.load);
    let name = Arc::clone(&self.name);
    AsyncValue::pending(async move {
      debug!(cache = %name, "loading singleton");
      let result = load().await;
      if let Err(e) = &result {
        warn!(cache = %name, error = %e, "singleton failed to load");
      }
      result
    })
  }

  /// The entry, created (and its load started) on first access.
  pub fn entry(&self) -> ObservableCell<AsyncValue<D>> {
    self.entry.get_or_init(|| ObservableCell::new(self.fetch())).clone()
  }

  /// Whether the entry has been created yet.
  pub fn is_initialized(&self) -> bool {
    self.entry.get().is_some()
  }

  /// Start loading if nothing was loaded yet. Otherwise does nothing.
  pub fn preload(&self) {
    self.entry();
  }

  /// Read synchronously. A pending read carries the handle to wait on.
  pub fn read(&self) -> Read<D> {
    self.entry().get().suspend()
  }

  pub fn load(&self) -> LoadFuture<D> {
    self.entry().get().promise()
  }

  /// Commit `data`, replacing whatever the entry held before.
  pub fn insert(&self, data: D) {
    let value = AsyncValue::resolved(data);
    let mut created = false;
    let cell = self.entry.get_or_init(|| {
      created = true;
      ObservableCell::new(value.clone())
    });
    if !created {
      cell.set(value);
    }
  }

  /// Reload regardless of the current state, reusing a load in flight.
  pub fn force_reload(&self) -> LoadFuture<D> {
    let Some(cell) = self.entry.get() else {
      return self.load();
    };
    let current = cell.get();
    if current.is_pending() {
      return current.promise();
    }
    let value = self.fetch();
    cell.set(value.clone());
    value.promise()
  }
}

impl<D> Repairable for SingletonCache<D>
where
  D: Clone + Send + Sync + 'static,
{
  fn force_reload_failed_entries(&self) -> usize {
    match self.entry.get() {
      Some(cell) if cell.get().is_rejected() => {
        cell.set(self.fetch());
        1
      }
      _ => 0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  fn counting(calls: Arc<AtomicUsize>) -> SingletonCache<String> {
    SingletonCache::new("account", move || {
      let calls = calls.clone();
      async move {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(format!("account {n}"))
      }
    })
  }

  #[tokio::test]
  async fn test_nothing_loads_before_first_access() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = counting(calls.clone());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!cache.is_initialized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_read_suspends_then_resolves() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = counting(calls.clone());

    let handle = match cache.read() {
      Read::Pending(handle) => handle,
      other => panic!("expected pending read, got {:?}", other),
    };
    assert_eq!(handle.await.unwrap(), "account 0");
    assert_eq!(cache.read().ready().as_deref(), Some("account 0"));
  }

  #[tokio::test]
  async fn test_preload_and_reads_share_one_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = counting(calls.clone());

    cache.preload();
    cache.preload();
    let (a, b) = tokio::join!(cache.load(), cache.clone().load());

    assert_eq!(a.unwrap(), "account 0");
    assert_eq!(b.unwrap(), "account 0");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_insert_before_access_never_fetches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = counting(calls.clone());

    cache.insert("known".into());
    cache.insert("newer".into());

    assert_eq!(cache.load().await.unwrap(), "newer");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_force_reload_fetches_again_once_settled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = counting(calls.clone());

    cache.preload();
    assert_eq!(cache.force_reload().await.unwrap(), "account 0");
    assert_eq!(cache.force_reload().await.unwrap(), "account 1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_failed_load_can_be_repaired() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let cache = SingletonCache::new("account", move || {
      let attempt = counter.fetch_add(1, Ordering::SeqCst);
      async move {
        if attempt == 0 {
          Err(LoadError::NotFound("account".into()))
        } else {
          Ok(attempt)
        }
      }
    });

    assert!(cache.load().await.is_err());
    assert!(cache.read().is_failed());

    assert_eq!(cache.force_reload_failed_entries(), 1);
    assert_eq!(cache.load().await.unwrap(), 1);
    assert_eq!(cache.force_reload_failed_entries(), 0);
  }
}
