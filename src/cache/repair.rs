//! Reload failed entries across every registered cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;

use super::error::RepairError;
use super::lock;
use super::traits::Repairable;

/// A set of named caches that can be asked to retry their failed entries,
/// for instance after the network comes back.
#[derive(Default)]
pub struct RepairRegistry {
  caches: Mutex<BTreeMap<String, Arc<dyn Repairable>>>,
}

impl RepairRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `cache` under `name`. Each name may only be registered once.
  pub fn register(
    &self,
    name: impl Into<String>,
    cache: Arc<dyn Repairable>,
  ) -> Result<(), RepairError> {
    let name = name.into();
    let mut caches = lock(&self.caches);
    if caches.contains_key(&name) {
      return Err(RepairError::AlreadyRegistered(name));
    }
    caches.insert(name, cache);
    Ok(())
  }

  /// Returns `false` if nothing was registered under `name`.
  pub fn unregister(&self, name: &str) -> bool {
    lock(&self.caches).remove(name).is_some()
  }

  pub fn names(&self) -> Vec<String> {
    lock(&self.caches).keys().cloned().collect()
  }

  /// Reload every failed entry of every registered cache.
  ///
  /// This walks every entry of every cache, so it is not cheap. Returns the
  /// number of reloads started.
  pub fn attempt(&self) -> usize {
    let caches: Vec<(String, Arc<dyn Repairable>)> = lock(&self.caches)
      .iter()
      .map(|(name, cache)| (name.clone(), Arc::clone(cache)))
      .collect();

    let mut total = 0;
    for (name, cache) in caches {
      let reloaded = cache.force_reload_failed_entries();
      if reloaded > 0 {
        info!(cache = %name, reloaded, "repairing failed entries");
      }
      total += reloaded;
    }
    total
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Broken {
    failed: usize,
    calls: AtomicUsize,
  }

  impl Repairable for Broken {
    fn force_reload_failed_entries(&self) -> usize {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.failed
    }
  }

  fn broken(failed: usize) -> Arc<Broken> {
    Arc::new(Broken {
      failed,
      calls: AtomicUsize::new(0),
    })
  }

  #[test]
  fn test_attempt_repairs_every_cache() {
    let registry = RepairRegistry::new();
    let posts = broken(2);
    let accounts = broken(1);
    registry.register("posts", posts.clone()).unwrap();
    registry.register("accounts", accounts.clone()).unwrap();

    assert_eq!(registry.attempt(), 3);
    assert_eq!(posts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(accounts.calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_register_twice_fails() {
    let registry = RepairRegistry::new();
    registry.register("posts", broken(0)).unwrap();

    assert_eq!(
      registry.register("posts", broken(0)),
      Err(RepairError::AlreadyRegistered("posts".into()))
    );
  }

  #[test]
  fn test_unregistered_cache_is_skipped() {
    let registry = RepairRegistry::new();
    let posts = broken(4);
    registry.register("posts", posts.clone()).unwrap();

    assert!(registry.unregister("posts"));
    assert!(!registry.unregister("posts"));
    assert_eq!(registry.attempt(), 0);
    assert_eq!(posts.calls.load(Ordering::SeqCst), 0);
    assert!(registry.names().is_empty());
  }
}
