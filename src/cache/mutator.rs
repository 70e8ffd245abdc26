//! Sequential asynchronous updates of an observable value.

use futures::future::{self, BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::warn;

use super::cell::ObservableCell;
use super::error::LoadError;
use super::lock;
use super::traits::LoadFuture;

type Link = Shared<BoxFuture<'static, ()>>;

/// Runs async updaters against one cell strictly in call order.
///
/// Each updater sees the value left by the one before it, and the cell only
/// changes once an updater has produced its whole result. A failed updater
/// leaves the cell as it was and does not stop later updaters.
pub struct SerializedMutator<V> {
  cell: ObservableCell<V>,
  /// Completes once the most recently queued updater has finished
  tail: Arc<Mutex<Link>>,
}

impl<V> Clone for SerializedMutator<V> {
  fn clone(&self) -> Self {
    Self {
      cell: self.cell.clone(),
      tail: Arc::clone(&self.tail),
    }
  }
}

impl<V> SerializedMutator<V>
where
  V: Clone + PartialEq + Send + Sync + 'static,
{
  pub fn new(cell: ObservableCell<V>) -> Self {
    Self {
      cell,
      tail: Arc::new(Mutex::new(future::ready(()).boxed().shared())),
    }
  }

  pub fn cell(&self) -> &ObservableCell<V> {
    &self.cell
  }

  pub fn get(&self) -> V {
    self.cell.get()
  }

  /// Queue `updater` behind every update already queued.
  ///
  /// The update runs even if the returned future is dropped.
  pub fn update<F, Fut>(&self, updater: F) -> LoadFuture<V>
  where
    F: FnOnce(V) -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, LoadError>> + Send + 'static,
  {
    let (tx, rx) = oneshot::channel();
    let cell = self.cell.clone();

    let link = {
      let mut tail = lock(&self.tail);
      let previous = tail.clone();
      let link: Link = async move {
        previous.await;
        let result = updater(cell.get()).await;
        match &result {
          Ok(value) => cell.set(value.clone()),
          Err(e) => warn!(error = %e, "update failed, keeping previous value"),
        }
        let _ = tx.send(result);
      }
      .boxed()
      .shared();
      *tail = link.clone();
      link
    };

    if let Ok(runtime) = Handle::try_current() {
      runtime.spawn(link.clone());
    }

    async move {
      link.await;
      rx.await.unwrap_or(Err(LoadError::Abandoned))
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_updates_run_in_call_order() {
    let mutator = SerializedMutator::new(ObservableCell::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));

    let step = |delay: u64, f: fn(i32) -> i32, name: &'static str| {
      let log = log.clone();
      move |value: i32| async move {
        log.lock().unwrap().push(format!("start {name}"));
        tokio::time::sleep(Duration::from_millis(delay)).await;
        log.lock().unwrap().push(format!("end {name}"));
        Ok(f(value))
      }
    };

    let a = mutator.update(step(30, |v| v + 1, "a"));
    let b = mutator.update(step(10, |v| v * 10, "b"));
    let c = mutator.update(step(0, |v| v + 5, "c"));
    let (a, b, c) = tokio::join!(a, b, c);

    assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 10, 15));
    assert_eq!(mutator.get(), 15);
    assert_eq!(
      *log.lock().unwrap(),
      vec!["start a", "end a", "start b", "end b", "start c", "end c"]
    );
  }

  #[tokio::test]
  async fn test_cell_changes_only_when_update_completes() {
    let mutator = SerializedMutator::new(ObservableCell::new(String::from("old")));

    let pending = mutator.update(|_| async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok(String::from("new"))
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(mutator.get(), "old");

    assert_eq!(pending.await.unwrap(), "new");
    assert_eq!(mutator.get(), "new");
  }

  #[tokio::test]
  async fn test_failed_update_does_not_block_later_ones() {
    let mutator = SerializedMutator::new(ObservableCell::new(1));

    let failed = mutator.update(|_| async { Err(LoadError::NotFound("value".into())) });
    let next = mutator.update(|v| async move { Ok(v + 1) });

    assert!(failed.await.is_err());
    assert_eq!(next.await.unwrap(), 2);
    assert_eq!(mutator.get(), 2);
  }

  #[tokio::test]
  async fn test_dropped_update_still_applies() {
    let mutator = SerializedMutator::new(ObservableCell::new(0));

    drop(mutator.update(|v| async move { Ok(v + 1) }));
    let next = mutator.update(|v| async move { Ok(v + 1) });

    assert_eq!(next.await.unwrap(), 2);
  }
}
