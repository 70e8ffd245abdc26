//! A mutable value that can be watched for changes.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tracing::trace;

use super::lock;

/// Identifies a subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct CellState<V> {
  value: V,
  subscribers: BTreeMap<SubscriptionId, Subscriber<V>>,
  next_id: u64,
  /// Set while a notification task is queued
  notify_queued: bool,
  /// Set while a change has not been delivered yet
  dirty: bool,
}

/// A mutable container whose subscribers are told about changes.
///
/// `set()` does not call subscribers directly. It schedules one notification
/// on the runtime, so a burst of `set()` calls made without yielding results
/// in a single callback carrying the last value.
pub struct ObservableCell<V> {
  state: Arc<Mutex<CellState<V>>>,
}

impl<V> Clone for ObservableCell<V> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<V> ObservableCell<V>
where
  V: Clone + PartialEq + Send + 'static,
{
  pub fn new(value: V) -> Self {
    Self {
      state: Arc::new(Mutex::new(CellState {
        value,
        subscribers: BTreeMap::new(),
        next_id: 0,
        notify_queued: false,
        dirty: false,
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, CellState<V>> {
    lock(&self.state)
  }

  /// The value at this moment. Subscribe to hear about later changes.
  pub fn get(&self) -> V {
    self.lock().value.clone()
  }

  /// Replace the value and schedule a notification.
  ///
  /// Does nothing when the new value equals the current one.
  pub fn set(&self, value: V) {
    let schedule = {
      let mut state = self.lock();
      if state.value == value {
        return;
      }
      state.value = value;
      state.dirty = true;
      let schedule = !state.notify_queued;
      state.notify_queued = true;
      schedule
    };
    if schedule {
      self.schedule_notify();
    }
  }

  /// Replace the value and call subscribers before returning. A notification
  /// already queued stays queued but finds nothing to deliver.
  pub fn set_sync(&self, value: V) {
    let (value, subscribers) = {
      let mut state = self.lock();
      if state.value == value {
        return;
      }
      state.value = value;
      state.dirty = false;
      (state.value.clone(), state.subscribers.values().cloned().collect::<Vec<_>>())
    };
    for subscriber in subscribers {
      subscriber(&value);
    }
  }

  /// Set the value computed from the current one.
  pub fn update(&self, updater: impl FnOnce(&V) -> V) {
    let current = self.get();
    self.set(updater(&current));
  }

  pub fn subscribe(&self, subscriber: impl Fn(&V) + Send + Sync + 'static) -> SubscriptionId {
    let mut state = self.lock();
    let id = SubscriptionId(state.next_id);
    state.next_id += 1;
    state.subscribers.insert(id, Arc::new(subscriber));
    id
  }

  /// Returns `false` if the subscription was already gone.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    self.lock().subscribers.remove(&id).is_some()
  }

  pub fn subscriber_count(&self) -> usize {
    self.lock().subscribers.len()
  }

  fn schedule_notify(&self) {
    match Handle::try_current() {
      Ok(runtime) => {
        let cell = self.clone();
        runtime.spawn(async move { cell.flush() });
      }
      Err(_) => {
        trace!("no runtime available, notifying subscribers synchronously");
        self.flush();
      }
    }
  }

  fn flush(&self) {
    let (value, subscribers) = {
      let mut state = self.lock();
      state.notify_queued = false;
      // `set_sync` may have delivered already
      if !state.dirty {
        return;
      }
      state.dirty = false;
      (state.value.clone(), state.subscribers.values().cloned().collect::<Vec<_>>())
    };
    for subscriber in subscribers {
      subscriber(&value);
    }
  }
}
