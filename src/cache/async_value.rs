//! Values that may still be loading.
//!
//! `AsyncValue<T>` wraps either a value we already have or a shared handle to
//! a load that is still running. It lets a render pass read the value
//! synchronously and tells it what to wait on when the value is not there yet.
//!
//! # Example
//!
//! ```ignore
//! let value = AsyncValue::pending(async move { api.get_item("p1").await });
//!
//! // In render
//! match value.suspend() {
//!     Read::Ready(item) => render_item(&item),
//!     Read::Pending(handle) => wait_then_rerender(handle),
//!     Read::Failed(e) => render_error(&e),
//! }
//! ```

use futures::future::{self, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;

use super::error::LoadError;
use super::traits::LoadFuture;

/// A shared handle to an in-flight load. Every clone resolves to the same
/// result and the load itself runs only once.
pub type LoadHandle<T> = Shared<LoadFuture<T>>;

/// The status of an async value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
  Pending,
  Resolved,
  Rejected,
}

/// The result of a synchronous read.
pub enum Read<T> {
  /// The value is available
  Ready(T),
  /// The value is still loading; await the handle and read again
  Pending(LoadHandle<T>),
  /// The load failed
  Failed(LoadError),
}

impl<T> Read<T> {
  pub fn is_ready(&self) -> bool {
    matches!(self, Read::Ready(_))
  }

  pub fn is_pending(&self) -> bool {
    matches!(self, Read::Pending(_))
  }

  pub fn is_failed(&self) -> bool {
    matches!(self, Read::Failed(_))
  }

  pub fn ready(self) -> Option<T> {
    match self {
      Read::Ready(value) => Some(value),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&LoadError> {
    match self {
      Read::Failed(e) => Some(e),
      _ => None,
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Read<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Read::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
      Read::Pending(_) => f.write_str("Pending"),
      Read::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
    }
  }
}

enum State<T> {
  Resolved(T),
  Rejected(LoadError),
  Pending(LoadHandle<T>),
}

/// A value which is resolved, rejected, or still loading.
///
/// Cloning is cheap and clones share identity: two `AsyncValue`s compare equal
/// only when they are clones of the same construction. Observable cells rely
/// on that to skip redundant updates.
pub struct AsyncValue<T> {
  state: Arc<State<T>>,
}

impl<T> Clone for AsyncValue<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<T> PartialEq for AsyncValue<T> {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.state, &other.state)
  }
}

impl<T> AsyncValue<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Create an already resolved value. It never transitions.
  pub fn resolved(value: T) -> Self {
    Self {
      state: Arc::new(State::Resolved(value)),
    }
  }

  /// Create an already rejected value.
  pub fn rejected(error: LoadError) -> Self {
    Self {
      state: Arc::new(State::Rejected(error)),
    }
  }

  /// Create a value from a load that is still running.
  ///
  /// When called inside a tokio runtime the load is spawned so it makes
  /// progress (and settles this value) even if nobody awaits it. Outside a
  /// runtime it runs the first time someone awaits `promise()`.
  pub fn pending<F>(load: F) -> Self
  where
    F: Future<Output = Result<T, LoadError>> + Send + 'static,
  {
    let handle: LoadHandle<T> = load.boxed().shared();
    if let Ok(runtime) = Handle::try_current() {
      let driver = handle.clone();
      runtime.spawn(async move {
        let _ = driver.await;
      });
    }
    Self {
      state: Arc::new(State::Pending(handle)),
    }
  }

  /// Create a settled value from a result.
  pub fn from_result(result: Result<T, LoadError>) -> Self {
    match result {
      Ok(value) => Self::resolved(value),
      Err(error) => Self::rejected(error),
    }
  }

  pub fn status(&self) -> AsyncStatus {
    match &*self.state {
      State::Resolved(_) => AsyncStatus::Resolved,
      State::Rejected(_) => AsyncStatus::Rejected,
      State::Pending(handle) => match handle.peek() {
        None => AsyncStatus::Pending,
        Some(Ok(_)) => AsyncStatus::Resolved,
        Some(Err(_)) => AsyncStatus::Rejected,
      },
    }
  }

  pub fn is_pending(&self) -> bool {
    self.status() == AsyncStatus::Pending
  }

  pub fn is_rejected(&self) -> bool {
    self.status() == AsyncStatus::Rejected
  }

  /// Read the value, handing back the pending handle if it is still loading.
  ///
  /// A captured failure is returned as `Err`.
  pub fn peek(&self) -> Result<Peek<T>, LoadError> {
    match self.suspend() {
      Read::Ready(value) => Ok(Peek::Ready(value)),
      Read::Pending(handle) => Ok(Peek::Pending(handle)),
      Read::Failed(error) => Err(error),
    }
  }

  /// The non-throwing suspense read: ready, pending (with the handle to wait
  /// on) or failed.
  pub fn suspend(&self) -> Read<T> {
    match &*self.state {
      State::Resolved(value) => Read::Ready(value.clone()),
      State::Rejected(error) => Read::Failed(error.clone()),
      State::Pending(handle) => match handle.peek() {
        None => Read::Pending(handle.clone()),
        Some(Ok(value)) => Read::Ready(value.clone()),
        Some(Err(error)) => Read::Failed(error.clone()),
      },
    }
  }

  /// Convert into a future. Settled values resolve immediately.
  pub fn promise(&self) -> LoadFuture<T> {
    match &*self.state {
      State::Resolved(value) => future::ready(Ok(value.clone())).boxed(),
      State::Rejected(error) => future::ready(Err(error.clone())).boxed(),
      State::Pending(handle) => handle.clone().boxed(),
    }
  }
}

/// What `AsyncValue::peek` found.
pub enum Peek<T> {
  Ready(T),
  Pending(LoadHandle<T>),
}

impl<T> Peek<T> {
  pub fn ready(self) -> Option<T> {
    match self {
      Peek::Ready(value) => Some(value),
      Peek::Pending(_) => None,
    }
  }
}

impl<T: fmt::Debug> fmt::Debug for Peek<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Peek::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
      Peek::Pending(_) => f.write_str("Pending"),
    }
  }
}

impl<T> fmt::Debug for AsyncValue<T>
where
  T: fmt::Debug + Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AsyncValue")
      .field("status", &self.status())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn test_resolved_value_is_ready() {
    let value = AsyncValue::resolved(42);
    assert_eq!(value.status(), AsyncStatus::Resolved);
    assert_eq!(value.suspend().ready(), Some(42));
    assert_eq!(value.peek().unwrap().ready(), Some(42));
  }

  #[test]
  fn test_rejected_value_fails() {
    let value: AsyncValue<i32> = AsyncValue::rejected(LoadError::NotFound("post p1".into()));
    assert_eq!(value.status(), AsyncStatus::Rejected);
    assert!(value.suspend().is_failed());
    assert!(value.peek().unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn test_pending_value_settles_without_awaiting() {
    let value = AsyncValue::pending(async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(vec![1, 2, 3])
    });

    assert!(value.is_pending());
    assert!(value.suspend().is_pending());

    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(value.status(), AsyncStatus::Resolved);
    assert_eq!(value.suspend().ready(), Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_pending_handle_can_be_awaited() {
    let value = AsyncValue::pending(async { Ok::<_, LoadError>("done".to_string()) });

    let result = match value.suspend() {
      Read::Pending(handle) => handle.await,
      Read::Ready(v) => Ok(v),
      Read::Failed(e) => Err(e),
    };
    assert_eq!(result.unwrap(), "done");
    assert_eq!(value.promise().await.unwrap(), "done");
  }

  #[tokio::test]
  async fn test_pending_value_rejects() {
    let value: AsyncValue<u8> = AsyncValue::pending(async { Err(LoadError::Abandoned) });
    assert!(value.promise().await.is_err());
    assert!(value.is_rejected());
    assert!(matches!(value.peek(), Err(LoadError::Abandoned)));
  }

  #[test]
  fn test_identity_equality() {
    let a = AsyncValue::resolved(1);
    let b = AsyncValue::resolved(1);
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
  }
}
