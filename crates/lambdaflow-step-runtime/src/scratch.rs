//! State shared by the steps of one run.
//!
//! A [`RunScratch`] is created with the run and handed to every step in its
//! [`StepRequest`](crate::StepRequest). Nothing outlives the run: once the
//! engine and the last request drop their handles the slots are gone. Steps
//! that gather contributions from several executions (e.g. branches of a
//! fan-out) keep their collection here instead of in process-wide state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

type Slots = HashMap<String, Box<dyn Any + Send>>;

#[derive(Default)]
struct Inner {
  slots: Mutex<Slots>,
  changed: Notify,
}

/// Typed key/value slots scoped to one run. Cloning shares the slots.
#[derive(Clone, Default)]
pub struct RunScratch {
  inner: Arc<Inner>,
}

impl RunScratch {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Slots> {
    self.inner.slots.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Mutate the slot under `key`, creating it with `T::default()` when it is
  /// missing or holds another type. Wakes every [`wait_for`](Self::wait_for).
  pub fn update<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> R
  where
    T: Default + Send + 'static,
  {
    let result = {
      let mut slots = self.lock();
      let slot = slots
        .entry(key.to_string())
        .or_insert_with(|| Box::new(T::default()));
      if !(**slot).is::<T>() {
        *slot = Box::new(T::default());
      }
      match (**slot).downcast_mut::<T>() {
        Some(value) => f(value),
        None => f(&mut T::default()),
      }
    };
    self.inner.changed.notify_waiters();
    result
  }

  /// Read the slot under `key` without creating it.
  pub fn read<T, R>(&self, key: &str, f: impl FnOnce(Option<&T>) -> R) -> R
  where
    T: Send + 'static,
  {
    let slots = self.lock();
    f(slots.get(key).and_then(|slot| (**slot).downcast_ref::<T>()))
  }

  pub fn remove(&self, key: &str) -> bool {
    let removed = self.lock().remove(key).is_some();
    if removed {
      self.inner.changed.notify_waiters();
    }
    removed
  }

  pub fn contains(&self, key: &str) -> bool {
    self.lock().contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Wait until `ready` yields a value for the slot under `key`, re-checking
  /// after every update. `None` once `limit` has passed.
  pub async fn wait_for<T, R>(
    &self,
    key: &str,
    limit: Duration,
    mut ready: impl FnMut(Option<&T>) -> Option<R>,
  ) -> Option<R>
  where
    T: Send + 'static,
  {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
      let mut changed = std::pin::pin!(self.inner.changed.notified());
      changed.as_mut().enable();

      if let Some(value) = self.read(key, &mut ready) {
        return Some(value);
      }
      if tokio::time::timeout_at(deadline, changed).await.is_err() {
        return None;
      }
    }
  }
}

impl fmt::Debug for RunScratch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let slots = self.lock();
    f.debug_struct("RunScratch")
      .field("slots", &slots.keys().collect::<Vec<_>>())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_update_creates_and_shares_slot() {
    let scratch = RunScratch::new();
    let other = scratch.clone();

    scratch.update("seen", |count: &mut u32| *count += 1);
    other.update("seen", |count: &mut u32| *count += 1);

    assert_eq!(scratch.read("seen", |count: Option<&u32>| count.copied()), Some(2));
    assert_eq!(scratch.len(), 1);
  }

  #[test]
  fn test_slot_of_another_type_is_reset() {
    let scratch = RunScratch::new();
    scratch.update("slot", |value: &mut u32| *value = 7);

    let fresh = scratch.update("slot", |items: &mut Vec<String>| items.len());

    assert_eq!(fresh, 0);
    assert_eq!(scratch.read("slot", |value: Option<&u32>| value.copied()), None);
  }

  #[test]
  fn test_separate_scratches_do_not_share() {
    let first = RunScratch::new();
    let second = RunScratch::new();
    first.update("seen", |count: &mut u32| *count += 1);

    assert!(!second.contains("seen"));
    assert!(first.remove("seen"));
    assert!(first.is_empty());
  }

  #[tokio::test]
  async fn test_wait_for_wakes_on_update() {
    let scratch = RunScratch::new();
    let writer = scratch.clone();

    let waiter = tokio::spawn(async move {
      scratch
        .wait_for("done", Duration::from_secs(5), |flag: Option<&bool>| {
          flag.copied().filter(|done| *done)
        })
        .await
    });
    tokio::task::yield_now().await;
    writer.update("done", |flag: &mut bool| *flag = true);

    assert_eq!(waiter.await.unwrap(), Some(true));
  }

  #[tokio::test(start_paused = true)]
  async fn test_wait_for_times_out() {
    let scratch = RunScratch::new();
    let waited = scratch
      .wait_for("never", Duration::from_millis(200), |flag: Option<&bool>| {
        flag.copied()
      })
      .await;
    assert_eq!(waited, None);
  }
}
