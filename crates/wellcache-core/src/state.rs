//! Shared reactive state that views subscribe to.

use std::sync::Arc;

use tokio::sync::watch;

/// A value plus change notifications, backed by a `watch` channel.
///
/// Every write notifies subscribers, except [`StateCell::set_if_changed`]
/// when the value is already equal. Clones share the same value.
#[derive(Debug)]
pub struct StateCell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// Compute the next value from the current one in a single step.
    /// Returns `(previous, next)`.
    pub fn apply<F>(&self, update: F) -> (T, T)
    where
        F: FnOnce(&T) -> T,
    {
        let mut result = None;
        self.tx.send_modify(|current| {
            let next = update(current);
            let previous = std::mem::replace(current, next.clone());
            result = Some((previous, next));
        });
        // send_modify always runs the closure.
        result.unwrap_or_else(|| unreachable!("send_modify skipped its closure"))
    }
}

impl<T: Clone + PartialEq> StateCell<T> {
    /// Replace the value only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}
