//! One-shot completion signal.
//!
//! A single-assignment cell that any number of tasks can wait on with a
//! bound. The first `complete` wins; later calls are ignored and report
//! `false`. Built on `tokio::sync::watch`, so late waiters still observe a
//! value that was set before they started waiting.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Shared single-assignment signal. Clones observe the same cell.
#[derive(Debug)]
pub struct Completion<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Completion<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Set the value. Returns `false` if a value was already set.
    pub fn complete(&self, value: T) -> bool {
        let mut value = Some(value);
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        })
    }

    pub fn is_done(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl<T: Clone> Completion<T> {
    /// Current value, if any, without waiting.
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    /// Wait until a value is set.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(v) = rx.borrow_and_update().as_ref() {
                return v.clone();
            }
            // The sender lives in `self`, so `changed` cannot observe a
            // closed channel while we are borrowed.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Wait up to `timeout`. `None` means the bound elapsed first.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    /// "Done within `timeout`?"
    pub async fn wait_done(&self, timeout: Duration) -> bool {
        self.wait_timeout(timeout).await.is_some()
    }
}
