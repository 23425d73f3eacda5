//! Subscription handles returned by callback registrations.

use std::fmt;

/// Handle to an attached callback.
///
/// Call [`Subscription::cancel`] to detach it. Dropping the handle without
/// cancelling leaves the callback attached for the lifetime of whatever it
/// is attached to, the same way dropping a `JoinHandle` detaches a task.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detach the callback. It will not be invoked again.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.cancel.is_some())
            .finish()
    }
}
