//! Acquired resources paired with their release actions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

/// Error produced by a release action.
pub type ReleaseError = Box<dyn std::error::Error + Send + Sync>;

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ReleaseError>> + Send>;

/// Who is responsible for tearing a resource down.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ownership<T> {
    /// Created for this call; released when the call settles.
    Owned(T),
    /// Supplied by the caller; never released by us.
    Borrowed(T),
}

impl<T> Ownership<T> {
    /// The wrapped resource.
    pub fn get(&self) -> &T {
        match self {
            Self::Owned(inner) | Self::Borrowed(inner) => inner,
        }
    }

    /// Whether we are responsible for releasing it.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

/// A labelled, run-at-most-once release action.
///
/// Clones share the same action: whichever clone runs first performs the
/// release and every later `run` is a no-op.
#[derive(Clone)]
pub struct ReleaseAction {
    label: Arc<str>,
    action: Arc<Mutex<Option<ReleaseFn>>>,
}

impl ReleaseAction {
    /// Wrap an async release closure.
    pub fn new<F, Fut>(label: impl Into<Arc<str>>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ReleaseError>> + Send + 'static,
    {
        let boxed: ReleaseFn = Box::new(move || Box::pin(f()));
        Self {
            label: label.into(),
            action: Arc::new(Mutex::new(Some(boxed))),
        }
    }

    /// An action that does nothing (borrowed resources).
    pub fn noop(label: impl Into<Arc<str>>) -> Self {
        Self {
            label: label.into(),
            action: Arc::new(Mutex::new(None)),
        }
    }

    /// What is being released, for logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the action has already run (or never had anything to do).
    pub fn is_spent(&self) -> bool {
        self.action.lock().is_none()
    }

    /// Run the action if it has not run yet.
    pub async fn run(&self) -> Result<(), ReleaseError> {
        let action = self.action.lock().take();
        match action {
            Some(f) => f().await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ReleaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseAction")
            .field("label", &self.label)
            .field("spent", &self.is_spent())
            .finish()
    }
}

/// A resource together with the action that releases it.
pub struct ResourceHandle<T> {
    resource: T,
    release: ReleaseAction,
}

impl<T> ResourceHandle<T> {
    /// Pair `resource` with `release`.
    pub fn new(resource: T, release: ReleaseAction) -> Self {
        Self { resource, release }
    }

    /// The acquired resource.
    pub fn resource(&self) -> &T {
        &self.resource
    }

    /// A clone of the release action, for registration with a coordinator.
    pub fn release_action(&self) -> ReleaseAction {
        self.release.clone()
    }

    /// Release now. Idempotent.
    pub async fn release(&self) -> Result<(), ReleaseError> {
        self.release.run().await
    }

    /// Split into parts.
    pub fn into_parts(self) -> (T, ReleaseAction) {
        (self.resource, self.release)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> ReleaseAction {
        let counter = Arc::clone(counter);
        ReleaseAction::new("counter", move || async move {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn runs_exactly_once_across_clones() {
        let counter = Arc::new(AtomicUsize::new(0));
        let action = counting(&counter);
        let clone = action.clone();

        action.run().await.unwrap();
        clone.run().await.unwrap();
        action.run().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(clone.is_spent());
    }

    #[tokio::test]
    async fn noop_is_spent_from_the_start() {
        let action = ReleaseAction::noop("borrowed server");
        assert!(action.is_spent());
        action.run().await.unwrap();
        assert_eq!(action.label(), "borrowed server");
    }

    #[tokio::test]
    async fn release_error_is_returned_once() {
        let action = ReleaseAction::new("failing", || async { Err("nope".into()) });
        assert!(action.run().await.is_err());
        assert!(action.run().await.is_ok());
    }

    #[tokio::test]
    async fn handle_release_is_idempotent() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = ResourceHandle::new("page", counting(&counter));
        assert_eq!(*handle.resource(), "page");
        handle.release().await.unwrap();
        handle.release_action().run().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ownership_accessors() {
        let owned = Ownership::Owned(1);
        let borrowed = Ownership::Borrowed(2);
        assert!(owned.is_owned());
        assert!(!borrowed.is_owned());
        assert_eq!(*borrowed.get(), 2);
    }
}
