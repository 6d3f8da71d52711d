//! Per-call cleanup coordination.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use super::handle::ReleaseAction;

/// Accumulates release actions for one top-level call.
///
/// Actions are registered right after each successful acquisition and run in
/// registration order when [`CleanupCoordinator::drain`] is awaited. A failing
/// or panicking action is logged and does not stop the rest. If the owning
/// future is dropped before draining, the remaining actions are spawned on the
/// current tokio runtime.
#[derive(Debug, Default)]
pub struct CleanupCoordinator {
    actions: Vec<ReleaseAction>,
}

impl CleanupCoordinator {
    /// Empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a release action.
    pub fn register(&mut self, action: ReleaseAction) {
        tracing::trace!(label = action.label(), "cleanup registered");
        self.actions.push(action);
    }

    /// Number of registered, not yet drained actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every registered action once, in registration order.
    pub async fn drain(&mut self) {
        run_all(std::mem::take(&mut self.actions)).await;
    }
}

impl Drop for CleanupCoordinator {
    fn drop(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        let actions = std::mem::take(&mut self.actions);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(count = actions.len(), "call dropped before cleanup, releasing in background");
                let _ = handle.spawn(run_all(actions));
            }
            Err(_) => {
                let labels: Vec<&str> = actions.iter().map(ReleaseAction::label).collect();
                tracing::warn!(?labels, "no runtime to release resources on, leaking them");
            }
        }
    }
}

async fn run_all(actions: Vec<ReleaseAction>) {
    for action in actions {
        match AssertUnwindSafe(action.run()).catch_unwind().await {
            Ok(Ok(())) => tracing::trace!(label = action.label(), "released"),
            Ok(Err(e)) => tracing::warn!(label = action.label(), error = %e, "release failed"),
            Err(_) => tracing::warn!(label = action.label(), "release panicked"),
        }
    }
}
