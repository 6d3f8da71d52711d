//! Out-of-band page faults.
//!
//! A page can fail on its own while a call is waiting on it: an uncaught
//! exception in the bundle, a renderer crash, the target going away. The
//! listener installed at acquisition turns those into a single
//! [`FaultSignal`] that every exchange on the page races against.

use std::sync::{Arc, OnceLock};

use marquee_browser::{Page, PageEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::errors::DiscoveryError;
use crate::resources::ReleaseAction;

/// An asynchronous failure of the page, unrelated to the call awaiting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageFault {
    /// Fault description.
    pub message: String,
    /// Remote stack trace, when the page reported one.
    pub stack: Option<String>,
}

impl PageFault {
    /// Fault without a stack.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }
}

impl From<PageFault> for DiscoveryError {
    fn from(fault: PageFault) -> Self {
        Self::RemotePage {
            message: fault.message,
            stack: fault.stack,
        }
    }
}

struct SignalInner {
    fault: OnceLock<PageFault>,
    token: CancellationToken,
}

/// Single-resolution fault slot shared by everything talking to one page.
///
/// The first [`FaultSignal::fire`] wins; later fires are ignored. Once fired,
/// [`FaultSignal::fired`] resolves immediately for every waiter.
#[derive(Clone)]
pub struct FaultSignal {
    inner: Arc<SignalInner>,
}

impl Default for FaultSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSignal {
    /// An unfired signal.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                fault: OnceLock::new(),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Record `fault`. Returns `false` if a fault was already recorded.
    pub fn fire(&self, fault: PageFault) -> bool {
        if self.inner.fault.set(fault).is_err() {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    /// The recorded fault, if any.
    pub fn get(&self) -> Option<&PageFault> {
        self.inner.fault.get()
    }

    /// Whether a fault was recorded.
    pub fn is_fired(&self) -> bool {
        self.inner.fault.get().is_some()
    }

    /// Wait until a fault is recorded and return it.
    pub async fn fired(&self) -> PageFault {
        self.inner.token.cancelled().await;
        // the slot is set before the token is cancelled
        self.get()
            .cloned()
            .unwrap_or_else(|| PageFault::new("page fault"))
    }
}

/// Watch `page` for uncaught exceptions, crashes and unexpected closes and
/// fire `signal` on the first one.
///
/// The returned action stops the listener.
pub fn spawn_fault_listener(page: &Arc<dyn Page>, signal: FaultSignal) -> ReleaseAction {
    let mut events = page.subscribe();
    let page_id = page.id().to_owned();
    let task = tokio::spawn(async move {
        loop {
            let fault = match events.recv().await {
                Ok(PageEvent::Exception { message, stack }) => PageFault { message, stack },
                Ok(PageEvent::Crashed) => PageFault::new("Page crashed!"),
                Ok(PageEvent::Closed) => PageFault::new("page closed unexpectedly"),
                Ok(PageEvent::Console(_)) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(page_id, skipped, "fault listener lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            tracing::debug!(page_id, message = %fault.message, "page fault");
            if !signal.fire(fault) {
                tracing::trace!(page_id, "page fault after the first, ignored");
            }
        }
    });
    ReleaseAction::new("fault listener", move || async move {
        task.abort();
        Ok(())
    })
}
