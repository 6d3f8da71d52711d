//! Browser console forwarding.

use std::sync::Arc;

use marquee_browser::{BrowserLog, Page, PageEvent};
use marquee_core::LogLevel;
use tokio::sync::broadcast::error::RecvError;

use crate::resources::ReleaseAction;

/// Receives console messages from the page.
pub type BrowserLogCallback = Arc<dyn Fn(&BrowserLog) + Send + Sync>;

/// Forward console messages from `page` to `callback` and, at
/// [`LogLevel::Verbose`], to tracing.
///
/// Returns `None` when there is nobody to forward to.
pub fn spawn_console_forwarder(
    page: &Arc<dyn Page>,
    callback: Option<BrowserLogCallback>,
    level: LogLevel,
) -> Option<ReleaseAction> {
    let trace = level == LogLevel::Verbose;
    if callback.is_none() && !trace {
        return None;
    }

    let mut events = page.subscribe();
    let page_id = page.id().to_owned();
    let task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PageEvent::Console(log)) => {
                    if trace {
                        tracing::debug!(page_id, kind = %log.kind, "browser: {}", log.text);
                    }
                    if let Some(callback) = &callback {
                        callback(&log);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(page_id, skipped, "console forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    Some(ReleaseAction::new("console forwarder", move || async move {
        task.abort();
        Ok(())
    }))
}
