//! Request/response exchange with the page.

use std::future::Future;
use std::sync::Arc;

use marquee_browser::{BrowserError, Page};
use serde_json::Value;
use tokio::sync::Mutex;

use super::fault::FaultSignal;
use super::symbolicate::SourceMapContext;
use crate::errors::DiscoveryError;
use crate::protocol::RemoteOperation;

/// Sends operations into one page and races every exchange against the
/// page's [`FaultSignal`].
///
/// Evaluations on the same channel are serialized. With a source map,
/// stacks of page-side errors are mapped back to the bundle's sources.
pub struct RemoteQueryChannel {
    page: Arc<dyn Page>,
    fault: FaultSignal,
    source_map: Option<SourceMapContext>,
    turn: Mutex<()>,
}

impl RemoteQueryChannel {
    /// Channel over `page`, failing fast once `fault` fires.
    pub fn new(page: Arc<dyn Page>, fault: FaultSignal) -> Self {
        Self {
            page,
            fault,
            source_map: None,
            turn: Mutex::new(()),
        }
    }

    /// Symbolicate remote stacks with `source_map`.
    #[must_use]
    pub fn with_source_map(mut self, source_map: Option<SourceMapContext>) -> Self {
        self.source_map = source_map;
        self
    }

    /// The page behind the channel.
    pub fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    /// The fault signal the channel races against.
    pub fn fault(&self) -> &FaultSignal {
        &self.fault
    }

    /// Run `fut` unless the page faults first.
    ///
    /// A fault that already fired rejects without polling `fut`.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, DiscoveryError>
    where
        F: Future<Output = Result<T, DiscoveryError>>,
    {
        let result = match self.fault.get() {
            Some(fault) => Err(fault.clone().into()),
            None => tokio::select! {
                biased;
                fault = self.fault.fired() => Err(fault.into()),
                result = fut => result,
            },
        };
        match &self.source_map {
            Some(map) => result.map_err(|e| map.apply(e)),
            None => result,
        }
    }

    /// Invoke `operation` with `args` in `frame` (main frame when `None`).
    #[tracing::instrument(skip(self, args), fields(operation = operation.name, page_id = self.page.id()))]
    pub async fn send(
        &self,
        operation: &RemoteOperation,
        args: &[Value],
        frame: Option<&str>,
    ) -> Result<Value, DiscoveryError> {
        let expression = operation.call_expression(args);
        self.guard(async {
            let _turn = self.turn.lock().await;
            self.page
                .evaluate(&expression, frame)
                .await
                .map_err(|e| call_error(operation, e))
        })
        .await
    }
}

fn call_error(operation: &RemoteOperation, error: BrowserError) -> DiscoveryError {
    match error {
        BrowserError::Evaluation { message, stack } => DiscoveryError::RemoteOperation {
            operation: operation.name.to_owned(),
            message,
            stack,
        },
        other => DiscoveryError::Transport(other),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use marquee_browser::PageEvent;
    use serde_json::json;

    use super::*;
    use crate::exchange::fault::{PageFault, spawn_fault_listener};
    use crate::exchange::testing::{EventPage, ROOT_MAP, Reply};
    use crate::protocol::{GET_STATIC_COMPOSITIONS, SET_BUNDLE_MODE, evaluation_mode};

    #[tokio::test]
    async fn returns_the_remote_value() {
        let page = EventPage::responding(|_| Reply::Value(json!([{"id": "main"}])));
        let channel = RemoteQueryChannel::new(page.as_page(), FaultSignal::new());

        let value = channel.send(&GET_STATIC_COMPOSITIONS, &[], None).await.unwrap();
        assert_eq!(value[0]["id"], "main");
        assert_eq!(page.calls(), vec!["(() => window.getStaticCompositions())(...[])"]);
    }

    #[tokio::test]
    async fn thrown_error_is_a_call_fault() {
        let page = EventPage::responding(|_| {
            Reply::Error(BrowserError::Evaluation {
                message: "TypeError: window.remotion_setBundleMode is not a function".into(),
                stack: Some("at <anonymous>:1:1".into()),
            })
        });
        let channel = RemoteQueryChannel::new(page.as_page(), FaultSignal::new());

        let err = channel
            .send(&SET_BUNDLE_MODE, &[evaluation_mode()], None)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            DiscoveryError::RemoteOperation { ref operation, stack: Some(_), .. } if operation == "setBundleMode"
        );
    }

    #[tokio::test]
    async fn transport_error_passes_through() {
        let page = EventPage::responding(|_| Reply::Error(BrowserError::Closed));
        let channel = RemoteQueryChannel::new(page.as_page(), FaultSignal::new());
        let err = channel.send(&GET_STATIC_COMPOSITIONS, &[], None).await.unwrap_err();
        assert_matches!(err, DiscoveryError::Transport(BrowserError::Closed));
    }

    #[tokio::test]
    async fn page_fault_rejects_pending_send() {
        let page = EventPage::responding(|_| Reply::Hang);
        let signal = FaultSignal::new();
        let listener = spawn_fault_listener(&page.as_page(), signal.clone());
        let channel = RemoteQueryChannel::new(page.as_page(), signal);

        let emitter = {
            let page = Arc::clone(&page);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                page.emit(PageEvent::Exception {
                    message: "Uncaught Error: bundle exploded".into(),
                    stack: None,
                });
            })
        };

        let err = tokio::time::timeout(
            Duration::from_secs(1),
            channel.send(&GET_STATIC_COMPOSITIONS, &[], None),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert_matches!(err, DiscoveryError::RemotePage { ref message, .. } if message == "Uncaught Error: bundle exploded");
        emitter.await.unwrap();
        listener.run().await.unwrap();
    }

    #[tokio::test]
    async fn stacks_are_mapped_to_bundle_sources() {
        let page = EventPage::responding(|_| {
            Reply::Error(BrowserError::Evaluation {
                message: "Error: calculateMetadata() threw".into(),
                stack: Some("    at f (http://127.0.0.1:3000/bundle.js:3:1)".into()),
            })
        });
        let source_map = SourceMapContext::from_slice(ROOT_MAP.as_bytes(), "bundle.js").unwrap();
        let channel =
            RemoteQueryChannel::new(page.as_page(), FaultSignal::new()).with_source_map(Some(source_map));

        let err = channel.send(&GET_STATIC_COMPOSITIONS, &[], None).await.unwrap_err();
        assert_matches!(
            err,
            DiscoveryError::RemoteOperation { stack: Some(ref s), .. } if s == "    at calculateMetadata (src/Root.tsx:3:3)"
        );

        let _ = channel.fault().fire(PageFault {
            message: "Uncaught Error".into(),
            stack: Some("at bundle.js:3:1".into()),
        });
        let err = channel.send(&GET_STATIC_COMPOSITIONS, &[], None).await.unwrap_err();
        assert_matches!(
            err,
            DiscoveryError::RemotePage { stack: Some(ref s), .. } if s == "at calculateMetadata (src/Root.tsx:3:3)"
        );
    }

    #[tokio::test]
    async fn fired_fault_rejects_later_sends_without_evaluating() {
        let page = EventPage::new();
        let signal = FaultSignal::new();
        let _ = signal.fire(PageFault::new("Page crashed!"));
        let channel = RemoteQueryChannel::new(page.as_page(), signal);

        for _ in 0..2 {
            let err = channel.send(&GET_STATIC_COMPOSITIONS, &[], None).await.unwrap_err();
            assert_matches!(err, DiscoveryError::RemotePage { .. });
        }
        assert!(page.calls().is_empty());
    }
}
