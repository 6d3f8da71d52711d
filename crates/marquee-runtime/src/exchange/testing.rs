//! Scripted page for in-crate tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marquee_browser::{BrowserError, Page, PageEvent, Viewport};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

/// Source map in which generated line 3, column 1 of `bundle.js` comes from
/// line 3, column 3 of `src/Root.tsx`, inside `calculateMetadata`.
pub(crate) const ROOT_MAP: &str = r#"{"version":3,"file":"bundle.js","sources":["src/Root.tsx"],"names":["calculateMetadata"],"mappings":";;AAEEA"}"#;

pub(crate) enum Reply {
    Value(Value),
    Error(BrowserError),
    /// Answer with the value after a delay.
    Delayed(Duration, Value),
    Hang,
}

type Responder = Box<dyn Fn(&str) -> Reply + Send + Sync>;

/// A page whose evaluations are answered by a closure and whose other calls
/// are written to a journal.
pub(crate) struct EventPage {
    events: broadcast::Sender<PageEvent>,
    responder: Responder,
    status: Mutex<Option<u16>>,
    calls: Mutex<Vec<String>>,
    journal: Mutex<Vec<String>>,
}

impl EventPage {
    pub(crate) fn new() -> Arc<Self> {
        Self::responding(|_| Reply::Value(Value::Null))
    }

    pub(crate) fn responding(f: impl Fn(&str) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            events: broadcast::channel(16).0,
            responder: Box::new(f),
            status: Mutex::new(Some(200)),
            calls: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn as_page(self: &Arc<Self>) -> Arc<dyn Page> {
        Arc::clone(self) as Arc<dyn Page>
    }

    pub(crate) fn emit(&self, event: PageEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn set_status(&self, status: Option<u16>) {
        *self.status.lock() = status;
    }

    /// Every evaluated expression, in order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Scripts registered and URLs navigated to, in order.
    pub(crate) fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }
}

#[async_trait]
impl Page for EventPage {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn evaluate(&self, expression: &str, _frame: Option<&str>) -> Result<Value, BrowserError> {
        self.calls.lock().push(expression.to_owned());
        match (self.responder)(expression) {
            Reply::Value(v) => Ok(v),
            Reply::Error(e) => Err(e),
            Reply::Delayed(delay, v) => {
                tokio::time::sleep(delay).await;
                Ok(v)
            }
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn add_script_on_new_document(&self, source: &str) -> Result<(), BrowserError> {
        self.journal.lock().push(format!("script {source}"));
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<Option<u16>, BrowserError> {
        self.journal.lock().push(format!("navigate {url}"));
        Ok(*self.status.lock())
    }

    async fn set_viewport(&self, _viewport: Viewport) -> Result<(), BrowserError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}
