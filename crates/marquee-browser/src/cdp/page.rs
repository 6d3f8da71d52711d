//! A page target attached in flat session mode.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::connection::{CdpEvent, Connection};
use crate::error::BrowserError;
use crate::traits::{BrowserLog, Page, PageEvent, StackFrame, Viewport};

const PAGE_EVENT_CAPACITY: usize = 128;

/// State fed by the event pump.
struct PageState {
    events: broadcast::Sender<PageEvent>,
    /// frame id → default execution context id
    contexts: DashMap<String, i64>,
    /// Bumped on every `Page.loadEventFired`.
    loads: watch::Sender<u64>,
    /// loader id → HTTP status of the document response
    documents: DashMap<String, u16>,
}

/// One page of a [`super::CdpBrowser`].
pub struct CdpPage {
    target_id: String,
    session_id: String,
    conn: Arc<Connection>,
    state: Arc<PageState>,
    closed: AtomicBool,
    /// Evaluate/navigate bound in ms; 0 means the connection's command timeout.
    default_timeout_ms: AtomicU64,
    pump: JoinHandle<()>,
}

impl CdpPage {
    pub(crate) async fn attach(conn: Arc<Connection>, target_id: String) -> Result<Self, BrowserError> {
        let attached = conn
            .send(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = attached["sessionId"]
            .as_str()
            .ok_or_else(|| BrowserError::Cdp("attachToTarget returned no sessionId".into()))?
            .to_owned();

        let (events, _) = broadcast::channel(PAGE_EVENT_CAPACITY);
        let state = Arc::new(PageState {
            events,
            contexts: DashMap::new(),
            loads: watch::Sender::new(0),
            documents: DashMap::new(),
        });
        let rx = conn.register_session(&session_id);
        let pump = tokio::spawn(event_pump(rx, Arc::clone(&state)));

        let page = Self {
            target_id,
            session_id,
            conn,
            state,
            closed: AtomicBool::new(false),
            default_timeout_ms: AtomicU64::new(0),
            pump,
        };
        for domain in ["Page.enable", "Runtime.enable", "Network.enable", "Inspector.enable"] {
            let _ = page.send(domain, json!({})).await?;
        }
        tracing::debug!(page_id = %page.target_id, "page attached");
        Ok(page)
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrowserError::Closed);
        }
        self.conn.send(method, params, Some(&self.session_id)).await
    }

    /// Like [`CdpPage::send`], bounded by the page's default timeout.
    async fn send_bounded(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrowserError::Closed);
        }
        self.conn
            .send_with_timeout(method, params, Some(&self.session_id), self.default_timeout())
            .await
    }

    fn default_timeout(&self) -> Duration {
        match self.default_timeout_ms.load(Ordering::Relaxed) {
            0 => self.conn.command_timeout(),
            ms => Duration::from_millis(ms),
        }
    }
}

#[async_trait]
impl Page for CdpPage {
    fn id(&self) -> &str {
        &self.target_id
    }

    async fn evaluate(&self, expression: &str, frame: Option<&str>) -> Result<Value, BrowserError> {
        let mut params = json!({
            "expression": expression,
            "returnByValue": true,
            "awaitPromise": true,
        });
        if let Some(frame_id) = frame {
            let context_id = self
                .state
                .contexts
                .get(frame_id)
                .map(|c| *c)
                .ok_or_else(|| {
                    BrowserError::Cdp(format!("Cannot find context with specified id (frame {frame_id})"))
                })?;
            params["contextId"] = json!(context_id);
        }

        let result = self.send_bounded("Runtime.evaluate", params).await?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(BrowserError::Evaluation {
                message: exception_message(details),
                stack: format_stack(&details["stackTrace"]),
            });
        }
        Ok(result["result"]
            .get("value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn add_script_on_new_document(&self, source: &str) -> Result<(), BrowserError> {
        let _ = self
            .send(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
            )
            .await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<Option<u16>, BrowserError> {
        let mut loads = self.state.loads.subscribe();
        let _ = loads.borrow_and_update();

        let response = self
            .send_bounded("Page.navigate", json!({ "url": url }))
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.into(),
                reason: e.to_string(),
            })?;
        if let Some(reason) = response["errorText"].as_str().filter(|s| !s.is_empty()) {
            return Err(BrowserError::NavigationFailed {
                url: url.into(),
                reason: reason.into(),
            });
        }

        // Same-document navigations have no loader and fire no load event.
        let Some(loader_id) = response["loaderId"].as_str() else {
            return Ok(None);
        };
        let timeout = self.default_timeout();
        tokio::time::timeout(timeout, loads.changed())
            .await
            .map_err(|_| BrowserError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                context: format!("load event for {url}"),
            })?
            .map_err(|_| BrowserError::Closed)?;
        Ok(self.state.documents.remove(loader_id).map(|(_, status)| status))
    }

    fn set_default_timeout(&self, timeout: Duration) {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1);
        self.default_timeout_ms.store(ms, Ordering::Relaxed);
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<(), BrowserError> {
        let _ = self
            .send(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": viewport.width,
                    "height": viewport.height,
                    "deviceScaleFactor": viewport.device_scale_factor,
                    "mobile": false,
                }),
            )
            .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.state.events.subscribe()
    }

    async fn close(&self) -> Result<(), BrowserError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self
            .conn
            .send(
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
                None,
            )
            .await;
        self.conn.unregister_session(&self.session_id);
        tracing::debug!(page_id = %self.target_id, "page closed");
        match result {
            Ok(_) | Err(BrowserError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn event_pump(mut rx: broadcast::Receiver<CdpEvent>, state: Arc<PageState>) {
    loop {
        match rx.recv().await {
            Ok(event) => handle_event(&state, event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "page event pump lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                let _ = state.events.send(PageEvent::Closed);
                break;
            }
        }
    }
}

fn handle_event(state: &PageState, CdpEvent { method, params }: CdpEvent) {
    match method.as_str() {
        "Runtime.exceptionThrown" => {
            let details = &params["exceptionDetails"];
            let _ = state.events.send(PageEvent::Exception {
                message: exception_message(details),
                stack: format_stack(&details["stackTrace"]),
            });
        }
        "Runtime.consoleAPICalled" => {
            let _ = state.events.send(PageEvent::Console(console_log(&params)));
        }
        "Inspector.targetCrashed" => {
            let _ = state.events.send(PageEvent::Crashed);
        }
        "Runtime.executionContextCreated" => {
            let context = &params["context"];
            let aux = &context["auxData"];
            if aux["isDefault"].as_bool() == Some(true) {
                if let (Some(frame_id), Some(id)) = (aux["frameId"].as_str(), context["id"].as_i64()) {
                    let _ = state.contexts.insert(frame_id.to_owned(), id);
                }
            }
        }
        "Runtime.executionContextDestroyed" => {
            if let Some(id) = params["executionContextId"].as_i64() {
                state.contexts.retain(|_, context| *context != id);
            }
        }
        "Runtime.executionContextsCleared" => state.contexts.clear(),
        "Network.responseReceived" if params["type"] == "Document" => {
            if let (Some(loader_id), Some(status)) = (
                params["loaderId"].as_str(),
                params["response"]["status"].as_u64(),
            ) {
                let status = u16::try_from(status).unwrap_or(u16::MAX);
                let _ = state.documents.insert(loader_id.to_owned(), status);
            }
        }
        "Page.loadEventFired" => state.loads.send_modify(|n| *n += 1),
        _ => {}
    }
}

fn exception_message(details: &Value) -> String {
    details["exception"]["description"]
        .as_str()
        .or_else(|| details["exception"]["value"].as_str())
        .or_else(|| details["text"].as_str())
        .unwrap_or("evaluation error")
        .to_owned()
}

fn stack_frames(trace: &Value) -> Vec<StackFrame> {
    trace["callFrames"]
        .as_array()
        .map(|frames| {
            frames
                .iter()
                .map(|f| StackFrame {
                    url: f["url"].as_str().unwrap_or_default().to_owned(),
                    function_name: f["functionName"].as_str().unwrap_or_default().to_owned(),
                    line_number: u32::try_from(f["lineNumber"].as_u64().unwrap_or(0)).unwrap_or(0),
                    column_number: u32::try_from(f["columnNumber"].as_u64().unwrap_or(0)).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn format_stack(trace: &Value) -> Option<String> {
    let frames = stack_frames(trace);
    if frames.is_empty() {
        return None;
    }
    let mut out = String::new();
    for frame in frames {
        let name = if frame.function_name.is_empty() {
            "<anonymous>"
        } else {
            &frame.function_name
        };
        let _ = writeln!(
            out,
            "    at {name} ({}:{}:{})",
            frame.url,
            frame.line_number + 1,
            frame.column_number + 1
        );
    }
    Some(out.trim_end().to_owned())
}

fn console_log(params: &Value) -> BrowserLog {
    let text = params["args"]
        .as_array()
        .map(|args| {
            args.iter()
                .map(|arg| match &arg["value"] {
                    Value::String(s) => s.clone(),
                    Value::Null => arg["description"]
                        .as_str()
                        .or_else(|| arg["type"].as_str())
                        .unwrap_or_default()
                        .to_owned(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    BrowserLog {
        kind: params["type"].as_str().unwrap_or("log").to_owned(),
        text,
        stack_trace: stack_frames(&params["stackTrace"]),
    }
}
