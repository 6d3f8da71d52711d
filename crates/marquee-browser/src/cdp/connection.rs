//! WebSocket transport: command/response correlation and event routing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::BrowserError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type PendingTx = oneshot::Sender<Result<Value, String>>;

/// Capacity of each page's event channel.
const SESSION_EVENT_CAPACITY: usize = 256;

/// A protocol event addressed to one target session.
#[derive(Clone, Debug)]
pub(crate) struct CdpEvent {
    pub method: String,
    pub params: Value,
}

struct Command {
    method: String,
    params: Value,
    session_id: Option<String>,
    response_tx: PendingTx,
}

type Sessions = Arc<DashMap<String, broadcast::Sender<CdpEvent>>>;

/// A live DevTools connection shared by a browser and its pages.
pub(crate) struct Connection {
    cmd_tx: mpsc::Sender<Command>,
    sessions: Sessions,
    closed: Arc<AtomicBool>,
    command_timeout: Duration,
    handler: JoinHandle<()>,
}

impl Connection {
    /// Open the browser-level WebSocket at `ws_url`.
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> Result<Arc<Self>, BrowserError> {
        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectFailed {
                url: ws_url.into(),
                reason: e.to_string(),
            })?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(64);
        let sessions: Sessions = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));
        let handler = tokio::spawn(handler_loop(
            ws,
            cmd_rx,
            Arc::clone(&sessions),
            Arc::clone(&closed),
        ));

        Ok(Arc::new(Self {
            cmd_tx,
            sessions,
            closed,
            command_timeout,
            handler,
        }))
    }

    /// Whether the socket has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Per-command response timeout.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Send a command and wait up to the connection's command timeout for
    /// its response.
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, BrowserError> {
        self.send_with_timeout(method, params, session_id, self.command_timeout)
            .await
    }

    /// Send a command and wait up to `timeout` for its response.
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        if self.is_closed() {
            return Err(BrowserError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command {
                method: method.into(),
                params,
                session_id: session_id.map(str::to_owned),
                response_tx: tx,
            })
            .await
            .map_err(|_| BrowserError::Closed)?;

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let result = tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| BrowserError::Timeout {
                timeout_ms,
                context: format!("CDP {method}"),
            })?
            .map_err(|_| BrowserError::Closed)?;

        result.map_err(BrowserError::Cdp)
    }

    /// Start routing events for `session_id`.
    pub fn register_session(&self, session_id: &str) -> broadcast::Receiver<CdpEvent> {
        self.sessions
            .entry(session_id.to_owned())
            .or_insert_with(|| broadcast::channel(SESSION_EVENT_CAPACITY).0)
            .subscribe()
    }

    /// Stop routing events for `session_id`; its receivers observe `Closed`.
    pub fn unregister_session(&self, session_id: &str) {
        let _ = self.sessions.remove(session_id);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

async fn handler_loop(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<Command>,
    sessions: Sessions,
    closed: Arc<AtomicBool>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();
    let next_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let mut msg = json!({
                    "id": id,
                    "method": cmd.method,
                    "params": cmd.params,
                });
                if let Some(session_id) = cmd.session_id {
                    msg["sessionId"] = Value::String(session_id);
                }
                track_pending(&mut pending, id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(val) = serde_json::from_str::<Value>(&text) else {
                    tracing::debug!("ignoring non-JSON CDP frame");
                    continue;
                };
                if let Some(id) = val.get("id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.remove(&id) {
                        if let Some(err) = val.get("error") {
                            let msg = err["message"].as_str().unwrap_or("CDP error");
                            let _ = tx.send(Err(msg.into()));
                        } else {
                            let _ = tx.send(Ok(val["result"].clone()));
                        }
                    }
                } else {
                    route_event(&sessions, val);
                }
            }
        }
    }

    closed.store(true, Ordering::Release);
    // Dropping the senders wakes every pending command and page pump.
    pending.clear();
    sessions.clear();
    tracing::debug!("CDP connection closed");
}

/// Remember `tx` under `id`, forgetting commands whose caller stopped
/// waiting (timed out or dropped).
fn track_pending(pending: &mut HashMap<u64, PendingTx>, id: u64, tx: PendingTx) {
    pending.retain(|_, waiting| !waiting.is_closed());
    let _ = pending.insert(id, tx);
}

fn route_event(sessions: &Sessions, mut val: Value) {
    let Some(method) = val.get("method").and_then(Value::as_str).map(str::to_owned) else {
        return;
    };
    let params = val.get_mut("params").map(Value::take).unwrap_or(Value::Null);

    if method == "Target.detachedFromTarget" {
        if let Some(session_id) = params.get("sessionId").and_then(Value::as_str) {
            let _ = sessions.remove(session_id);
        }
        return;
    }

    let Some(session_id) = val.get("sessionId").and_then(Value::as_str) else {
        return;
    };
    if let Some(tx) = sessions.get(session_id) {
        // No receivers just means nobody is listening yet.
        let _ = tx.send(CdpEvent { method, params });
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::cdp::fake::FakeChrome;

    #[tokio::test]
    async fn send_correlates_responses() {
        let chrome = FakeChrome::start(|method, _params, _session| match method {
            "Browser.getVersion" => Ok(json!({ "product": "HeadlessChrome/130" })),
            _ => Ok(json!({})),
        })
        .await;
        let conn = Connection::connect(&chrome.ws_url(), Duration::from_secs(5))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            conn.send("Browser.getVersion", json!({}), None),
            conn.send("Target.setDiscoverTargets", json!({ "discover": true }), None),
        );
        assert_eq!(a.unwrap()["product"], "HeadlessChrome/130");
        assert_eq!(b.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn error_responses_become_cdp_errors() {
        let chrome = FakeChrome::start(|_, _, _| Err("No target with given id found".into())).await;
        let conn = Connection::connect(&chrome.ws_url(), Duration::from_secs(5))
            .await
            .unwrap();

        let err = conn
            .send("Target.closeTarget", json!({ "targetId": "nope" }), None)
            .await
            .unwrap_err();
        assert_matches!(err, BrowserError::Cdp(msg) if msg.contains("No target"));
    }

    #[tokio::test]
    async fn session_id_is_forwarded() {
        let chrome = FakeChrome::start(|_, _, session| Ok(json!({ "session": session }))).await;
        let conn = Connection::connect(&chrome.ws_url(), Duration::from_secs(5))
            .await
            .unwrap();

        let result = conn
            .send("Runtime.enable", json!({}), Some("S1"))
            .await
            .unwrap();
        assert_eq!(result["session"], "S1");
    }

    #[tokio::test]
    async fn events_are_routed_by_session() {
        let chrome = FakeChrome::start(|_, _, _| Ok(json!({}))).await;
        let conn = Connection::connect(&chrome.ws_url(), Duration::from_secs(5))
            .await
            .unwrap();

        let mut s1 = conn.register_session("S1");
        let mut s2 = conn.register_session("S2");
        chrome.emit(Some("S2"), "Page.loadEventFired", json!({ "timestamp": 1.0 }));

        let event = s2.recv().await.unwrap();
        assert_eq!(event.method, "Page.loadEventFired");
        assert_matches!(s1.try_recv(), Err(broadcast::error::TryRecvError::Empty));
    }

    #[tokio::test]
    async fn socket_close_fails_pending_and_future_commands() {
        let chrome = FakeChrome::start(|_, _, _| Ok(json!({}))).await;
        let conn = Connection::connect(&chrome.ws_url(), Duration::from_secs(5))
            .await
            .unwrap();
        let mut events = conn.register_session("S1");

        chrome.disconnect();

        assert_matches!(events.recv().await, Err(broadcast::error::RecvError::Closed));
        assert!(conn.is_closed());
        assert_matches!(
            conn.send("Runtime.enable", json!({}), None).await,
            Err(BrowserError::Closed)
        );
    }

    #[test]
    fn abandoned_commands_are_forgotten() {
        let mut pending = HashMap::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        track_pending(&mut pending, 1, tx1);
        track_pending(&mut pending, 2, tx2);
        drop(rx1);

        let (tx3, _rx3) = oneshot::channel();
        track_pending(&mut pending, 3, tx3);
        let mut ids: Vec<_> = pending.keys().copied().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn unanswered_command_times_out() {
        let chrome = FakeChrome::start_silent().await;
        let conn = Connection::connect(&chrome.ws_url(), Duration::from_millis(50))
            .await
            .unwrap();

        let err = conn.send("Page.navigate", json!({}), None).await.unwrap_err();
        assert_matches!(err, BrowserError::Timeout { timeout_ms: 50, .. });
    }
}
