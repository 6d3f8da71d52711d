//! In-process stand-in for Chrome's DevTools WebSocket, for unit tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Events a handler wants sent right after its response.
#[derive(Default)]
pub(crate) struct Emit(Vec<Value>);

impl Emit {
    pub fn event(&mut self, session_id: Option<&str>, method: &str, params: Value) {
        self.0.push(event_frame(session_id, method, params));
    }
}

type Handler =
    Arc<dyn Fn(&str, &Value, Option<&str>, &mut Emit) -> Option<Result<Value, String>> + Send + Sync>;

enum Outbound {
    Frame(Value),
    Disconnect,
}

pub(crate) struct FakeChrome {
    addr: SocketAddr,
    out_tx: mpsc::UnboundedSender<Outbound>,
}

impl FakeChrome {
    /// Answer every command with `handler(method, params, session_id)`.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value, Option<&str>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self::spawn(Arc::new(move |m, p, s, _: &mut Emit| Some(handler(m, p, s))), None).await
    }

    /// Like [`FakeChrome::start`], but the handler may queue events.
    pub async fn start_with_events<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value, Option<&str>, &mut Emit) -> Result<Value, String>
            + Send
            + Sync
            + 'static,
    {
        Self::spawn(Arc::new(move |m, p, s, e: &mut Emit| Some(handler(m, p, s, e))), None).await
    }

    /// Like [`FakeChrome::start_with_events`], but replies to `method` only
    /// after `delay`.
    pub async fn start_slow<F>(handler: F, method: &'static str, delay: Duration) -> Self
    where
        F: Fn(&str, &Value, Option<&str>, &mut Emit) -> Result<Value, String>
            + Send
            + Sync
            + 'static,
    {
        Self::spawn(
            Arc::new(move |m, p, s, e: &mut Emit| Some(handler(m, p, s, e))),
            Some((method, delay)),
        )
        .await
    }

    /// Never answer anything.
    pub async fn start_silent() -> Self {
        Self::spawn(Arc::new(|_, _, _, _: &mut Emit| None), None).await
    }

    async fn spawn(handler: Handler, slow: Option<(&'static str, Duration)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        // Only slow mode holds a second sender, so dropping the fake still
        // closes the socket otherwise.
        let delayed_tx = slow.map(|_| out_tx.clone());

        let _ = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else { return };
            let Ok(ws) = accept_async(stream).await else { return };
            let (mut tx, mut rx) = ws.split();
            loop {
                tokio::select! {
                    msg = rx.next() => {
                        let Some(Ok(Message::Text(text))) = msg else { break };
                        let req: Value = serde_json::from_str(&text).unwrap();
                        let method = req["method"].as_str().unwrap_or_default();
                        let session = req.get("sessionId").and_then(Value::as_str);
                        let mut emit = Emit::default();
                        let Some(reply) = handler(method, &req["params"], session, &mut emit) else {
                            continue;
                        };
                        let frame = match reply {
                            Ok(result) => json!({ "id": req["id"], "result": result }),
                            Err(message) => json!({ "id": req["id"], "error": { "code": -32000, "message": message } }),
                        };
                        if let (Some((_, delay)), Some(delayed_tx)) =
                            (slow.filter(|(m, _)| *m == method), delayed_tx.as_ref())
                        {
                            let delayed_tx = delayed_tx.clone();
                            let _ = tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                for frame in std::iter::once(frame).chain(emit.0) {
                                    let _ = delayed_tx.send(Outbound::Frame(frame));
                                }
                            });
                            continue;
                        }
                        let _ = tx.send(Message::Text(frame.to_string().into())).await;
                        for event in emit.0 {
                            let _ = tx.send(Message::Text(event.to_string().into())).await;
                        }
                    }
                    out = out_rx.recv() => match out {
                        Some(Outbound::Frame(frame)) => {
                            let _ = tx.send(Message::Text(frame.to_string().into())).await;
                        }
                        Some(Outbound::Disconnect) | None => {
                            let _ = tx.close().await;
                            break;
                        }
                    },
                }
            }
        });

        Self { addr, out_tx }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/devtools/browser/fake", self.addr)
    }

    /// Push an unsolicited event.
    pub fn emit(&self, session_id: Option<&str>, method: &str, params: Value) {
        let _ = self
            .out_tx
            .send(Outbound::Frame(event_frame(session_id, method, params)));
    }

    /// Drop the socket.
    pub fn disconnect(&self) {
        let _ = self.out_tx.send(Outbound::Disconnect);
    }
}

fn event_frame(session_id: Option<&str>, method: &str, params: Value) -> Value {
    let mut frame = json!({ "method": method, "params": params });
    if let Some(session_id) = session_id {
        frame["sessionId"] = Value::String(session_id.to_owned());
    }
    frame
}
