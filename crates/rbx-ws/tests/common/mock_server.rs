//! Mock venue server for integration tests.
//!
//! Speaks the realtime envelope: acks auth frames, answers subscribes
//! with a configurable snapshot, and can push updates or drop all
//! connections to exercise the reconnect path.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

enum ConnCmd {
    Send(String),
    Close,
}

#[derive(Default)]
struct VenueInner {
    reject_auth: AtomicBool,
    snapshots: Mutex<HashMap<String, Value>>,
    error_channels: Mutex<HashSet<String>>,
    received: Mutex<Vec<Value>>,
    connections: AtomicU32,
    conns: Mutex<Vec<mpsc::UnboundedSender<ConnCmd>>>,
}

pub struct MockVenue {
    addr: SocketAddr,
    inner: Arc<VenueInner>,
    shutdown: CancellationToken,
}

impl MockVenue {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let inner: Arc<VenueInner> = Arc::new(VenueInner::default());
        let shutdown = CancellationToken::new();

        let accept_inner = inner.clone();
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = accept_shutdown.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        tokio::spawn(serve_conn(stream, accept_inner.clone()));
                    }
                }
            }
        });

        Self {
            addr,
            inner,
            shutdown,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Make auth frames fail with an error event.
    pub fn reject_auth(&self) {
        self.inner.reject_auth.store(true, Ordering::SeqCst);
    }

    /// Snapshot returned by subscribe acks for a channel.
    pub fn set_snapshot(&self, channel: &str, data: Value) {
        self.inner
            .snapshots
            .lock()
            .insert(channel.to_string(), data);
    }

    /// Make subscribes to a channel fail with an error event.
    pub fn fail_channel(&self, channel: &str) {
        self.inner
            .error_channels
            .lock()
            .insert(channel.to_string());
    }

    /// Push an update frame to every live connection.
    pub fn push(&self, channel: &str, event: &str, data: Value, sequence: Option<u64>) {
        let mut frame = json!({"channel": channel, "event": event, "data": data});
        if let Some(seq) = sequence {
            frame["sequence"] = json!(seq);
        }
        let text = frame.to_string();
        for conn in self.inner.conns.lock().iter() {
            let _ = conn.send(ConnCmd::Send(text.clone()));
        }
    }

    /// Close every live connection (server-side disconnect).
    pub fn drop_connections(&self) {
        let conns = std::mem::take(&mut *self.inner.conns.lock());
        for conn in conns {
            let _ = conn.send(ConnCmd::Close);
        }
    }

    pub fn connection_count(&self) -> u32 {
        self.inner.connections.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Value> {
        self.inner.received.lock().clone()
    }

    fn count_action(&self, action: &str, channel: Option<&str>) -> usize {
        self.received()
            .iter()
            .filter(|frame| {
                frame.get("action").and_then(Value::as_str) == Some(action)
                    && channel
                        .map(|ch| frame.get("channel").and_then(Value::as_str) == Some(ch))
                        .unwrap_or(true)
            })
            .count()
    }

    pub fn auth_count(&self) -> usize {
        self.count_action("auth", None)
    }

    pub fn subscribe_count(&self, channel: &str) -> usize {
        self.count_action("subscribe", Some(channel))
    }

    pub fn unsubscribe_count(&self, channel: &str) -> usize {
        self.count_action("unsubscribe", Some(channel))
    }

    pub fn shutdown(&self) {
        self.drop_connections();
        self.shutdown.cancel();
    }
}

impl Drop for MockVenue {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve_conn(stream: TcpStream, inner: Arc<VenueInner>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    inner.connections.fetch_add(1, Ordering::SeqCst);

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    inner.conns.lock().push(cmd_tx);

    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCmd::Send(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(ConnCmd::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<Value>(&text) else {
                        continue;
                    };
                    inner.received.lock().push(value.clone());
                    let reply = handle_frame(&inner, &value);
                    if let Some(reply) = reply {
                        if write.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if write.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
}

fn handle_frame(inner: &VenueInner, frame: &Value) -> Option<Value> {
    let action = frame.get("action").and_then(Value::as_str)?;
    match action {
        "auth" => {
            if inner.reject_auth.load(Ordering::SeqCst) {
                Some(json!({
                    "channel": "auth",
                    "event": "error",
                    "data": {"reason": "token rejected"}
                }))
            } else {
                Some(json!({"channel": "auth", "event": "subscribed"}))
            }
        }
        "subscribe" => {
            let channel = frame.get("channel").and_then(Value::as_str)?.to_string();
            if inner.error_channels.lock().contains(&channel) {
                Some(json!({
                    "channel": channel,
                    "event": "error",
                    "data": {"reason": "unknown channel"}
                }))
            } else {
                let data = inner
                    .snapshots
                    .lock()
                    .get(&channel)
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                Some(json!({
                    "channel": channel,
                    "event": "subscribed",
                    "data": data,
                    "sequence": 1
                }))
            }
        }
        "unsubscribe" => {
            let channel = frame.get("channel").and_then(Value::as_str)?;
            Some(json!({"channel": channel, "event": "unsubscribed"}))
        }
        _ => None,
    }
}
