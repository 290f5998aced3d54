//! Connection state machine.
//!
//! Owns the single duplex socket and drives it through
//! `Disconnected → Connecting → Authenticating → Subscribing → Live →
//! Reconnecting`, re-issuing every desired subscription after a reconnect.
//! `Live` is the only state in which read models are guaranteed fresh; on
//! any socket failure every registered view is flagged stale and the loop
//! re-enters with exponential backoff.

use crate::dispatch::{Command, Dispatcher};
use crate::error::{WsError, WsResult};
use crate::frame::{ClientFrame, Event, ServerFrame};
use crate::handler::{Handler, HandlerId};
use crate::heartbeat::Heartbeat;
use crate::registry::SubscriptionRegistry;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rbx_core::{Network, Topic};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<Socket, Message>;
type WsStream = SplitStream<Socket>;

/// Source of session tokens; fetched fresh on every (re)connect.
///
/// Implemented by the REST transport. Failures here are retryable
/// through the reconnect loop; a *rejected* token surfaced by the venue
/// is fatal instead.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn session_token(&self) -> WsResult<String>;
}

/// Fixed token, for tests and short-lived tools.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn session_token(&self) -> WsResult<String> {
        Ok(self.token.clone())
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Realtime endpoint URL.
    pub url: String,
    /// Socket connect timeout.
    pub connect_timeout: Duration,
    /// Deadline for the auth ack after sending the auth frame.
    pub auth_timeout: Duration,
    /// Deadline for the subscribe phase; unacked topics do not block the
    /// session from going live.
    pub subscribe_timeout: Duration,
    /// Quiet period after which a ping is sent.
    pub heartbeat_interval: Duration,
    /// Deadline for the pong after a ping.
    pub heartbeat_timeout: Duration,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay: Duration,
    /// Cap for exponential backoff.
    pub reconnect_max_delay: Duration,
    /// Reconnect budget (0 = unbounded).
    pub max_reconnect_attempts: u32,
    /// Per-topic dispatch queue depth.
    pub dispatch_queue_depth: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(5),
            subscribe_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(5),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 0,
            dispatch_queue_depth: 256,
        }
    }
}

impl WsConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            url: network.ws_url().to_string(),
            ..Self::default()
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribing,
    Live,
    Reconnecting,
}

/// Realtime client: registry, dispatcher and the connection loop.
///
/// `run()` drives the session until `stop()` is called or a fatal error
/// occurs; it is the cooperative entry point and is also what the
/// blocking adapter spawns on its background runtime.
pub struct WsClient {
    config: WsConfig,
    tokens: Arc<dyn TokenProvider>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Dispatcher,
    heartbeat: Heartbeat,
    state: Arc<RwLock<SessionState>>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: TokioMutex<Option<mpsc::UnboundedReceiver<Command>>>,
    /// Topics the remote side has acked this session.
    confirmed: RwLock<HashSet<Topic>>,
    shutdown: CancellationToken,
}

impl WsClient {
    pub fn new(config: WsConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriptionRegistry::new());
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            registry.clone(),
            command_tx.clone(),
            config.dispatch_queue_depth,
            shutdown.child_token(),
        );
        let heartbeat = Heartbeat::new(config.heartbeat_interval, config.heartbeat_timeout);
        Self {
            config,
            tokens,
            registry,
            dispatcher,
            heartbeat,
            state: Arc::new(RwLock::new(SessionState::Disconnected)),
            command_tx,
            command_rx: TokioMutex::new(Some(command_rx)),
            confirmed: RwLock::new(HashSet::new()),
            shutdown,
        }
    }

    /// Bind a handler to a topic. If the topic is newly desired and a
    /// session is running, a subscribe frame is scheduled.
    pub fn register_handler(&self, topic: Topic, handler: impl Into<Handler>) -> HandlerId {
        let handler = handler.into();
        let id = handler.id();
        if self.registry.register(topic.clone(), handler) {
            let _ = self.command_tx.send(Command::Subscribe(topic));
        }
        id
    }

    /// Remove one handler. When the topic has no handlers left, an
    /// unsubscribe frame is scheduled and its local dispatch state dropped.
    pub fn unregister_handler(&self, topic: &Topic, id: HandlerId) {
        if self.registry.unregister(topic, id) {
            self.dispatcher.drop_topic(topic);
            let _ = self.command_tx.send(Command::Unsubscribe(topic.clone()));
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    pub fn desired_topics(&self) -> Vec<Topic> {
        self.registry.desired_topics()
    }

    /// Topics acked by the remote side in the current session. May lag
    /// `desired_topics()` during reconnects.
    pub fn confirmed_topics(&self) -> Vec<Topic> {
        self.confirmed.read().iter().cloned().collect()
    }

    /// Request shutdown: cancels any in-flight handshake, closes the
    /// socket and releases the dispatch workers. Terminal for this
    /// instance.
    pub fn stop(&self) {
        info!("stop requested");
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Drive the connection until `stop()` or a fatal error.
    pub async fn run(&self) -> WsResult<()> {
        let mut rx = self
            .command_rx
            .lock()
            .await
            .take()
            .ok_or(WsError::AlreadyStarted)?;
        let result = self.run_inner(&mut rx).await;
        *self.state.write() = SessionState::Disconnected;
        // Whatever ended the session, the views are no longer fresh.
        self.registry.mark_all_stale();
        self.dispatcher.clear();
        if let Err(error) = &result {
            error!(%error, "session terminated");
        }
        result
    }

    async fn run_inner(&self, rx: &mut mpsc::UnboundedReceiver<Command>) -> WsResult<()> {
        let mut attempt: u32 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            *self.state.write() = SessionState::Connecting;
            let mut went_live = false;
            match self.try_session(rx, &mut went_live).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(error = %e, "session ended"),
            }

            // Views keep serving last-known values, flagged stale.
            self.registry.mark_all_stale();
            self.confirmed.write().clear();

            if went_live {
                attempt = 0;
            }
            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                return Err(WsError::RetriesExhausted { attempts: attempt });
            }

            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            *self.state.write() = SessionState::Reconnecting;
            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.cancelled() => return Ok(()),
            }
        }
    }

    async fn try_session(
        &self,
        rx: &mut mpsc::UnboundedReceiver<Command>,
        went_live: &mut bool,
    ) -> WsResult<()> {
        info!(url = %self.config.url, "connecting");
        let (socket, _response) = tokio::select! {
            () = self.shutdown.cancelled() => return Ok(()),
            connected = timeout(self.config.connect_timeout, connect_async(&self.config.url)) => {
                match connected {
                    Ok(Ok(pair)) => pair,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => return Err(WsError::ConnectTimeout(self.config.connect_timeout)),
                }
            }
        };
        let (mut write, mut read) = socket.split();

        *self.state.write() = SessionState::Authenticating;
        let token = tokio::select! {
            () = self.shutdown.cancelled() => return Ok(()),
            token = self.tokens.session_token() => token?,
        };
        let auth = serde_json::to_string(&ClientFrame::auth(token))?;
        write.send(Message::Text(auth)).await?;
        self.await_auth_ack(&mut read, &mut write).await?;
        if self.shutdown.is_cancelled() {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }
        debug!("authenticated");

        *self.state.write() = SessionState::Subscribing;
        self.confirmed.write().clear();
        let mut requested: HashSet<Topic> = HashSet::new();
        let desired = self.registry.desired_topics();
        info!(count = desired.len(), "subscribing desired topics");
        for topic in &desired {
            let frame = serde_json::to_string(&ClientFrame::subscribe(topic))?;
            write.send(Message::Text(frame)).await?;
            requested.insert(topic.clone());
        }
        self.await_subscribe_acks(&mut read, &mut write, &desired)
            .await?;
        if self.shutdown.is_cancelled() {
            let _ = write.send(Message::Close(None)).await;
            return Ok(());
        }

        *self.state.write() = SessionState::Live;
        *went_live = true;
        self.heartbeat.reset();
        info!("session live");

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(&text, &mut write).await?,
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_rx();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => self.heartbeat.record_pong(),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (u16::from(f.code), f.reason.to_string()))
                                .unwrap_or((1000, "closed by server".to_string()));
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(WsError::ConnectionClosed {
                                code: 1006,
                                reason: "stream ended".to_string(),
                            })
                        }
                    }
                }

                cmd = rx.recv() => {
                    if let Some(cmd) = cmd {
                        self.handle_command(cmd, &mut requested, &mut write).await?;
                    }
                }

                () = self.heartbeat.tick() => {
                    if self.heartbeat.is_timed_out() {
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_ping() {
                        write.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                        debug!("ping sent");
                    }
                }
            }
        }
    }

    /// Wait for the auth ack. Returns `Ok` on a requested shutdown so the
    /// caller can close the socket and exit cleanly.
    async fn await_auth_ack(&self, read: &mut WsStream, write: &mut WsSink) -> WsResult<()> {
        let deadline = self.config.auth_timeout;
        let wait = async {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        for raw in text.split('\n').filter(|l| !l.trim().is_empty()) {
                            let frame: ServerFrame = match serde_json::from_str(raw) {
                                Ok(frame) => frame,
                                Err(error) => {
                                    warn!(%error, "undecodable frame during auth");
                                    continue;
                                }
                            };
                            if frame.is_auth() {
                                return match frame.event {
                                    Event::Subscribed => Ok(()),
                                    _ => Err(WsError::AuthRejected(
                                        frame.error_reason().to_string(),
                                    )),
                                };
                            }
                            debug!(channel = %frame.channel, "frame before auth ack ignored");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(WsError::ConnectionClosed {
                            code: 1006,
                            reason: "closed during auth".to_string(),
                        })
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(WsError::ConnectionClosed {
                            code: 1006,
                            reason: "stream ended during auth".to_string(),
                        })
                    }
                }
            }
        };
        tokio::select! {
            () = self.shutdown.cancelled() => Ok(()),
            result = timeout(deadline, wait) => match result {
                Ok(result) => result,
                Err(_) => Err(WsError::AuthTimeout(deadline)),
            }
        }
    }

    /// Wait for subscribe acks. Per-topic failures are isolated: an error
    /// ack is delivered to that topic's handlers and the rest proceed.
    /// The phase is bounded; unacked topics do not hold back `Live`.
    async fn await_subscribe_acks(
        &self,
        read: &mut WsStream,
        write: &mut WsSink,
        desired: &[Topic],
    ) -> WsResult<()> {
        if desired.is_empty() {
            return Ok(());
        }
        let mut pending: HashSet<Topic> = desired.iter().cloned().collect();
        let deadline = tokio::time::Instant::now() + self.config.subscribe_timeout;

        while !pending.is_empty() {
            let msg = tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    warn!(unacked = pending.len(), "subscribe phase timed out, going live anyway");
                    break;
                }
                () = self.shutdown.cancelled() => return Ok(()),
                msg = read.next() => msg,
            };
            match msg {
                Some(Ok(Message::Text(text))) => {
                    self.heartbeat.record_rx();
                    for raw in text.split('\n').filter(|l| !l.trim().is_empty()) {
                        let frame: ServerFrame = match serde_json::from_str(raw) {
                            Ok(frame) => frame,
                            Err(error) => {
                                warn!(%error, "undecodable frame dropped");
                                continue;
                            }
                        };
                        if matches!(frame.event, Event::Subscribed | Event::Error) {
                            if let Ok(topic) = frame.topic() {
                                pending.remove(&topic);
                            }
                        }
                        self.handle_frame(frame, write).await?;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1006, "closed during subscribe".to_string()));
                    return Err(WsError::ConnectionClosed { code, reason });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(WsError::ConnectionClosed {
                        code: 1006,
                        reason: "stream ended during subscribe".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    async fn handle_text(&self, text: &str, write: &mut WsSink) -> WsResult<()> {
        self.heartbeat.record_rx();
        for raw in text.split('\n') {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match serde_json::from_str::<ServerFrame>(raw) {
                Ok(frame) => self.handle_frame(frame, write).await?,
                Err(error) => warn!(%error, "undecodable frame dropped"),
            }
        }
        Ok(())
    }

    async fn handle_frame(&self, frame: ServerFrame, write: &mut WsSink) -> WsResult<()> {
        if frame.is_auth() {
            debug!("late auth frame ignored");
            return Ok(());
        }
        let topic = match frame.topic() {
            Ok(topic) => topic,
            Err(_) => {
                warn!(channel = %frame.channel, "frame with invalid channel dropped");
                return Ok(());
            }
        };

        match frame.event {
            Event::Subscribed => {
                if self.registry.contains(&topic) {
                    self.confirmed.write().insert(topic.clone());
                    self.dispatcher.dispatch(topic, frame).await;
                } else {
                    // Ack raced an unregister: treat as a no-op unsubscribe.
                    debug!(topic = %topic, "ack for undesired topic, unsubscribing");
                    let out = serde_json::to_string(&ClientFrame::unsubscribe(&topic))?;
                    write.send(Message::Text(out)).await?;
                }
            }
            Event::Unsubscribed => {
                self.confirmed.write().remove(&topic);
                debug!(topic = %topic, "unsubscribed");
            }
            Event::Update => self.dispatcher.dispatch(topic, frame).await,
            Event::Error => {
                warn!(topic = %topic, reason = frame.error_reason(), "channel error");
                self.dispatcher.dispatch(topic, frame).await;
            }
        }
        Ok(())
    }

    async fn handle_command(
        &self,
        command: Command,
        requested: &mut HashSet<Topic>,
        write: &mut WsSink,
    ) -> WsResult<()> {
        match command {
            Command::Subscribe(topic) => {
                if !self.registry.contains(&topic) || requested.contains(&topic) {
                    return Ok(());
                }
                let out = serde_json::to_string(&ClientFrame::subscribe(&topic))?;
                write.send(Message::Text(out)).await?;
                requested.insert(topic);
            }
            Command::Unsubscribe(topic) => {
                if self.registry.contains(&topic) {
                    // Re-registered in the meantime; keep the subscription.
                    return Ok(());
                }
                requested.remove(&topic);
                self.confirmed.write().remove(&topic);
                let out = serde_json::to_string(&ClientFrame::unsubscribe(&topic))?;
                write.send(Message::Text(out)).await?;
            }
            Command::Resync(topic) => {
                if !self.registry.contains(&topic) {
                    return Ok(());
                }
                info!(topic = %topic, "resynchronizing from fresh snapshot");
                self.confirmed.write().remove(&topic);
                let unsub = serde_json::to_string(&ClientFrame::unsubscribe(&topic))?;
                write.send(Message::Text(unsub)).await?;
                let sub = serde_json::to_string(&ClientFrame::subscribe(&topic))?;
                write.send(Message::Text(sub)).await?;
                requested.insert(topic);
            }
        }
        Ok(())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay.as_millis() as u64;
        let max = self.config.reconnect_max_delay.as_millis() as u64;

        // base * 2^(attempt-1), capped.
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        Duration::from_millis(delay + jitter_ms())
    }
}

/// Jitter (0-999ms) derived from the clock's sub-second noise.
fn jitter_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: WsConfig) -> WsClient {
        WsClient::new(config, Arc::new(StaticTokenProvider::new("token")))
    }

    #[test]
    fn test_default_config() {
        let config = WsConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Unbounded
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.dispatch_queue_depth, 256);
    }

    #[test]
    fn test_config_for_network() {
        let config = WsConfig::for_network(Network::Testnet);
        assert_eq!(config.url, Network::Testnet.ws_url());
    }

    #[test]
    fn test_initial_state_is_disconnected() {
        let client = client(WsConfig::default());
        assert_eq!(client.state(), SessionState::Disconnected);
        assert!(!client.is_live());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let client = client(WsConfig {
            reconnect_base_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_millis(1500),
            ..WsConfig::default()
        });

        // Jitter adds at most 999ms on top of the deterministic part.
        let d1 = client.backoff_delay(1);
        let d3 = client.backoff_delay(3);
        let d10 = client.backoff_delay(10);
        assert!(d1 >= Duration::from_millis(100) && d1 < Duration::from_millis(1100));
        assert!(d3 >= Duration::from_millis(400) && d3 < Duration::from_millis(1400));
        assert!(d10 >= Duration::from_millis(1500) && d10 < Duration::from_millis(2500));
    }

    #[test]
    fn test_register_unregister_roundtrip() {
        let client = client(WsConfig::default());
        let book = crate::handler::Orderbook::new("BTC-USD");
        let topic = book.topic();

        let id = client.register_handler(topic.clone(), book);
        assert_eq!(client.desired_topics(), vec![topic.clone()]);

        client.unregister_handler(&topic, id);
        assert!(client.desired_topics().is_empty());
    }

    #[tokio::test]
    async fn test_run_after_stop_returns_immediately() {
        let client = client(WsConfig::default());
        client.stop();
        assert!(client.run().await.is_ok());
        assert_eq!(client.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let client = client(WsConfig::default());
        client.stop();
        client.run().await.unwrap();
        assert!(matches!(client.run().await, Err(WsError::AlreadyStarted)));
    }
}
