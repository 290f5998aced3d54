//! Connection health tracking.
//!
//! While the session is live the connection sends a protocol ping
//! whenever the link has been quiet for the configured interval; a pong
//! must arrive within the timeout or the session is treated as a socket
//! failure.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct HeartbeatState {
    last_rx: Instant,
    ping_sent: Option<Instant>,
}

pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    state: Mutex<HeartbeatState>,
}

impl Heartbeat {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            state: Mutex::new(HeartbeatState {
                last_rx: Instant::now(),
                ping_sent: None,
            }),
        }
    }

    /// Reset on (re)connect.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_rx = Instant::now();
        state.ping_sent = None;
    }

    /// Record any inbound traffic.
    pub fn record_rx(&self) {
        self.state.lock().last_rx = Instant::now();
    }

    pub fn record_ping(&self) {
        self.state.lock().ping_sent = Some(Instant::now());
    }

    pub fn record_pong(&self) {
        let mut state = self.state.lock();
        if let Some(sent) = state.ping_sent.take() {
            debug!(rtt_ms = sent.elapsed().as_millis() as u64, "pong received");
        }
        state.last_rx = Instant::now();
    }

    /// A ping is due when none is outstanding and the link has been quiet
    /// for the full interval.
    pub fn should_ping(&self) -> bool {
        let state = self.state.lock();
        state.ping_sent.is_none() && state.last_rx.elapsed() >= self.interval
    }

    /// The outstanding ping has gone unanswered past the deadline.
    pub fn is_timed_out(&self) -> bool {
        self.state
            .lock()
            .ping_sent
            .is_some_and(|sent| sent.elapsed() > self.timeout)
    }

    /// Sleep until the next health check.
    pub async fn tick(&self) {
        tokio::time::sleep(self.interval / 2).await;
    }
}
