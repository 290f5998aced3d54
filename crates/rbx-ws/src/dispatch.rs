//! Frame dispatch.
//!
//! The connection's reader decodes frames and hands them to the
//! dispatcher, which routes each one to a per-topic worker task over a
//! bounded queue. Handler execution therefore never runs on the reader:
//! a slow user callback can only back up its own topic.
//!
//! Backpressure policy: bounded queue with blocking producer. When one
//! topic's queue is full the reader waits for that queue; it is never
//! blocked by a different topic's slow handler, and orderbook continuity
//! after any overload is restored by the sequence-gap resync path.

use crate::frame::ServerFrame;
use crate::handler::Handler;
use crate::reducer::ApplyOutcome;
use crate::registry::SubscriptionRegistry;
use parking_lot::Mutex;
use rbx_core::Topic;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Intent sent from the registry/dispatch side to the connection.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    Subscribe(Topic),
    Unsubscribe(Topic),
    /// A reducer detected a sequence gap; resubscribe to synthesize a
    /// fresh snapshot.
    Resync(Topic),
}

pub(crate) struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    command_tx: mpsc::UnboundedSender<Command>,
    queue_depth: usize,
    workers: Mutex<HashMap<Topic, mpsc::Sender<ServerFrame>>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<SubscriptionRegistry>,
        command_tx: mpsc::UnboundedSender<Command>,
        queue_depth: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            command_tx,
            queue_depth,
            workers: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Queue a frame for the topic's worker, spawning it on first use.
    ///
    /// Waits when the topic's queue is full (blocking producer).
    pub(crate) async fn dispatch(&self, topic: Topic, frame: ServerFrame) {
        if !self.registry.contains(&topic) {
            debug!(topic = %topic, "frame for undesired topic dropped");
            return;
        }

        let tx = {
            let mut workers = self.workers.lock();
            workers
                .entry(topic.clone())
                .or_insert_with(|| self.spawn_worker(topic.clone()))
                .clone()
        };

        if tx.send(frame).await.is_err() {
            // Worker ended (shutdown or topic dropped) between lookup and send.
            self.workers.lock().remove(&topic);
            trace!(topic = %topic, "worker gone, frame dropped");
        }
    }

    fn spawn_worker(&self, topic: Topic) -> mpsc::Sender<ServerFrame> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let registry = self.registry.clone();
        let command_tx = self.command_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(worker_loop(topic, rx, registry, command_tx, shutdown));
        tx
    }

    /// Stop the worker for a topic that is no longer desired.
    pub(crate) fn drop_topic(&self, topic: &Topic) {
        if self.workers.lock().remove(topic).is_some() {
            debug!(topic = %topic, "dispatch worker released");
        }
    }

    /// Release every worker. Further dispatch calls spawn fresh workers,
    /// so this is also safe between sessions.
    pub(crate) fn clear(&self) {
        self.workers.lock().clear();
    }
}

async fn worker_loop(
    topic: Topic,
    mut rx: mpsc::Receiver<ServerFrame>,
    registry: Arc<SubscriptionRegistry>,
    command_tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let handlers = registry.handlers(&topic);
        if handlers.is_empty() {
            // Unregister raced an in-flight frame.
            continue;
        }

        if deliver(&topic, &frame, &handlers) {
            if command_tx.send(Command::Resync(topic.clone())).is_err() {
                break;
            }
        }
    }
    trace!(topic = %topic, "dispatch worker exited");
}

/// Deliver one frame to the topic's handlers in registration order.
/// Returns whether any reducer asked for a resync.
fn deliver(topic: &Topic, frame: &ServerFrame, handlers: &[Handler]) -> bool {
    let mut needs_resync = false;
    for handler in handlers {
        match handler.apply_message(frame) {
            ApplyOutcome::Applied => {}
            ApplyOutcome::Stale => {
                trace!(topic = %topic, sequence = ?frame.sequence, "stale frame ignored");
            }
            ApplyOutcome::NeedsResync { expected, got } => {
                warn!(
                    topic = %topic,
                    expected,
                    got,
                    "sequence gap detected, scheduling resync"
                );
                needs_resync = true;
            }
        }
    }
    needs_resync
}
