//! Consumer-facing read models and the channel handler set.
//!
//! A view (`Orderbook`, `OpenedOrders`, `Positions`) is a cheaply cloneable
//! handle over shared state: register one clone with the client, keep
//! another for queries. State mutates under a per-view lock, so queries
//! never observe a half-applied update. Getters return point-in-time
//! copies.
//!
//! The handler set is closed: [`Handler`] enumerates the four variants
//! behind a single `apply_message` capability, selected at registration
//! time.

use crate::frame::{Event, ServerFrame};
use crate::reducer::{
    AccountPayload, ApplyOutcome, BookPayload, OrderbookState, OrdersState, PositionsState,
};
use parking_lot::RwLock;
use rbx_core::{OrderRecord, PositionRecord, Price, Size, Topic};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Opaque handler identity, used to unregister a specific handler.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

fn next_handler_id() -> HandlerId {
    NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Called with the view after each applied orderbook message.
pub type BookCallback = Arc<dyn Fn(&Orderbook) + Send + Sync>;
/// Called once per order record carried by an applied account message.
pub type OrderCallback = Arc<dyn Fn(&OrderRecord) + Send + Sync>;
/// Called once per position record carried by an applied account message.
pub type PositionCallback = Arc<dyn Fn(&PositionRecord) + Send + Sync>;
/// Called with every frame on the topic, unreduced.
pub type RawCallback = Arc<dyn Fn(&Topic, Event, &serde_json::Value) + Send + Sync>;

// ============================================================================
// Orderbook view
// ============================================================================

struct OrderbookInner {
    id: HandlerId,
    market_id: String,
    state: RwLock<OrderbookState>,
    stale: AtomicBool,
    on_update: Option<BookCallback>,
}

/// Live order book for one market.
#[derive(Clone)]
pub struct Orderbook {
    inner: Arc<OrderbookInner>,
}

impl Orderbook {
    pub fn new(market_id: impl Into<String>) -> Self {
        Self::build(market_id, None)
    }

    pub fn with_callback(
        market_id: impl Into<String>,
        on_update: impl Fn(&Orderbook) + Send + Sync + 'static,
    ) -> Self {
        Self::build(market_id, Some(Arc::new(on_update) as BookCallback))
    }

    fn build(market_id: impl Into<String>, on_update: Option<BookCallback>) -> Self {
        Self {
            inner: Arc::new(OrderbookInner {
                id: next_handler_id(),
                market_id: market_id.into(),
                state: RwLock::new(OrderbookState::default()),
                // Stale until the first snapshot lands.
                stale: AtomicBool::new(true),
                on_update,
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn market_id(&self) -> &str {
        &self.inner.market_id
    }

    pub fn topic(&self) -> Topic {
        Topic::orderbook(&self.inner.market_id)
    }

    /// Top of book, bid side. `None` when no levels exist.
    pub fn best_bid(&self) -> Option<Price> {
        self.inner.state.read().best_bid()
    }

    /// Top of book, ask side. `None` when no levels exist.
    pub fn best_ask(&self) -> Option<Price> {
        self.inner.state.read().best_ask()
    }

    /// Point-in-time copy of the bid side, best first.
    pub fn bids(&self) -> Vec<(Price, Size)> {
        self.inner
            .state
            .read()
            .bids
            .iter()
            .rev()
            .map(|(p, s)| (*p, *s))
            .collect()
    }

    /// Point-in-time copy of the ask side, best first.
    pub fn asks(&self) -> Vec<(Price, Size)> {
        self.inner
            .state
            .read()
            .asks
            .iter()
            .map(|(p, s)| (*p, *s))
            .collect()
    }

    pub fn sequence(&self) -> u64 {
        self.inner.state.read().sequence
    }

    /// Whether the backing connection has lost freshness for this topic.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.inner.stale.store(true, Ordering::Release);
    }

    fn apply_message(&self, frame: &ServerFrame) -> ApplyOutcome {
        let mut payload: BookPayload = match serde_json::from_value(frame.data.clone()) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(channel = %frame.channel, %error, "undecodable orderbook payload");
                return ApplyOutcome::Stale;
            }
        };
        // The envelope sequence wins when the payload carries none.
        payload.sequence = payload.sequence.or(frame.sequence);

        let outcome = match frame.event {
            Event::Subscribed => self.inner.state.write().apply_snapshot(&payload),
            Event::Update => self.inner.state.write().apply_delta(&payload),
            Event::Unsubscribed => return ApplyOutcome::Stale,
            Event::Error => {
                warn!(channel = %frame.channel, reason = frame.error_reason(), "orderbook channel error");
                self.mark_stale();
                return ApplyOutcome::Stale;
            }
        };

        if outcome.is_applied() {
            self.inner.stale.store(false, Ordering::Release);
            if let Some(callback) = &self.inner.on_update {
                callback(self);
            }
        }
        outcome
    }
}

// ============================================================================
// Opened orders view
// ============================================================================

struct OpenedOrdersInner {
    id: HandlerId,
    state: RwLock<OrdersState>,
    stale: AtomicBool,
    on_update: Option<OrderCallback>,
}

/// Open orders across all markets, fed by the account stream.
#[derive(Clone)]
pub struct OpenedOrders {
    inner: Arc<OpenedOrdersInner>,
}

impl OpenedOrders {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_callback(on_update: impl Fn(&OrderRecord) + Send + Sync + 'static) -> Self {
        Self::build(Some(Arc::new(on_update) as OrderCallback))
    }

    fn build(on_update: Option<OrderCallback>) -> Self {
        Self {
            inner: Arc::new(OpenedOrdersInner {
                id: next_handler_id(),
                state: RwLock::new(OrdersState::default()),
                stale: AtomicBool::new(true),
                on_update,
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn topic(&self) -> Topic {
        Topic::account()
    }

    /// Point-in-time copy of every open order.
    pub fn get_orders(&self) -> Vec<OrderRecord> {
        self.inner.state.read().all()
    }

    pub fn get_order(&self, market_id: &str, order_id: &str) -> Option<OrderRecord> {
        self.inner.state.read().get(market_id, order_id).cloned()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.inner.stale.store(true, Ordering::Release);
    }

    fn apply_message(&self, frame: &ServerFrame) -> ApplyOutcome {
        let payload: AccountPayload = match serde_json::from_value(frame.data.clone()) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(channel = %frame.channel, %error, "undecodable account payload");
                return ApplyOutcome::Stale;
            }
        };

        let outcome = match frame.event {
            Event::Subscribed => self
                .inner
                .state
                .write()
                .apply_snapshot(frame.sequence, &payload),
            Event::Update => self
                .inner
                .state
                .write()
                .apply_delta(frame.sequence, &payload),
            Event::Unsubscribed => return ApplyOutcome::Stale,
            Event::Error => {
                warn!(channel = %frame.channel, reason = frame.error_reason(), "account channel error");
                self.mark_stale();
                return ApplyOutcome::Stale;
            }
        };

        if outcome.is_applied() {
            self.inner.stale.store(false, Ordering::Release);
            if let Some(callback) = &self.inner.on_update {
                for order in &payload.orders {
                    callback(order);
                }
            }
        }
        outcome
    }
}

impl Default for OpenedOrders {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Positions view
// ============================================================================

struct PositionsInner {
    id: HandlerId,
    state: RwLock<PositionsState>,
    stale: AtomicBool,
    on_update: Option<PositionCallback>,
}

/// Open positions across all markets, fed by the account stream.
#[derive(Clone)]
pub struct Positions {
    inner: Arc<PositionsInner>,
}

impl Positions {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_callback(on_update: impl Fn(&PositionRecord) + Send + Sync + 'static) -> Self {
        Self::build(Some(Arc::new(on_update) as PositionCallback))
    }

    fn build(on_update: Option<PositionCallback>) -> Self {
        Self {
            inner: Arc::new(PositionsInner {
                id: next_handler_id(),
                state: RwLock::new(PositionsState::default()),
                stale: AtomicBool::new(true),
                on_update,
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn topic(&self) -> Topic {
        Topic::account()
    }

    /// Point-in-time copy of every open position.
    pub fn get_positions(&self) -> Vec<PositionRecord> {
        self.inner.state.read().all()
    }

    pub fn get_position(&self, market_id: &str) -> Option<PositionRecord> {
        self.inner.state.read().get(market_id).cloned()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.inner.stale.store(true, Ordering::Release);
    }

    fn apply_message(&self, frame: &ServerFrame) -> ApplyOutcome {
        let payload: AccountPayload = match serde_json::from_value(frame.data.clone()) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(channel = %frame.channel, %error, "undecodable account payload");
                return ApplyOutcome::Stale;
            }
        };

        let outcome = match frame.event {
            Event::Subscribed => self
                .inner
                .state
                .write()
                .apply_snapshot(frame.sequence, &payload),
            Event::Update => self
                .inner
                .state
                .write()
                .apply_delta(frame.sequence, &payload),
            Event::Unsubscribed => return ApplyOutcome::Stale,
            Event::Error => {
                warn!(channel = %frame.channel, reason = frame.error_reason(), "account channel error");
                self.mark_stale();
                return ApplyOutcome::Stale;
            }
        };

        if outcome.is_applied() {
            self.inner.stale.store(false, Ordering::Release);
            if let Some(callback) = &self.inner.on_update {
                for position in &payload.positions {
                    callback(position);
                }
            }
        }
        outcome
    }
}

impl Default for Positions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Raw handler
// ============================================================================

struct RawInner {
    id: HandlerId,
    topic: Topic,
    callback: RawCallback,
}

/// Pass-through handler: the callback sees every frame on the topic.
#[derive(Clone)]
pub struct RawHandler {
    inner: Arc<RawInner>,
}

impl RawHandler {
    pub fn new(
        topic: Topic,
        callback: impl Fn(&Topic, Event, &serde_json::Value) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(RawInner {
                id: next_handler_id(),
                topic,
                callback: Arc::new(callback),
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn topic(&self) -> &Topic {
        &self.inner.topic
    }

    fn apply_message(&self, frame: &ServerFrame) -> ApplyOutcome {
        (self.inner.callback)(&self.inner.topic, frame.event, &frame.data);
        ApplyOutcome::Applied
    }
}

// ============================================================================
// Closed handler set
// ============================================================================

/// One registered consumer of a topic's messages.
#[derive(Clone)]
pub enum Handler {
    Orderbook(Orderbook),
    OpenedOrders(OpenedOrders),
    Positions(Positions),
    Raw(RawHandler),
}

impl Handler {
    pub fn id(&self) -> HandlerId {
        match self {
            Self::Orderbook(h) => h.id(),
            Self::OpenedOrders(h) => h.id(),
            Self::Positions(h) => h.id(),
            Self::Raw(h) => h.id(),
        }
    }

    /// Consume one decoded frame for this handler's topic.
    pub fn apply_message(&self, frame: &ServerFrame) -> ApplyOutcome {
        match self {
            Self::Orderbook(h) => h.apply_message(frame),
            Self::OpenedOrders(h) => h.apply_message(frame),
            Self::Positions(h) => h.apply_message(frame),
            Self::Raw(h) => h.apply_message(frame),
        }
    }

    /// Flag the backing view as no longer fresh (connection lost).
    pub fn mark_stale(&self) {
        match self {
            Self::Orderbook(h) => h.mark_stale(),
            Self::OpenedOrders(h) => h.mark_stale(),
            Self::Positions(h) => h.mark_stale(),
            Self::Raw(_) => {}
        }
    }
}

impl From<Orderbook> for Handler {
    fn from(view: Orderbook) -> Self {
        Self::Orderbook(view)
    }
}

impl From<OpenedOrders> for Handler {
    fn from(view: OpenedOrders) -> Self {
        Self::OpenedOrders(view)
    }
}

impl From<Positions> for Handler {
    fn from(view: Positions) -> Self {
        Self::Positions(view)
    }
}

impl From<RawHandler> for Handler {
    fn from(handler: RawHandler) -> Self {
        Self::Raw(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn frame(channel: &str, event: Event, data: serde_json::Value, seq: Option<u64>) -> ServerFrame {
        ServerFrame {
            channel: channel.to_string(),
            event,
            data,
            sequence: seq,
        }
    }

    #[test]
    fn test_orderbook_snapshot_then_delta() {
        let book = Orderbook::new("BTC-USD");
        assert!(book.is_stale());
        assert_eq!(book.best_bid(), None);

        let outcome = book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Subscribed,
            json!({"bids": [["100", "5"]], "asks": [["101", "3"]], "sequence": 1}),
            None,
        ));
        assert!(outcome.is_applied());
        assert!(!book.is_stale());
        assert_eq!(book.best_bid(), Some(Price::new(dec!(100))));
        assert_eq!(book.best_ask(), Some(Price::new(dec!(101))));

        let outcome = book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Update,
            json!({"bids": [["100", "0"]], "sequence": 2}),
            None,
        ));
        assert!(outcome.is_applied());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), Some(Price::new(dec!(101))));
    }

    #[test]
    fn test_orderbook_envelope_sequence_used() {
        let book = Orderbook::new("BTC-USD");
        book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Subscribed,
            json!({"bids": [["100", "5"]]}),
            Some(7),
        ));
        assert_eq!(book.sequence(), 7);

        let outcome = book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Update,
            json!({"bids": [["100", "6"]]}),
            Some(7),
        ));
        assert_eq!(outcome, ApplyOutcome::Stale);
    }

    #[test]
    fn test_orderbook_callback_fires_only_on_applied() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        let book = Orderbook::with_callback("BTC-USD", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Subscribed,
            json!({"bids": [["100", "5"]], "sequence": 3}),
            None,
        ));
        // Duplicate delta: no callback.
        book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Update,
            json!({"bids": [["100", "9"]], "sequence": 3}),
            None,
        ));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_orderbook_gap_reports_needs_resync() {
        let book = Orderbook::new("BTC-USD");
        book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Subscribed,
            json!({"sequence": 5}),
            None,
        ));
        let outcome = book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Update,
            json!({"bids": [["1", "1"]], "sequence": 8}),
            None,
        ));
        assert_eq!(outcome, ApplyOutcome::NeedsResync { expected: 6, got: 8 });
    }

    #[test]
    fn test_opened_orders_terminal_removal() {
        let orders = OpenedOrders::new();
        orders.apply_message(&frame(
            "account",
            Event::Subscribed,
            json!({"orders": [{"id": "O1", "market_id": "BTC-USD", "status": "open"}]}),
            None,
        ));
        assert_eq!(orders.get_orders().len(), 1);

        orders.apply_message(&frame(
            "account",
            Event::Update,
            json!({"orders": [{"id": "O1", "market_id": "BTC-USD", "status": "filled"}]}),
            None,
        ));
        assert!(orders.get_orders().is_empty());
        assert!(orders.get_order("BTC-USD", "O1").is_none());
    }

    #[test]
    fn test_positions_view_copies_are_detached() {
        let positions = Positions::new();
        positions.apply_message(&frame(
            "account",
            Event::Subscribed,
            json!({"positions": [{"market_id": "BTC-USD", "size": "1"}]}),
            None,
        ));

        let snapshot = positions.get_positions();
        positions.apply_message(&frame(
            "account",
            Event::Update,
            json!({"positions": [{"market_id": "BTC-USD", "size": "0"}]}),
            None,
        ));

        // The earlier copy is unaffected by the concurrent update.
        assert_eq!(snapshot.len(), 1);
        assert!(positions.get_positions().is_empty());
    }

    #[test]
    fn test_mark_stale_and_recovery() {
        let book = Orderbook::new("BTC-USD");
        book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Subscribed,
            json!({"bids": [["100", "5"]], "sequence": 1}),
            None,
        ));
        assert!(!book.is_stale());

        let handler = Handler::from(book.clone());
        handler.mark_stale();
        assert!(book.is_stale());
        // Last-known values keep serving while stale.
        assert_eq!(book.best_bid(), Some(Price::new(dec!(100))));

        // Resubscription snapshot restores freshness.
        book.apply_message(&frame(
            "orderbook:BTC-USD",
            Event::Subscribed,
            json!({"bids": [["102", "1"]], "sequence": 1}),
            None,
        ));
        assert!(!book.is_stale());
        assert_eq!(book.best_bid(), Some(Price::new(dec!(102))));
    }

    #[test]
    fn test_raw_handler_sees_every_event() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        let raw = RawHandler::new("trade:BTC-USD".parse().unwrap(), move |_, _, _| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        let handler = Handler::from(raw);
        handler.apply_message(&frame("trade:BTC-USD", Event::Subscribed, json!({}), None));
        handler.apply_message(&frame("trade:BTC-USD", Event::Update, json!({"px": "1"}), None));
        handler.apply_message(&frame("trade:BTC-USD", Event::Error, json!({}), None));

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handler_ids_are_unique() {
        let a = Orderbook::new("BTC-USD");
        let b = Orderbook::new("BTC-USD");
        assert_ne!(a.id(), b.id());
        // Clones share identity.
        assert_eq!(a.id(), a.clone().id());
    }
}
