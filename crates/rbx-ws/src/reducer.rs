//! Per-topic state reducers.
//!
//! Each reducer maps (previous state, incoming message) to new state and
//! reports whether the message was applied. Snapshots replace state
//! wholesale; deltas are gated on sequence continuity:
//!
//! - `sequence <= current` → [`ApplyOutcome::Stale`], state untouched
//! - `sequence == current + 1` → applied
//! - `sequence > current + 1` → [`ApplyOutcome::NeedsResync`]; the caller
//!   resubscribes the topic, which delivers a fresh snapshot
//!
//! All arithmetic runs on `Price`/`Size` decimals; floats never enter
//! these paths.

use rbx_core::{OrderRecord, PositionRecord, Price, Size};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Result of applying one message to a topic's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State advanced; update callbacks may fire.
    Applied,
    /// Duplicate or out-of-date message; state unchanged, no callbacks.
    Stale,
    /// A delta was missed; state is untrustworthy until resynchronized
    /// from a fresh snapshot.
    NeedsResync { expected: u64, got: u64 },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Gate a delta's sequence number against the state's current one.
///
/// `None` means the message is unsequenced and passes through.
fn gate_sequence(current: u64, incoming: Option<u64>) -> Result<Option<u64>, ApplyOutcome> {
    match incoming {
        None => Ok(None),
        Some(seq) if seq <= current => Err(ApplyOutcome::Stale),
        Some(seq) if seq > current + 1 => Err(ApplyOutcome::NeedsResync {
            expected: current + 1,
            got: seq,
        }),
        Some(seq) => Ok(Some(seq)),
    }
}

// ============================================================================
// Orderbook
// ============================================================================

/// Depth payload: price levels per side, zero size deletes a level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookPayload {
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub bids: Vec<(Price, Size)>,
    #[serde(default)]
    pub asks: Vec<(Price, Size)>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Per-market depth state: ordered price → size per side plus the last
/// applied sequence number.
#[derive(Debug, Clone, Default)]
pub struct OrderbookState {
    pub bids: BTreeMap<Price, Size>,
    pub asks: BTreeMap<Price, Size>,
    pub sequence: u64,
}

impl OrderbookState {
    /// Replace the book from a snapshot. Always applied.
    pub fn apply_snapshot(&mut self, payload: &BookPayload) -> ApplyOutcome {
        self.bids.clear();
        self.asks.clear();
        self.sequence = payload.sequence.unwrap_or(0);
        self.merge_levels(payload);
        ApplyOutcome::Applied
    }

    /// Apply an incremental update, gated on sequence continuity.
    pub fn apply_delta(&mut self, payload: &BookPayload) -> ApplyOutcome {
        let seq = match gate_sequence(self.sequence, payload.sequence) {
            Ok(seq) => seq,
            Err(outcome) => return outcome,
        };
        self.merge_levels(payload);
        if let Some(seq) = seq {
            self.sequence = seq;
        }
        ApplyOutcome::Applied
    }

    fn merge_levels(&mut self, payload: &BookPayload) {
        for &(price, size) in &payload.bids {
            if size.is_zero() {
                self.bids.remove(&price);
            } else {
                self.bids.insert(price, size);
            }
        }
        for &(price, size) in &payload.asks {
            if size.is_zero() {
                self.asks.remove(&price);
            } else {
                self.asks.insert(price, size);
            }
        }
    }

    /// Highest bid price, or `None` for an empty side.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.last_key_value().map(|(price, _)| *price)
    }

    /// Lowest ask price, or `None` for an empty side.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first_key_value().map(|(price, _)| *price)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

// ============================================================================
// Account stream (orders + positions)
// ============================================================================

/// Account stream payload. One frame carries both order and position
/// updates; each view picks its own array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPayload {
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
    #[serde(default)]
    pub positions: Vec<PositionRecord>,
}

/// Open orders keyed by market and order id. Terminal statuses remove
/// entries.
#[derive(Debug, Clone, Default)]
pub struct OrdersState {
    orders: HashMap<String, HashMap<String, OrderRecord>>,
    sequence: u64,
}

impl OrdersState {
    /// Replace the open set from a snapshot.
    pub fn apply_snapshot(&mut self, sequence: Option<u64>, payload: &AccountPayload) -> ApplyOutcome {
        self.orders.clear();
        self.sequence = sequence.unwrap_or(0);
        self.upsert_all(payload);
        ApplyOutcome::Applied
    }

    /// Apply a streaming update, gated on sequence continuity.
    pub fn apply_delta(&mut self, sequence: Option<u64>, payload: &AccountPayload) -> ApplyOutcome {
        let seq = match gate_sequence(self.sequence, sequence) {
            Ok(seq) => seq,
            Err(outcome) => return outcome,
        };
        self.upsert_all(payload);
        if let Some(seq) = seq {
            self.sequence = seq;
        }
        ApplyOutcome::Applied
    }

    fn upsert_all(&mut self, payload: &AccountPayload) {
        for order in &payload.orders {
            let market = self.orders.entry(order.market_id.clone()).or_default();
            if order.is_terminal() {
                market.remove(&order.id);
            } else {
                market.insert(order.id.clone(), order.clone());
            }
        }
    }

    pub fn get(&self, market_id: &str, order_id: &str) -> Option<&OrderRecord> {
        self.orders.get(market_id)?.get(order_id)
    }

    /// Point-in-time copy of every open order.
    pub fn all(&self) -> Vec<OrderRecord> {
        self.orders
            .values()
            .flat_map(|by_id| by_id.values().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Positions keyed by market. A flat (zero-size) position is removed.
#[derive(Debug, Clone, Default)]
pub struct PositionsState {
    positions: HashMap<String, PositionRecord>,
    sequence: u64,
}

impl PositionsState {
    pub fn apply_snapshot(&mut self, sequence: Option<u64>, payload: &AccountPayload) -> ApplyOutcome {
        self.positions.clear();
        self.sequence = sequence.unwrap_or(0);
        self.upsert_all(payload);
        ApplyOutcome::Applied
    }

    pub fn apply_delta(&mut self, sequence: Option<u64>, payload: &AccountPayload) -> ApplyOutcome {
        let seq = match gate_sequence(self.sequence, sequence) {
            Ok(seq) => seq,
            Err(outcome) => return outcome,
        };
        self.upsert_all(payload);
        if let Some(seq) = seq {
            self.sequence = seq;
        }
        ApplyOutcome::Applied
    }

    fn upsert_all(&mut self, payload: &AccountPayload) {
        for position in &payload.positions {
            if position.is_flat() {
                self.positions.remove(&position.market_id);
            } else {
                self.positions
                    .insert(position.market_id.clone(), position.clone());
            }
        }
    }

    pub fn get(&self, market_id: &str) -> Option<&PositionRecord> {
        self.positions.get(market_id)
    }

    pub fn all(&self) -> Vec<PositionRecord> {
        self.positions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
