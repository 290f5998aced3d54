//! Realtime channel multiplexer for the RabbitX client.
//!
//! One duplex WebSocket carries many logical topics. This crate keeps
//! consumer-facing read models (order book, open orders, positions)
//! consistent across reconnects, out-of-order delivery and partial
//! failure:
//! - connection state machine with automatic reconnection, exponential
//!   backoff and subscription restoration
//! - per-topic reducers gated on sequence continuity, with resync on gaps
//! - per-topic dispatch so a slow handler cannot stall the reader
//! - heartbeat monitoring while live

pub mod connection;
mod dispatch;
pub mod error;
pub mod frame;
pub mod handler;
pub mod heartbeat;
pub mod reducer;
pub mod registry;

pub use connection::{SessionState, StaticTokenProvider, TokenProvider, WsClient, WsConfig};
pub use error::{WsError, WsResult};
pub use frame::{ClientFrame, Event, ServerFrame};
pub use handler::{
    BookCallback, Handler, HandlerId, OpenedOrders, Orderbook, OrderCallback, PositionCallback,
    Positions, RawCallback, RawHandler,
};
pub use reducer::{
    AccountPayload, ApplyOutcome, BookPayload, OrderbookState, OrdersState, PositionsState,
};
pub use registry::SubscriptionRegistry;
