//! Core domain types for the RabbitX client.
//!
//! This crate provides the fundamental types shared by the REST and
//! WebSocket layers:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Topic`: typed channel identifier (kind + scope)
//! - `OrderRecord`, `PositionRecord`: account stream records
//! - `Network`: endpoint presets per deployment

pub mod decimal;
pub mod error;
pub mod network;
pub mod order;
pub mod position;
pub mod topic;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use network::Network;
pub use order::{OrderRecord, OrderSide, OrderStatus, OrderType};
pub use position::PositionRecord;
pub use topic::{Topic, TopicKind};
