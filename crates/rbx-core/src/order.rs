//! Order records from the account stream and REST order endpoints.

use crate::{Price, Size};
use serde::{Deserialize, Serialize};

/// Order side as the venue names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Long,
    Short,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    TakeProfit,
}

/// Order lifecycle status.
///
/// Unknown statuses deserialize into `Other` so a venue-side addition does
/// not break parsing of the whole account frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Processing,
    Open,
    Closed,
    Filled,
    Canceling,
    Canceled,
    Amending,
    Rejected,
    #[serde(untagged)]
    Other(String),
}

impl OrderStatus {
    /// Whether no further updates are expected for this order.
    ///
    /// `canceling` counts as terminal for the open-orders view: the venue
    /// emits it once and the order is no longer actionable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Filled | Self::Canceling | Self::Canceled | Self::Rejected
        )
    }
}

/// One order as carried on the account stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub market_id: String,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(alias = "type", default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub side: Option<OrderSide>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub initial_size: Option<Size>,
    #[serde(default)]
    pub total_filled_size: Option<Size>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl OrderRecord {
    /// Whether this update removes the order from the open set.
    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(OrderStatus::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_order_record_parses_venue_payload() {
        let order: OrderRecord = serde_json::from_value(json!({
            "id": "BTC-USD@1185",
            "profile_id": 88889,
            "market_id": "BTC-USD",
            "order_type": "limit",
            "status": "open",
            "price": "106000",
            "size": "0.0001",
            "initial_size": "0.0001",
            "total_filled_size": "0",
            "side": "long",
            "timestamp": 1748766209245711_i64,
            "client_order_id": ""
        }))
        .unwrap();

        assert_eq!(order.id, "BTC-USD@1185");
        assert_eq!(order.status, Some(OrderStatus::Open));
        assert_eq!(order.side, Some(OrderSide::Long));
        assert_eq!(order.price, Some(Price::new(dec!(106000))));
        assert!(!order.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in ["closed", "filled", "canceled", "canceling", "rejected"] {
            let parsed: OrderStatus = serde_json::from_value(json!(status)).unwrap();
            assert!(parsed.is_terminal(), "status '{status}' should be terminal");
        }
        for status in ["open", "processing", "amending"] {
            let parsed: OrderStatus = serde_json::from_value(json!(status)).unwrap();
            assert!(!parsed.is_terminal(), "status '{status}' should be open");
        }
    }

    #[test]
    fn test_unknown_status_parses_as_other() {
        let parsed: OrderStatus = serde_json::from_value(json!("pendingReplace")).unwrap();
        assert_eq!(parsed, OrderStatus::Other("pendingReplace".to_string()));
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn test_minimal_payload_accepted() {
        // The venue occasionally sends partial order objects; only the two
        // identifying fields are required.
        let order: OrderRecord = serde_json::from_value(json!({
            "id": "ETH-USD@7",
            "market_id": "ETH-USD"
        }))
        .unwrap();
        assert!(order.status.is_none());
        assert!(!order.is_terminal());
    }
}
