//! Position records from the account stream and REST position endpoints.

use crate::order::OrderSide;
use crate::{Price, Size};
use serde::{Deserialize, Serialize};

/// One position as carried on the account stream.
///
/// A position with zero `size` is flat; the positions view removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub market_id: String,
    pub size: Size,
    #[serde(default)]
    pub side: Option<OrderSide>,
    #[serde(default)]
    pub entry_price: Option<Price>,
    #[serde(default)]
    pub unrealized_pnl: Option<Size>,
    #[serde(default)]
    pub notional: Option<Size>,
    #[serde(default)]
    pub margin: Option<Size>,
    #[serde(default)]
    pub liquidation_price: Option<Price>,
    #[serde(default)]
    pub fair_price: Option<Price>,
}

impl PositionRecord {
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_position_parses_venue_payload() {
        let pos: PositionRecord = serde_json::from_value(json!({
            "id": "pos-BTC-USD-tr-88889",
            "market_id": "BTC-USD",
            "profile_id": 88889,
            "size": "0.0001",
            "side": "long",
            "entry_price": "106000",
            "unrealized_pnl": "0.0001",
            "notional": "10.6001",
            "margin": "0.530005",
            "liquidation_price": "0",
            "fair_price": "106001"
        }))
        .unwrap();

        assert_eq!(pos.market_id, "BTC-USD");
        assert_eq!(pos.size, Size::new(dec!(0.0001)));
        assert_eq!(pos.entry_price, Some(Price::new(dec!(106000))));
        assert!(!pos.is_flat());
    }

    #[test]
    fn test_flat_position() {
        let pos: PositionRecord = serde_json::from_value(json!({
            "market_id": "ETH-USD",
            "size": "0"
        }))
        .unwrap();
        assert!(pos.is_flat());
    }
}
