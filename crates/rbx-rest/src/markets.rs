//! Market data endpoints.

use crate::error::RestResult;
use crate::transport::{Method, Transport};
use rbx_core::{Price, Size};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Market descriptor as returned by `/markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketInfo {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub min_tick: Option<Price>,
    #[serde(default)]
    pub min_order: Option<Size>,
    #[serde(default)]
    pub best_bid: Option<Price>,
    #[serde(default)]
    pub best_ask: Option<Price>,
    #[serde(default)]
    pub market_price: Option<Price>,
    #[serde(default)]
    pub index_price: Option<Price>,
    #[serde(default)]
    pub last_trade_price: Option<Price>,
    #[serde(default)]
    pub fair_price: Option<Price>,
    #[serde(default)]
    pub open_interest: Option<Size>,
    #[serde(default)]
    pub last_update_sequence: Option<u64>,
}

/// One OHLCV candle.
#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Size,
}

pub struct Markets {
    transport: Arc<Transport>,
}

impl Markets {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub async fn list(&self) -> RestResult<Vec<MarketInfo>> {
        self.transport
            .issue_request(Method::Get, "/markets", json!({}))
            .await?
            .multiple_as()
    }

    pub async fn info(&self, market_id: &str) -> RestResult<MarketInfo> {
        self.transport
            .issue_request(Method::Get, "/markets", json!({"market_id": market_id}))
            .await?
            .single_as()
    }

    /// OHLCV candles for a market. `period` is in minutes; timestamps are
    /// unix seconds.
    pub async fn candles(
        &self,
        market_id: &str,
        period: u32,
        timestamp_from: i64,
        timestamp_to: i64,
    ) -> RestResult<Vec<Candle>> {
        self.transport
            .issue_request(
                Method::Get,
                "/candles",
                json!({
                    "market_id": market_id,
                    "period": period,
                    "timestamp_from": timestamp_from,
                    "timestamp_to": timestamp_to,
                }),
            )
            .await?
            .multiple_as()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_info_parses_venue_payload() {
        let market: MarketInfo = serde_json::from_value(json!({
            "id": "BTC-USD",
            "status": "active",
            "min_tick": "1",
            "min_order": "0.0001",
            "best_bid": "0",
            "best_ask": "0",
            "market_price": "106000",
            "index_price": "104124",
            "last_trade_price": "106000",
            "fair_price": "106092",
            "open_interest": "42.4332",
            "last_update_sequence": 96
        }))
        .unwrap();

        assert_eq!(market.id, "BTC-USD");
        assert_eq!(market.min_tick, Some(Price::new(dec!(1))));
        assert_eq!(market.open_interest, Some(Size::new(dec!(42.4332))));
        assert_eq!(market.last_update_sequence, Some(96));
    }

    #[test]
    fn test_candle_parses() {
        let candle: Candle = serde_json::from_value(json!({
            "time": 1748775600,
            "open": "105900",
            "high": "106100",
            "low": "105800",
            "close": "106000",
            "volume": "21.2"
        }))
        .unwrap();
        assert_eq!(candle.close, Price::new(dec!(106000)));
    }
}
