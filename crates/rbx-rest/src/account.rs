//! Account endpoints.

use crate::error::RestResult;
use crate::transport::{Method, Transport};
use rbx_core::{OrderRecord, PositionRecord, Size};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Account profile as returned by `/account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub id: i64,
    pub profile_type: String,
    pub status: String,
    pub wallet: String,
    pub balance: Size,
    pub account_equity: Size,
    #[serde(default)]
    pub withdrawable_balance: Option<Size>,
    #[serde(default)]
    pub cum_unrealized_pnl: Option<Size>,
    #[serde(default)]
    pub positions: Vec<PositionRecord>,
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
}

pub struct Account {
    transport: Arc<Transport>,
}

impl Account {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Profile information, including current positions and open orders.
    pub async fn info(&self) -> RestResult<AccountInfo> {
        self.transport
            .issue_request(Method::Get, "/account", json!({}))
            .await?
            .single_as()
    }

    /// All open positions.
    pub async fn positions(&self) -> RestResult<Vec<PositionRecord>> {
        self.transport
            .issue_request(Method::Get, "/positions", json!({}))
            .await?
            .multiple_as()
    }

    /// Renew the session JWT (also used as the realtime auth token).
    pub async fn renew_session(&self) -> RestResult<String> {
        self.transport.get_session_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_info_parses_venue_payload() {
        let info: AccountInfo = serde_json::from_value(json!({
            "id": 84980,
            "profile_type": "trader",
            "status": "active",
            "wallet": "0x2b0f80b047c63052288e56b9e6ad9d2a4196441f",
            "balance": "14661.794000",
            "account_equity": "14661.503800",
            "withdrawable_balance": "14659.441300",
            "cum_unrealized_pnl": "-0.2902",
            "positions": [{
                "id": "pos-BTC-USD-tr-84980",
                "market_id": "BTC-USD",
                "size": "0.0004",
                "side": "long",
                "entry_price": "103850.5"
            }]
        }))
        .unwrap();

        assert_eq!(info.id, 84980);
        assert_eq!(info.balance, Size::new(dec!(14661.794000)));
        assert_eq!(info.positions.len(), 1);
        assert!(info.orders.is_empty());
    }
}
