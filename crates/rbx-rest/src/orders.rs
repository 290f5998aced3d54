//! Order endpoints.

use crate::error::RestResult;
use crate::transport::{Method, Transport};
use rbx_core::{OrderRecord, OrderSide, OrderType, Price, Size};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Parameters for creating an order.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrder {
    pub market_id: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub price: Price,
    pub size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl CreateOrder {
    pub fn limit(
        market_id: impl Into<String>,
        side: OrderSide,
        price: Price,
        size: Size,
    ) -> Self {
        Self {
            market_id: market_id.into(),
            order_type: OrderType::Limit,
            side,
            price,
            size,
            trigger_price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }
}

/// Parameters for amending an open order.
#[derive(Debug, Clone, Serialize)]
pub struct AmendOrder {
    pub order_id: String,
    pub market_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_price: Option<Price>,
}

pub struct Orders {
    transport: Arc<Transport>,
}

impl Orders {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    pub async fn create(&self, order: &CreateOrder) -> RestResult<OrderRecord> {
        self.transport
            .issue_request(Method::Post, "/orders", serde_json::to_value(order)?)
            .await?
            .single_as()
    }

    pub async fn amend(&self, amend: &AmendOrder) -> RestResult<OrderRecord> {
        self.transport
            .issue_request(Method::Put, "/orders", serde_json::to_value(amend)?)
            .await?
            .single_as()
    }

    pub async fn cancel(&self, market_id: &str, order_id: &str) -> RestResult<OrderRecord> {
        self.transport
            .issue_request(
                Method::Delete,
                "/orders",
                json!({"market_id": market_id, "order_id": order_id}),
            )
            .await?
            .single_as()
    }

    /// Cancel every open order on the account.
    pub async fn cancel_all(&self) -> RestResult<()> {
        self.transport
            .issue_request(Method::Delete, "/orders/cancel_all", json!({}))
            .await?;
        Ok(())
    }

    /// Open orders, optionally filtered by market.
    pub async fn list(&self, market_id: Option<&str>) -> RestResult<Vec<OrderRecord>> {
        let mut params = json!({});
        if let Some(market_id) = market_id {
            params["market_id"] = json!(market_id);
        }
        self.transport
            .issue_request(Method::Get, "/orders", params)
            .await?
            .multiple_as()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_create_order_serialization() {
        let order = CreateOrder::limit(
            "BTC-USD",
            OrderSide::Long,
            Price::new(dec!(106000)),
            Size::new(dec!(0.0001)),
        );
        let value = serde_json::to_value(&order).unwrap();

        assert_eq!(value["market_id"], "BTC-USD");
        assert_eq!(value["type"], "limit");
        assert_eq!(value["side"], "long");
        // Decimals travel as strings.
        assert_eq!(value["price"], "106000");
        assert_eq!(value["size"], "0.0001");
        // Unset optionals are omitted entirely.
        assert!(value.get("trigger_price").is_none());
        assert!(value.get("client_order_id").is_none());
    }

    #[test]
    fn test_amend_order_serialization() {
        let amend = AmendOrder {
            order_id: "BTC-USD@1185".to_string(),
            market_id: "BTC-USD".to_string(),
            price: Some(Price::new(dec!(105000))),
            size: None,
            trigger_price: None,
        };
        let value = serde_json::to_value(&amend).unwrap();

        assert_eq!(value["order_id"], "BTC-USD@1185");
        assert_eq!(value["price"], "105000");
        assert!(value.get("size").is_none());
    }
}
