//! API-key management endpoints.

use crate::error::RestResult;
use crate::transport::{Method, Transport};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct ApiKeys {
    transport: Arc<Transport>,
}

impl ApiKeys {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Keys registered on the account.
    pub async fn list(&self) -> RestResult<Vec<Value>> {
        self.transport
            .issue_request(Method::Get, "/secrets", json!({}))
            .await?
            .multiple()
    }

    /// Create a key. `expiration` is unix seconds; `None` means the
    /// venue default.
    pub async fn create(&self, expiration: Option<i64>) -> RestResult<Value> {
        let mut body = json!({});
        if let Some(expiration) = expiration {
            body["expiration"] = json!(expiration);
        }
        self.transport
            .issue_request(Method::Post, "/secrets", body)
            .await?
            .single()
    }

    /// Revoke a key.
    pub async fn delete(&self, key: &str) -> RestResult<()> {
        self.transport
            .issue_request(Method::Delete, "/secrets", json!({"key": key}))
            .await?;
        Ok(())
    }
}
