//! Vault endpoints.

use crate::error::RestResult;
use crate::transport::{Method, Transport};
use serde_json::{json, Value};
use std::sync::Arc;

pub struct Vaults {
    transport: Arc<Transport>,
}

impl Vaults {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// All vaults visible to the account.
    pub async fn list(&self) -> RestResult<Vec<Value>> {
        self.transport
            .issue_request(Method::Get, "/vaults", json!({}))
            .await?
            .multiple()
    }

    /// One vault by id.
    pub async fn info(&self, vault_id: &str) -> RestResult<Value> {
        self.transport
            .issue_request(Method::Get, "/vaults", json!({"vault_id": vault_id}))
            .await?
            .single()
    }
}
