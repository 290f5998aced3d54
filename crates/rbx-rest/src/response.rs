//! The venue's response envelope.
//!
//! Every endpoint answers `{success, result: [...], request_id?,
//! pagination?}`. Single-object endpoints still wrap the object in a
//! one-element `result` array.

use crate::error::{RestError, RestResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Vec<Value>>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub pagination: Option<Value>,
}

impl ApiResponse {
    /// Exactly one result, or an error.
    pub fn single(self) -> RestResult<Value> {
        let mut result = self
            .result
            .ok_or_else(|| RestError::BadResult("missing result".to_string()))?;
        match result.len() {
            1 => Ok(result.remove(0)),
            n => Err(RestError::BadResult(format!("expected 1 result, got {n}"))),
        }
    }

    /// All results (possibly empty), or an error when the key is absent.
    pub fn multiple(self) -> RestResult<Vec<Value>> {
        self.result
            .ok_or_else(|| RestError::BadResult("missing result".to_string()))
    }

    pub fn single_as<T: DeserializeOwned>(self) -> RestResult<T> {
        Ok(serde_json::from_value(self.single()?)?)
    }

    pub fn multiple_as<T: DeserializeOwned>(self) -> RestResult<Vec<T>> {
        self.multiple()?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(RestError::from))
            .collect()
    }
}
