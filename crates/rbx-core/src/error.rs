//! Core error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    #[error("invalid decimal: {0}")]
    InvalidDecimal(#[from] rust_decimal::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
