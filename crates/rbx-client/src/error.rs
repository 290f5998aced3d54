//! Client-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Rest(#[from] rbx_rest::RestError),

    #[error(transparent)]
    Ws(#[from] rbx_ws::WsError),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
