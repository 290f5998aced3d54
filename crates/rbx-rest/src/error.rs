//! REST transport error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The venue answered with `success: false`.
    #[error("API error: {message}")]
    Api {
        message: String,
        request_id: Option<String>,
    },

    #[error("bad result: {0}")]
    BadResult(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestError {
    /// Whether a retry can be expected to help. Network failures and
    /// server-side errors are retryable only for idempotent requests;
    /// everything the venue actively rejected is not.
    pub fn is_retryable(&self, idempotent: bool) -> bool {
        match self {
            Self::Http(e) => idempotent && (e.is_timeout() || e.is_connect()),
            Self::Status { status, .. } => idempotent && *status >= 500,
            Self::Api { .. } | Self::BadResult(_) | Self::Signing(_) | Self::Json(_) => false,
        }
    }
}

pub type RestResult<T> = Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server_err = RestError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(server_err.is_retryable(true));
        assert!(!server_err.is_retryable(false));

        let client_err = RestError::Status {
            status: 400,
            body: String::new(),
        };
        assert!(!client_err.is_retryable(true));

        let api_err = RestError::Api {
            message: "insufficient margin".into(),
            request_id: None,
        };
        assert!(!api_err.is_retryable(true));
    }
}
