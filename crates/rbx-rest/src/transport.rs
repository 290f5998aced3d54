//! HTTP transport.
//!
//! One `Transport` per venue deployment: builds signed requests, issues
//! them with a timeout, and parses the response envelope. Also the
//! session-token source for the realtime connection: `get_session_token`
//! renews the JWT and transparently upgrades the signer to the returned
//! session credentials.

use crate::error::{RestError, RestResult};
use crate::response::ApiResponse;
use crate::signer::{JwtSigner, Signer};
use parking_lot::RwLock;
use rbx_core::Network;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method, with its idempotency class for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// POST creates; everything else can be safely retried.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, Self::Post)
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    exchange_id: String,
    signer: RwLock<Arc<dyn Signer>>,
}

impl Transport {
    pub fn new(
        base_url: impl Into<String>,
        exchange_id: impl Into<String>,
        signer: Arc<dyn Signer>,
    ) -> RestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            exchange_id: exchange_id.into(),
            signer: RwLock::new(signer),
        })
    }

    pub fn for_network(network: Network, signer: Arc<dyn Signer>) -> RestResult<Self> {
        Self::new(network.api_url(), network.exchange_id(), signer)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the signer, e.g. after session renewal.
    pub fn set_signer(&self, signer: Arc<dyn Signer>) {
        *self.signer.write() = signer;
    }

    /// Issue one signed request and parse the response envelope.
    ///
    /// For GET the payload becomes query parameters; otherwise it is the
    /// JSON body. Either way it is covered by the signature.
    pub async fn issue_request(
        &self,
        method: Method,
        path: &str,
        payload: Value,
    ) -> RestResult<ApiResponse> {
        let headers = self.signer.read().headers(method.as_str(), path, &payload)?;

        let url = format!("{}{}", self.base_url, path);
        debug!(method = method.as_str(), %url, "issuing request");

        let mut request = self
            .client
            .request(method.to_reqwest(), &url)
            .header("EID", &self.exchange_id);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        request = match method {
            Method::Get => request.query(&query_pairs(&payload)),
            _ => request.json(&payload),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let api: ApiResponse = response.json().await?;
        if !api.success {
            return Err(RestError::Api {
                message: "request unsuccessful".to_string(),
                request_id: api.request_id,
            });
        }
        Ok(api)
    }

    /// Renew the session JWT. When the venue returns the full session
    /// bundle the signer is upgraded, so subsequent requests ride the
    /// session credentials.
    pub async fn get_session_token(&self) -> RestResult<String> {
        let refresh = self.signer.read().refresh_token();
        let mut body = serde_json::json!({"is_client": refresh.is_some()});
        if let Some(token) = &refresh {
            body["refresh_token"] = Value::String(token.clone());
        }

        let data = self.issue_request(Method::Post, "/jwt", body).await?.single()?;
        let jwt = data
            .get("jwt")
            .and_then(Value::as_str)
            .ok_or_else(|| RestError::BadResult("missing jwt in session response".to_string()))?
            .to_string();

        let refresh_token = data
            .get("refreshToken")
            .or_else(|| data.get("refresh_token"))
            .and_then(Value::as_str);
        let random_secret = data
            .get("randomSecret")
            .or_else(|| data.get("random_secret"))
            .and_then(Value::as_str);
        if let (Some(refresh), Some(secret)) = (refresh_token, random_secret) {
            info!("session renewed, signer upgraded");
            self.set_signer(Arc::new(JwtSigner::new(jwt.clone(), refresh, secret)));
        }

        Ok(jwt)
    }
}

/// Flatten a JSON object into query pairs, in canonical-value form.
fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = payload else {
        return Vec::new();
    };
    map.iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
