//! Request signing boundary.
//!
//! Every private request carries a timestamped HMAC signature over a
//! canonical digest of the payload. The canonical form sorts key=value
//! pairs, appends the method and path, and suffixes the timestamp; the
//! SHA-256 digest of that string is then signed with HMAC-SHA256 using
//! the account secret.
//!
//! Wallet (EIP-712) onboarding signatures are out of scope: callers that
//! need them supply their own [`Signer`].

use crate::error::{RestError, RestResult};
use ring::{digest, hmac};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Seconds of validity granted to a signed request.
const SIGNATURE_LIFETIME_SECS: i64 = 15;

/// Produces the auth headers for one request.
pub trait Signer: Send + Sync {
    fn headers(&self, method: &str, path: &str, payload: &Value) -> RestResult<Vec<(String, String)>>;

    /// Refresh token for session renewal, when the signer carries one.
    fn refresh_token(&self) -> Option<String> {
        None
    }
}

/// API key credentials.
#[derive(Clone, serde::Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub secret: String,
    #[serde(default)]
    pub public_jwt: Option<String>,
    #[serde(default)]
    pub private_jwt: Option<String>,
}

impl ApiKey {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            public_jwt: None,
            private_jwt: None,
        }
    }

    /// Read credentials from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> RestResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RestError::Signing(format!("cannot read api key file: {e}")))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Signs requests with an API key secret.
pub struct ApiKeySigner {
    api_key: ApiKey,
}

impl ApiKeySigner {
    pub fn new(api_key: ApiKey) -> Self {
        Self { api_key }
    }
}

impl Signer for ApiKeySigner {
    fn headers(&self, method: &str, path: &str, payload: &Value) -> RestResult<Vec<(String, String)>> {
        let timestamp = current_timestamp() + SIGNATURE_LIFETIME_SECS;
        let message = canonical_message(method, path, payload, timestamp);
        let signature = hmac_signature(&self.api_key.secret, &payload_digest(&message))?;
        Ok(vec![
            ("RBT-TS".to_string(), timestamp.to_string()),
            ("RBT-API-KEY".to_string(), self.api_key.key.clone()),
            ("RBT-SIGNATURE".to_string(), signature),
        ])
    }
}

/// Signs requests with a session JWT and its random secret.
pub struct JwtSigner {
    jwt: String,
    refresh_token: String,
    random_secret: String,
}

impl JwtSigner {
    pub fn new(
        jwt: impl Into<String>,
        refresh_token: impl Into<String>,
        random_secret: impl Into<String>,
    ) -> Self {
        Self {
            jwt: jwt.into(),
            refresh_token: refresh_token.into(),
            random_secret: random_secret.into(),
        }
    }
}

impl fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSigner")
            .field("jwt", &"<redacted>")
            .finish()
    }
}

impl Signer for JwtSigner {
    fn headers(&self, method: &str, path: &str, payload: &Value) -> RestResult<Vec<(String, String)>> {
        let timestamp = current_timestamp() + SIGNATURE_LIFETIME_SECS;
        let message = canonical_message(method, path, payload, timestamp);
        let signature = hmac_signature(&self.random_secret, &payload_digest(&message))?;
        Ok(vec![
            ("RBT-TS".to_string(), timestamp.to_string()),
            ("RBT-SIGNATURE".to_string(), signature),
            ("RBT-JWT".to_string(), self.jwt.clone()),
        ])
    }

    fn refresh_token(&self) -> Option<String> {
        Some(self.refresh_token.clone())
    }
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Canonical form: sorted `key=value` pairs (payload fields plus `method`
/// and `path`) concatenated, with the timestamp appended.
fn canonical_message(method: &str, path: &str, payload: &Value, timestamp: i64) -> String {
    let mut parts: Vec<(String, String)> = Vec::new();
    if let Value::Object(map) = payload {
        for (key, value) in map {
            parts.push((key.clone(), canonical_value(value)));
        }
    }
    parts.push(("method".to_string(), method.to_uppercase()));
    parts.push(("path".to_string(), path.to_string()));
    parts.sort_by(|a, b| a.0.cmp(&b.0));

    let mut message = String::new();
    for (key, value) in &parts {
        message.push_str(key);
        message.push('=');
        message.push_str(value);
    }
    message.push_str(&timestamp.to_string());
    message
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let joined = items
                .iter()
                .map(canonical_value)
                .collect::<Vec<_>>()
                .join(",");
            format!("[\"{joined}\"]")
        }
        Value::Null => "null".to_string(),
        Value::Object(_) => value.to_string(),
    }
}

/// `0x`-prefixed SHA-256 hex digest of the canonical message.
fn payload_digest(message: &str) -> String {
    let hash = digest::digest(&digest::SHA256, message.as_bytes());
    format!("0x{}", hex::encode(hash.as_ref()))
}

/// HMAC-SHA256 of the digest bytes, keyed by the hex-encoded secret.
fn hmac_signature(secret: &str, digest_hex: &str) -> RestResult<String> {
    let key_bytes = hex::decode(strip_0x(secret))
        .map_err(|e| RestError::Signing(format!("secret is not valid hex: {e}")))?;
    let data_bytes = hex::decode(strip_0x(digest_hex))
        .map_err(|e| RestError::Signing(format!("digest is not valid hex: {e}")))?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, &key_bytes);
    let tag = hmac::sign(&key, &data_bytes);
    Ok(format!("0x{}", hex::encode(tag.as_ref())))
}

fn strip_0x(hex_str: &str) -> &str {
    hex_str.strip_prefix("0x").unwrap_or(hex_str)
}
