//! Client facade.
//!
//! Wires a network preset, the signing boundary and the REST endpoint
//! groups together, and manufactures realtime clients whose auth tokens
//! come from the shared transport.

use crate::error::ClientResult;
use async_trait::async_trait;
use rbx_core::Network;
use rbx_rest::{
    Account, ApiKey, ApiKeySigner, ApiKeys, JwtSigner, Markets, Orders, Signer, Transport, Vaults,
};
use rbx_ws::{TokenProvider, WsClient, WsConfig, WsError, WsResult};
use std::sync::Arc;

/// How the client authenticates against the venue.
pub enum Credentials {
    ApiKey(ApiKey),
    /// An existing session: JWT plus its refresh token and random secret.
    Session {
        jwt: String,
        refresh_token: String,
        random_secret: String,
    },
    /// Caller-supplied signer (e.g. wallet-based onboarding).
    Custom(Arc<dyn Signer>),
}

impl Credentials {
    fn into_signer(self) -> Arc<dyn Signer> {
        match self {
            Self::ApiKey(api_key) => Arc::new(ApiKeySigner::new(api_key)),
            Self::Session {
                jwt,
                refresh_token,
                random_secret,
            } => Arc::new(JwtSigner::new(jwt, refresh_token, random_secret)),
            Self::Custom(signer) => signer,
        }
    }
}

/// Top-level venue client.
pub struct RabbitX {
    network: Network,
    transport: Arc<Transport>,
    pub account: Account,
    pub orders: Orders,
    pub markets: Markets,
    pub vaults: Vaults,
    pub apikeys: ApiKeys,
}

impl RabbitX {
    pub fn new(network: Network, credentials: Credentials) -> ClientResult<Self> {
        let transport = Arc::new(Transport::for_network(network, credentials.into_signer())?);
        Ok(Self::from_transport(network, transport))
    }

    /// Override the REST base URL (e.g. a staging deployment).
    pub fn with_base_url(
        network: Network,
        base_url: impl Into<String>,
        credentials: Credentials,
    ) -> ClientResult<Self> {
        let transport = Arc::new(Transport::new(
            base_url,
            network.exchange_id(),
            credentials.into_signer(),
        )?);
        Ok(Self::from_transport(network, transport))
    }

    fn from_transport(network: Network, transport: Arc<Transport>) -> Self {
        Self {
            network,
            account: Account::new(transport.clone()),
            orders: Orders::new(transport.clone()),
            markets: Markets::new(transport.clone()),
            vaults: Vaults::new(transport.clone()),
            apikeys: ApiKeys::new(transport.clone()),
            transport,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn transport(&self) -> Arc<Transport> {
        self.transport.clone()
    }

    /// Realtime client for this network, authenticating through the
    /// shared transport.
    pub fn ws(&self) -> WsClient {
        self.ws_with_config(WsConfig::for_network(self.network))
    }

    /// Realtime client with explicit configuration. An empty URL falls
    /// back to the network preset.
    pub fn ws_with_config(&self, mut config: WsConfig) -> WsClient {
        if config.url.is_empty() {
            config.url = self.network.ws_url().to_string();
        }
        WsClient::new(config, Arc::new(TransportTokens(self.transport.clone())))
    }
}

/// Adapts the REST transport to the realtime token capability.
struct TransportTokens(Arc<Transport>);

#[async_trait]
impl TokenProvider for TransportTokens {
    async fn session_token(&self) -> WsResult<String> {
        self.0
            .get_session_token()
            .await
            .map_err(|e| WsError::TokenSource(e.to_string()))
    }
}
