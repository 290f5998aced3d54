//! Deployment presets.
//!
//! Each network maps to a fixed REST base URL and realtime endpoint. Both
//! can be overridden with explicit URLs at client construction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known venue deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Mainnet,
    Testnet,
    BlastMainnet,
    BlastTestnet,
}

impl Network {
    /// REST API base URL.
    pub const fn api_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "https://api.rabbitx.com",
            Self::Testnet => "https://api.testnet.rabbitx.io",
            Self::BlastMainnet => "https://api.blastfutures.com",
            Self::BlastTestnet => "https://api.testnet.blastfutures.com",
        }
    }

    /// Realtime WebSocket endpoint URL.
    pub const fn ws_url(&self) -> &'static str {
        match self {
            Self::Mainnet => "wss://api.rabbitx.com/ws",
            Self::Testnet => "wss://api.testnet.rabbitx.io/ws",
            Self::BlastMainnet => "wss://api.bfx.trade/ws",
            Self::BlastTestnet => "wss://api.testnet.blastfutures.com/ws",
        }
    }

    /// Exchange identifier sent in the `EID` header.
    pub const fn exchange_id(&self) -> &'static str {
        match self {
            Self::Mainnet | Self::Testnet => "rbx",
            Self::BlastMainnet | Self::BlastTestnet => "bfx",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::BlastMainnet => "blast-mainnet",
            Self::BlastTestnet => "blast-testnet",
        };
        write!(f, "{name}")
    }
}
