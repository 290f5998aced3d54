//! Typed channel identifiers.
//!
//! A topic addresses one realtime stream on the venue. The wire encoding is
//! `kind:scope` (e.g. `orderbook:BTC-USD`); account-wide streams have no
//! scope and are encoded as the bare kind (e.g. `account`).

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Stream kind. Closed set plus an escape hatch for venue additions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicKind {
    /// Per-market depth stream (snapshots + sequenced deltas).
    Orderbook,
    /// Per-market trade prints.
    Trade,
    /// Per-market stats (funding, index price).
    Market,
    /// Account stream: order and position updates.
    Account,
    /// Any other channel the venue exposes.
    Other(String),
}

impl TopicKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Orderbook => "orderbook",
            Self::Trade => "trade",
            Self::Market => "market",
            Self::Account => "account",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for TopicKind {
    fn from(s: &str) -> Self {
        match s {
            "orderbook" => Self::Orderbook,
            "trade" => Self::Trade,
            "market" => Self::Market,
            "account" => Self::Account,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A channel identifier: kind plus optional scope.
///
/// Immutable once created; used as the registry key for subscriptions and
/// dispatch routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    kind: TopicKind,
    scope: Option<String>,
}

impl Topic {
    pub fn new(kind: TopicKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: Some(scope.into()),
        }
    }

    /// A topic with no scope, e.g. the account stream.
    pub fn unscoped(kind: TopicKind) -> Self {
        Self { kind, scope: None }
    }

    /// Orderbook topic for a market.
    pub fn orderbook(market_id: impl Into<String>) -> Self {
        Self::new(TopicKind::Orderbook, market_id)
    }

    /// The account stream (orders + positions).
    pub fn account() -> Self {
        Self::unscoped(TopicKind::Account)
    }

    pub fn kind(&self) -> &TopicKind {
        &self.kind
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Wire channel name, e.g. `orderbook:BTC-USD`.
    pub fn channel(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}:{}", self.kind.as_str(), scope),
            None => self.kind.as_str().to_string(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel())
    }
}

impl FromStr for Topic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(CoreError::InvalidTopic(s.to_string()));
        }
        match s.split_once(':') {
            Some((kind, scope)) if !scope.is_empty() => {
                Ok(Self::new(TopicKind::from(kind), scope))
            }
            Some(_) => Err(CoreError::InvalidTopic(s.to_string())),
            None => Ok(Self::unscoped(TopicKind::from(s))),
        }
    }
}
