//! Enumerations used throughout the Deribit session bot.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Order enums
// ---------------------------------------------------------------------------

/// Buy or sell side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::Market => "market",
        }
    }
}

// ---------------------------------------------------------------------------
// Session / cycle lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of one RPC session (one WebSocket connection).
///
/// `Disconnected → Connected → Authenticated → Active → Closed`. `Active` is
/// entered on the first private call after authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    Active,
    Closed,
}

impl SessionState {
    /// Whether `private/*` methods may be sent in this state.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Active)
    }
}

/// Stages of one order cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleStage {
    Idle,
    Quoting,
    Submitting,
    HoldingOpen,
    BalanceCheck,
    Cancelling,
    Closing,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Quoting => "quoting",
            Self::Submitting => "submitting",
            Self::HoldingOpen => "holding-open",
            Self::BalanceCheck => "balance-check",
            Self::Cancelling => "cancelling",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Configuration enums
// ---------------------------------------------------------------------------

/// How the trading loop manages connections across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// One long-lived connection, authenticated once, reused across cycles.
    #[default]
    Persistent,
    /// A fresh connection and authentication for every cycle.
    ReconnectPerCycle,
}

/// How a batch of requests is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchDiscipline {
    /// Send every request, then collect replies matched by id.
    #[default]
    Pipelined,
    /// Send one request and wait for its reply before sending the next.
    Serial,
}

/// OAuth-style grant used for `public/auth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Plain `client_id` + `client_secret`.
    #[default]
    ClientCredentials,
    /// HMAC-SHA256 signature over timestamp, nonce and data; the secret never
    /// leaves the process.
    ClientSignature,
}

impl AuthMethod {
    /// The `grant_type` parameter value.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
            Self::ClientSignature => "client_signature",
        }
    }
}
