//! Trading-related data structures: credentials, book levels and orders.
//!
//! Order intents are ephemeral: built from a book snapshot, turned into
//! request params, submitted and dropped. The exchange is the only record of
//! resting orders.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::enums::{OrderType, Side};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API credentials. The secret is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Order book
// ---------------------------------------------------------------------------

/// One row of an order-book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub amount: f64,
}

/// Levels of one book side, best price first, in exchange order.
pub type OrderBookSide = Vec<PriceLevel>;

// ---------------------------------------------------------------------------
// Order intent
// ---------------------------------------------------------------------------

/// A limit order to be submitted, derived 1:1 from a [`PriceLevel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    pub side: Side,
    pub instrument: String,
    pub order_type: OrderType,
    pub price: f64,
    pub amount: f64,
}

impl OrderIntent {
    /// A limit order resting at `level.price` for a fixed `amount`.
    ///
    /// The level's depth is ignored; the lot size never follows liquidity.
    pub fn limit(side: Side, instrument: &str, level: &PriceLevel, amount: f64) -> Self {
        Self {
            side,
            instrument: instrument.to_string(),
            order_type: OrderType::Limit,
            price: level.price,
            amount,
        }
    }

    /// JSON-RPC method that submits this order.
    pub fn method(&self) -> &'static str {
        match self.side {
            Side::Buy => "private/buy",
            Side::Sell => "private/sell",
        }
    }

    /// Request params for [`method`](Self::method).
    pub fn params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        params.insert("instrument_name".into(), json!(self.instrument));
        params.insert("type".into(), json!(self.order_type.as_str()));
        params.insert("amount".into(), json!(self.amount));
        params.insert("price".into(), json!(self.price));
        params
    }
}
