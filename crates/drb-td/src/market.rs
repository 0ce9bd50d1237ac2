//! Order-book snapshots from `public/get_order_book` replies.
//!
//! Levels arrive as `[price, amount]` pairs, best price first. The order is
//! kept exactly as received; orders are later derived level by level.

use serde_json::{Value, json};
use tracing::info;

use drb_core::error::{DrbError, DrbResult};
use drb_core::json_util::{parse_str_f64, parse_str_u64};
use drb_core::types::{BatchDiscipline, OrderBookSide, PriceLevel};
use drb_core::ws::Connector;

use crate::rpc::{Params, RpcResponse, RpcSession};

/// Method name of the order-book query.
pub const ORDER_BOOK_METHOD: &str = "public/get_order_book";

/// Top-of-book levels for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub instrument: Option<String>,
    /// Exchange timestamp (ms since epoch), when present.
    pub timestamp: Option<u64>,
    pub bids: OrderBookSide,
    pub asks: OrderBookSide,
}

impl OrderBookSnapshot {
    /// Parse the `result` of an order-book reply.
    pub fn from_response(response: &RpcResponse) -> DrbResult<Self> {
        let result = response.result()?;
        Ok(Self {
            instrument: result.get("instrument_name").and_then(Value::as_str).map(str::to_string),
            timestamp: parse_str_u64(result.get("timestamp")),
            bids: parse_side(result, "bids")?,
            asks: parse_side(result, "asks")?,
        })
    }

    pub fn bid_prices(&self) -> Vec<f64> {
        self.bids.iter().map(|l| l.price).collect()
    }

    pub fn ask_prices(&self) -> Vec<f64> {
        self.asks.iter().map(|l| l.price).collect()
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

/// Bid and ask prices of an order-book reply, in book order.
pub fn extract_prices(response: &RpcResponse) -> DrbResult<(Vec<f64>, Vec<f64>)> {
    let snapshot = OrderBookSnapshot::from_response(response)?;
    Ok((snapshot.bid_prices(), snapshot.ask_prices()))
}

/// Params for an order-book query.
pub fn order_book_params(instrument: &str, depth: u32) -> Params {
    let mut params = Params::new();
    params.insert("instrument_name".into(), json!(instrument));
    params.insert("depth".into(), json!(depth));
    params
}

/// Fetch a snapshot over a short-lived, unauthenticated connection.
///
/// The connection is closed before returning, whether the query succeeded
/// or not.
pub async fn fetch_top_of_book<C: Connector>(
    connector: &C,
    instrument: &str,
    depth: u32,
) -> DrbResult<OrderBookSnapshot> {
    let mut session = RpcSession::open(connector, BatchDiscipline::Serial, Some(1)).await?;
    let params = order_book_params(instrument, depth);
    let reply = session.call(ORDER_BOOK_METHOD, Some(params)).await;
    session.close().await;

    let snapshot = OrderBookSnapshot::from_response(&reply?)?;
    info!(
        "[market] {instrument}: {} bid(s), {} ask(s), best {:?}/{:?}",
        snapshot.bids.len(),
        snapshot.asks.len(),
        snapshot.best_bid(),
        snapshot.best_ask(),
    );
    Ok(snapshot)
}

fn parse_side(result: &Value, side: &str) -> DrbResult<OrderBookSide> {
    let levels = result
        .get(side)
        .and_then(Value::as_array)
        .ok_or_else(|| DrbError::MissingField(format!("result.{side}")))?;

    levels
        .iter()
        .enumerate()
        .map(|(i, level)| {
            let pair = level.as_array();
            let price = parse_str_f64(pair.and_then(|p| p.first()));
            let amount = parse_str_f64(pair.and_then(|p| p.get(1)));
            match (price, amount) {
                (Some(price), Some(amount)) => Ok(PriceLevel { price, amount }),
                _ => Err(DrbError::MissingField(format!("result.{side}[{i}]"))),
            }
        })
        .collect()
}
