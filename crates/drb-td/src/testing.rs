//! Scripted in-memory exchange for unit tests.
//!
//! [`MockExchange`] is a [`Connector`]; every connection it hands out is a
//! [`MockTransport`] that answers each request as soon as it is sent,
//! echoing the request id. Replies come from a per-method script queue and
//! fall back to canned Deribit-shaped results. All connections share one
//! record of requests, connects and closes so tests can assert ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use drb_core::error::{DrbError, DrbResult};
use drb_core::ws::{Connector, Transport};

/// Scripted reaction to the next request of one method.
#[derive(Debug, Clone)]
pub(crate) enum Scripted {
    Result(Value),
    Error { code: i64, message: String },
    /// Drop the connection instead of replying.
    Close,
    /// Reply with a frame that is not JSON.
    Malformed,
    /// Never reply; the next receive times out.
    Silent,
}

#[derive(Default)]
struct ExchangeState {
    /// (connection number, parsed request) in send order.
    sent: Vec<(u32, Value)>,
    scripts: HashMap<String, VecDeque<Scripted>>,
    injections: VecDeque<String>,
    reverse: bool,
    connects: u32,
    close_calls: u32,
    refuse_connects: u32,
    max_in_flight: usize,
}

/// Shared handle to the scripted exchange.
#[derive(Clone, Default)]
pub(crate) struct MockExchange {
    state: Arc<Mutex<ExchangeState>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ExchangeState> {
        self.state.lock().unwrap()
    }

    /// Queue a reaction for the next `method` request.
    pub fn script(&self, method: &str, action: Scripted) {
        self.lock().scripts.entry(method.to_string()).or_default().push_back(action);
    }

    /// Deliver `frame` ahead of the next reply.
    pub fn inject(&self, frame: &str) {
        self.lock().injections.push_back(frame.to_string());
    }

    /// Deliver replies newest-first.
    pub fn reverse_replies(&self, reverse: bool) {
        self.lock().reverse = reverse;
    }

    /// Fail the next `n` connection attempts.
    pub fn refuse_connects(&self, n: u32) {
        self.lock().refuse_connects = n;
    }

    /// Methods of all requests sent so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .map(|(_, req)| req["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Methods sent on connection `conn` (1-based).
    pub fn methods_on(&self, conn: u32) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, req)| req["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Full requests sent for `method`.
    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.lock()
            .sent
            .iter()
            .filter(|(_, req)| req["method"] == method)
            .map(|(_, req)| req.clone())
            .collect()
    }

    pub fn last_request_id(&self) -> Option<String> {
        self.lock().sent.last().and_then(|(_, req)| req["id"].as_str().map(str::to_string))
    }

    pub fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    pub fn max_in_flight(&self) -> usize {
        self.lock().max_in_flight
    }
}

#[async_trait]
impl Connector for MockExchange {
    type Conn = MockTransport;

    fn endpoint(&self) -> &str {
        "mock://exchange"
    }

    async fn connect(&self) -> DrbResult<MockTransport> {
        let conn = {
            let mut state = self.lock();
            if state.refuse_connects > 0 {
                state.refuse_connects -= 1;
                return Err(DrbError::Connection("mock: connection refused".into()));
            }
            state.connects += 1;
            state.connects
        };
        Ok(MockTransport {
            exchange: self.clone(),
            conn,
            inbox: VecDeque::new(),
            dropped: false,
            closed: false,
        })
    }
}

/// One scripted connection.
pub(crate) struct MockTransport {
    exchange: MockExchange,
    conn: u32,
    inbox: VecDeque<String>,
    /// The exchange dropped the connection.
    dropped: bool,
    /// We closed the connection.
    closed: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> DrbResult<()> {
        if self.dropped || self.closed {
            return Err(DrbError::Connection("mock: send on closed connection".into()));
        }
        let request: Value = serde_json::from_str(&frame).expect("session sent invalid JSON");
        let method = request["method"].as_str().unwrap_or_default().to_string();

        let mut state = self.exchange.lock();
        state.sent.push((self.conn, request.clone()));
        self.inbox.extend(state.injections.drain(..));

        let action = state.scripts.get_mut(&method).and_then(VecDeque::pop_front);
        let reply = match action {
            None => Some(reply_frame(&request, Ok(default_result(&method, &request)))),
            Some(Scripted::Result(result)) => Some(reply_frame(&request, Ok(result))),
            Some(Scripted::Error { code, message }) => {
                Some(reply_frame(&request, Err((code, message))))
            }
            Some(Scripted::Malformed) => Some("}{ not json".to_string()),
            Some(Scripted::Silent) => None,
            Some(Scripted::Close) => {
                self.dropped = true;
                None
            }
        };

        if let Some(reply) = reply {
            if state.reverse {
                self.inbox.push_front(reply);
            } else {
                self.inbox.push_back(reply);
            }
        }
        state.max_in_flight = state.max_in_flight.max(self.inbox.len());
        Ok(())
    }

    async fn receive(&mut self) -> DrbResult<String> {
        if self.dropped || self.closed {
            return Err(DrbError::ConnectionClosed("mock: connection closed".into()));
        }
        self.inbox.pop_front().ok_or(DrbError::Timeout(Duration::ZERO))
    }

    async fn close(&mut self) -> DrbResult<()> {
        self.exchange.lock().close_calls += 1;
        self.closed = true;
        Ok(())
    }
}

fn reply_frame(request: &Value, outcome: Result<Value, (i64, String)>) -> String {
    let mut reply = json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "usIn": 1_700_000_000_000_000u64,
        "usOut": 1_700_000_000_000_250u64,
        "usDiff": 250,
        "testnet": true,
    });
    match outcome {
        Ok(result) => reply["result"] = result,
        Err((code, message)) => reply["error"] = json!({"code": code, "message": message}),
    }
    reply.to_string()
}

/// Canned results shaped like Deribit's.
fn default_result(method: &str, request: &Value) -> Value {
    let params = &request["params"];
    match method {
        "public/auth" => json!({
            "access_token": "token-abc",
            "refresh_token": "refresh-abc",
            "expires_in": 900,
            "scope": "connection mainaccount",
            "token_type": "bearer",
        }),
        "public/get_order_book" => json!({
            "instrument_name": params["instrument_name"],
            "timestamp": 1_700_000_000_000u64,
            "bids": [[100.0, 1.0], [99.0, 1.0]],
            "asks": [[101.0, 1.0], [102.0, 1.0]],
        }),
        "private/buy" | "private/sell" => json!({
            "order": {
                "order_id": format!("BTC-{}", request["id"].as_str().unwrap_or_default()),
                "direction": if method == "private/buy" { "buy" } else { "sell" },
                "price": params["price"],
                "amount": params["amount"],
                "order_state": "open",
            },
            "trades": [],
        }),
        "private/get_account_summary" => json!({
            "currency": params["currency"],
            "balance": 1.5,
            "equity": 1.5,
        }),
        "private/cancel_all_by_instrument" => json!(4),
        "private/close_position" => json!({"order": {"order_state": "filled"}, "trades": []}),
        _ => json!("ok"),
    }
}
