//! Request/response correlation over one exclusively owned transport.
//!
//! An [`RpcSession`] turns a raw [`Transport`] into a call/reply API and owns
//! authentication for its connection.
//!
//! # Correlation
//!
//! Every request gets a fresh UUID. Replies are always matched by id, never
//! by arrival order: while waiting for one id, replies to other outstanding
//! requests are parked in a buffer until their caller collects them, and
//! frames nobody asked for (notifications, stray or duplicate replies) are
//! logged and dropped. A reply is therefore consumed at most once.
//!
//! All methods take `&mut self`, so a session is driven by one flow of
//! control at a time and the outstanding/buffered tables need no lock.
//!
//! # Batches
//!
//! [`call_batch`](RpcSession::call_batch) follows the session's
//! [`BatchDiscipline`]: `Pipelined` writes every request before reading any
//! reply, `Serial` waits for each reply before the next write.
//!
//! # Teardown
//!
//! [`close`](RpcSession::close) consumes the session, closes the transport
//! and returns the [`ResponseLog`]. Because it takes `self`, it runs at most
//! once per connection.

use std::time::Instant;

use ahash::AHashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use drb_core::error::{DrbError, DrbResult};
use drb_core::time_util::now_ms;
use drb_core::types::{AuthMethod, BatchDiscipline, Credentials, SessionState};
use drb_core::ws::{Connector, Transport};

use super::auth::{AUTH_METHOD, auth_params};
use super::codec::{Params, RpcResponse, decode, encode, next_request_id};
use super::log::{LoggedResponse, ResponseLog};

/// Prefix of methods that require an authenticated connection.
const PRIVATE_PREFIX: &str = "private/";

/// Result of a successful `public/auth` call.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthResult {
    pub access_token: String,
    pub refresh_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
    pub scope: String,
    pub token_type: String,
}

impl std::fmt::Debug for AuthResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResult")
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// A request on the wire that has not been answered yet.
struct Outstanding {
    method: String,
    sent_at: Instant,
}

/// JSON-RPC session over one connection.
pub struct RpcSession<T: Transport> {
    transport: T,
    state: SessionState,
    discipline: BatchDiscipline,
    /// Credentials of the last successful authentication.
    credentials: Option<Credentials>,
    log: ResponseLog,
    /// id → request awaiting its reply.
    outstanding: AHashMap<String, Outstanding>,
    /// id → reply that arrived while another id was being awaited.
    buffered: AHashMap<String, RpcResponse>,
}

impl<T: Transport> RpcSession<T> {
    /// Wrap an already connected transport.
    pub fn new(transport: T, discipline: BatchDiscipline, log_capacity: Option<usize>) -> Self {
        Self {
            transport,
            state: SessionState::Connected,
            discipline,
            credentials: None,
            log: ResponseLog::new(log_capacity),
            outstanding: AHashMap::new(),
            buffered: AHashMap::new(),
        }
    }

    /// Open a fresh connection through `connector`.
    pub async fn open<C>(
        connector: &C,
        discipline: BatchDiscipline,
        log_capacity: Option<usize>,
    ) -> DrbResult<Self>
    where
        C: Connector<Conn = T>,
    {
        let transport = connector.connect().await?;
        Ok(Self::new(transport, discipline, log_capacity))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn discipline(&self) -> BatchDiscipline {
        self.discipline
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Every frame decoded so far.
    pub fn log(&self) -> &ResponseLog {
        &self.log
    }

    /// Requests sent whose replies have not been collected.
    pub fn pending_requests(&self) -> usize {
        self.outstanding.len() + self.buffered.len()
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Authenticate this connection.
    ///
    /// An error reply becomes [`DrbError::AuthenticationFailed`]; private
    /// methods stay blocked until this returns `Ok`.
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials,
        method: AuthMethod,
    ) -> DrbResult<AuthResult> {
        let params = auth_params(credentials, method);
        let reply = self.call_raw(AUTH_METHOD, Some(params)).await?;

        if let Some(err) = reply.error {
            warn!("[session] authentication rejected ({}): {}", err.code, err.message);
            return Err(DrbError::AuthenticationFailed {
                code: err.code,
                message: err.message,
            });
        }

        let result = reply.result.unwrap_or(Value::Null);
        if !result.is_object() {
            return Err(DrbError::MissingField("public/auth result".into()));
        }
        let auth: AuthResult = serde_json::from_value(result)
            .map_err(|e| DrbError::MalformedMessage(format!("public/auth result: {e}")))?;

        self.state = SessionState::Authenticated;
        self.credentials = Some(credentials.clone());
        info!(
            "[session] authenticated as {} via {} (expires in {}s, scope={})",
            credentials.client_id,
            method.grant_type(),
            auth.expires_in,
            auth.scope,
        );
        Ok(auth)
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Send one request and wait for its reply.
    ///
    /// An error reply becomes [`DrbError::Rpc`]; the session stays usable.
    pub async fn call(&mut self, method: &str, params: Option<Params>) -> DrbResult<RpcResponse> {
        self.call_raw(method, params).await?.into_result(method)
    }

    /// Like [`call`](Self::call) but returns error replies as values.
    pub async fn call_raw(
        &mut self,
        method: &str,
        params: Option<Params>,
    ) -> DrbResult<RpcResponse> {
        let id = self.send_request(method, params.as_ref()).await?;
        self.await_reply(&id).await
    }

    /// Submit several requests over this connection.
    ///
    /// The outer `Err` is a transport failure that aborted the batch. Inner
    /// results line up with `requests`; an inner `Err` is the reply-level
    /// error of that request.
    pub async fn call_batch(
        &mut self,
        requests: Vec<(String, Option<Params>)>,
    ) -> DrbResult<Vec<DrbResult<RpcResponse>>> {
        let mut results = Vec::with_capacity(requests.len());

        match self.discipline {
            BatchDiscipline::Serial => {
                for (method, params) in requests {
                    let reply = self.call_raw(&method, params).await?;
                    results.push(reply.into_result(&method));
                }
            }
            BatchDiscipline::Pipelined => {
                let mut sent = Vec::with_capacity(requests.len());
                for (method, params) in requests {
                    let id = self.send_request(&method, params.as_ref()).await?;
                    sent.push((method, id));
                }
                debug!("[session] pipelined {} request(s)", sent.len());
                for (method, id) in sent {
                    let reply = self.await_reply(&id).await?;
                    results.push(reply.into_result(&method));
                }
            }
        }

        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close the connection and hand back the response log.
    ///
    /// A failing close handshake is logged; the connection is gone either way.
    pub async fn close(mut self) -> ResponseLog {
        if !self.outstanding.is_empty() {
            warn!("[session] closing with {} unanswered request(s)", self.outstanding.len());
        }
        if let Err(e) = self.transport.close().await {
            warn!("[session] close: {e}");
        }
        self.state = SessionState::Closed;
        info!(
            "[session] closed: {} frame(s) received, {} error repl(ies)",
            self.log.total(),
            self.log.error_count(),
        );
        self.log
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Encode and write one request; returns its id.
    async fn send_request(&mut self, method: &str, params: Option<&Params>) -> DrbResult<String> {
        let private = method.starts_with(PRIVATE_PREFIX);
        if private && !self.state.is_authenticated() {
            return Err(DrbError::NotAuthenticated { method: method.to_string() });
        }

        let mut id = next_request_id();
        while self.outstanding.contains_key(&id) || self.buffered.contains_key(&id) {
            id = next_request_id();
        }

        debug!("[session] -> {method} [{id}]");
        self.transport.send(encode(&id, method, params)).await?;
        self.outstanding.insert(
            id.clone(),
            Outstanding {
                method: method.to_string(),
                sent_at: Instant::now(),
            },
        );

        if private && self.state == SessionState::Authenticated {
            self.state = SessionState::Active;
        }
        Ok(id)
    }

    /// Read frames until the reply for `id` arrives.
    async fn await_reply(&mut self, id: &str) -> DrbResult<RpcResponse> {
        if let Some(reply) = self.buffered.remove(id) {
            return Ok(reply);
        }

        loop {
            let frame = self.transport.receive().await?;
            let response =
                decode(&frame).inspect_err(|e| warn!("[session] undecodable frame: {e}"))?;

            let request = response.id.as_ref().and_then(|rid| self.outstanding.remove(rid));
            self.record(&response, request.as_ref());

            let Some(request) = request else {
                match (&response.id, &response.method) {
                    (Some(rid), _) => warn!("[session] dropping reply for unknown id {rid}"),
                    (None, Some(m)) => debug!("[session] notification {m}"),
                    (None, None) => {
                        warn!("[session] dropping uncorrelated error frame: {:?}", response.error)
                    }
                }
                continue;
            };

            let rid = response.id.clone().unwrap_or_default();
            if let Some(ref err) = response.error {
                warn!("[session] {} [{rid}] error ({}): {}", request.method, err.code, err.message);
            } else {
                let elapsed = request.sent_at.elapsed();
                debug!("[session] <- {} [{rid}] in {elapsed:?}", request.method);
            }

            if rid == id {
                return Ok(response);
            }
            self.buffered.insert(rid, response);
        }
    }

    fn record(&mut self, response: &RpcResponse, request: Option<&Outstanding>) {
        self.log.push(LoggedResponse {
            method: request.map(|r| r.method.clone()),
            received_at_ms: now_ms(),
            round_trip: request.map(|r| r.sent_at.elapsed()),
            response: response.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockExchange, MockTransport, Scripted};
    use serde_json::json;

    fn params(v: Value) -> Option<Params> {
        v.as_object().cloned()
    }

    fn creds() -> Credentials {
        Credentials::new("client", "secret")
    }

    fn rpc_error(code: i64, message: &str) -> Scripted {
        Scripted::Error { code, message: message.into() }
    }

    async fn session(
        exchange: &MockExchange,
        discipline: BatchDiscipline,
    ) -> RpcSession<MockTransport> {
        RpcSession::open(exchange, discipline, None).await.unwrap()
    }

    #[tokio::test]
    async fn private_calls_refused_before_auth() {
        let exchange = MockExchange::new();
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;

        let summary = params(json!({"currency": "BTC"}));
        let err = s.call("private/get_account_summary", summary).await.unwrap_err();
        assert!(matches!(err, DrbError::NotAuthenticated { .. }));
        assert!(exchange.methods().is_empty(), "nothing may reach the wire");

        s.authenticate(&creds(), AuthMethod::ClientCredentials).await.unwrap();
        assert_eq!(s.state(), SessionState::Authenticated);
        s.call("private/get_account_summary", params(json!({"currency": "BTC"}))).await.unwrap();
        assert_eq!(s.state(), SessionState::Active);

        assert_eq!(exchange.methods(), ["public/auth", "private/get_account_summary"]);
        s.close().await;
    }

    #[tokio::test]
    async fn auth_error_is_authentication_failed() {
        let exchange = MockExchange::new();
        exchange.script("public/auth", rpc_error(13004, "invalid_credentials"));
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;

        let err = s.authenticate(&creds(), AuthMethod::ClientCredentials).await.unwrap_err();
        assert_eq!(
            err,
            DrbError::AuthenticationFailed { code: 13004, message: "invalid_credentials".into() }
        );
        assert_eq!(s.state(), SessionState::Connected);
        let refused = s.call("private/buy", None).await;
        assert!(matches!(refused, Err(DrbError::NotAuthenticated { .. })));

        let log = s.close().await;
        assert_eq!(log.error_count(), 1);
    }

    #[tokio::test]
    async fn auth_sends_grant_and_records_credentials() {
        let exchange = MockExchange::new();
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;
        let auth = s.authenticate(&creds(), AuthMethod::ClientCredentials).await.unwrap();
        assert_eq!(auth.expires_in, 900);
        assert_eq!(s.credentials().unwrap().client_id, "client");

        let sent = exchange.requests("public/auth");
        assert_eq!(sent[0]["params"]["grant_type"], "client_credentials");
        assert_eq!(sent[0]["jsonrpc"], "2.0");
        assert!(!format!("{auth:?}").contains("token-abc"));
    }

    #[tokio::test]
    async fn rpc_error_does_not_end_session() {
        let exchange = MockExchange::new();
        exchange.script("public/get_order_book", rpc_error(10028, "too_many_requests"));
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;

        let err = s.call("public/get_order_book", None).await.unwrap_err();
        match err {
            DrbError::Rpc { method, code, .. } => {
                assert_eq!(method, "public/get_order_book");
                assert_eq!(code, 10028);
            }
            other => panic!("expected Rpc, got {other:?}"),
        }

        let ok = s.call("public/get_order_book", None).await.unwrap();
        assert!(ok.result.is_some());
        assert_eq!(s.log().total(), 2);
        assert_eq!(s.log().error_count(), 1);
    }

    #[tokio::test]
    async fn pipelined_batch_matches_out_of_order_replies() {
        let exchange = MockExchange::new();
        exchange.reverse_replies(true);
        exchange.script("private/sell", rpc_error(10009, "not_enough_funds"));
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;
        s.authenticate(&creds(), AuthMethod::ClientCredentials).await.unwrap();

        let batch = vec![
            ("private/buy".to_string(), params(json!({"price": 100.0}))),
            ("private/buy".to_string(), params(json!({"price": 99.0}))),
            ("private/sell".to_string(), params(json!({"price": 101.0}))),
        ];
        let results = s.call_batch(batch).await.unwrap();

        assert_eq!(results.len(), 3);
        let echoed: Vec<f64> = results[..2]
            .iter()
            .map(|r| r.as_ref().unwrap().result().unwrap()["order"]["price"].as_f64().unwrap())
            .collect();
        assert_eq!(echoed, [100.0, 99.0]);
        assert!(matches!(results[2], Err(DrbError::Rpc { code: 10009, .. })));
        assert_eq!(s.pending_requests(), 0);
    }

    #[tokio::test]
    async fn serial_batch_keeps_send_receive_lockstep() {
        let exchange = MockExchange::new();
        let mut s = session(&exchange, BatchDiscipline::Serial).await;
        assert_eq!(s.discipline(), BatchDiscipline::Serial);
        s.authenticate(&creds(), AuthMethod::ClientCredentials).await.unwrap();

        let batch = (0..3)
            .map(|i| ("private/buy".to_string(), params(json!({"price": 100.0 - i as f64}))))
            .collect();
        let results = s.call_batch(batch).await.unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(exchange.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn stray_frames_and_notifications_are_logged_and_skipped() {
        let exchange = MockExchange::new();
        exchange.inject(r#"{"jsonrpc":"2.0","method":"heartbeat","params":{"type":"heartbeat"}}"#);
        exchange.inject(r#"{"jsonrpc":"2.0","id":"not-ours","result":true}"#);
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;

        let reply = s.call("public/get_order_book", None).await.unwrap();
        assert_eq!(reply.id.as_deref(), exchange.last_request_id().as_deref());
        assert_eq!(s.log().total(), 3);
        assert_eq!(s.log().for_method("public/get_order_book").count(), 1);
    }

    #[tokio::test]
    async fn connection_closed_surfaces_to_caller() {
        let exchange = MockExchange::new();
        exchange.script("public/get_order_book", Scripted::Close);
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;

        let err = s.call("public/get_order_book", None).await.unwrap_err();
        assert!(matches!(err, DrbError::ConnectionClosed(_)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn receive_timeout_surfaces_and_leaves_request_pending() {
        let exchange = MockExchange::new();
        exchange.script("public/get_order_book", Scripted::Silent);
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;
        assert_eq!(s.discipline(), BatchDiscipline::Pipelined);

        let err = s.call("public/get_order_book", None).await.unwrap_err();
        assert!(matches!(err, DrbError::Timeout(_)));
        assert!(err.is_transport());
        assert_eq!(s.pending_requests(), 1);
        assert!(s.log().is_empty());

        s.close().await;
        assert_eq!(exchange.close_calls(), 1);
    }

    #[tokio::test]
    async fn malformed_frame_is_protocol_violation() {
        let exchange = MockExchange::new();
        exchange.script("public/get_order_book", Scripted::Malformed);
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;
        let err = s.call("public/get_order_book", None).await.unwrap_err();
        assert!(matches!(err, DrbError::MalformedMessage(_)));
    }

    #[tokio::test]
    async fn close_runs_once_and_returns_log() {
        let exchange = MockExchange::new();
        let mut s = session(&exchange, BatchDiscipline::Pipelined).await;
        s.authenticate(&creds(), AuthMethod::ClientCredentials).await.unwrap();
        let log = s.close().await;
        assert_eq!(log.total(), 1);
        assert_eq!(exchange.connects(), 1);
        assert_eq!(exchange.close_calls(), 1);
    }
}
