//! Single WebSocket connection over tokio-tungstenite.
//!
//! [`WsTransport`] wraps one TLS WebSocket stream and exposes it as a plain
//! send/receive pair. There is no background task: the session that owns the
//! transport drives reads itself, so reply ordering stays under its control.
//! Control frames are handled inline (pings answered, close frames surfaced
//! as [`DrbError::ConnectionClosed`]).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Connector, Transport};
use crate::error::{DrbError, DrbResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for WebSocket connections.
#[derive(Debug, Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://test.deribit.com/ws/api/v2`).
    pub url: String,
    /// Deadline for each [`receive`](Transport::receive); `None` waits forever.
    pub recv_timeout: Option<Duration>,
}

/// A single open WebSocket connection.
pub struct WsTransport {
    stream: WsStream,
    recv_timeout: Option<Duration>,
    host: String,
    closed: bool,
}

impl WsTransport {
    /// Open a connection to `config.url`.
    pub async fn connect(config: &WsConnConfig) -> DrbResult<Self> {
        let host = extract_host(&config.url)?;
        info!("[ws] connecting to {}", config.url);

        let (stream, _response) = tokio_tungstenite::connect_async(config.url.as_str())
            .await
            .map_err(|e| DrbError::Connection(format!("{host}: {e}")))?;

        info!("[ws] connected to {host}");
        Ok(Self {
            stream,
            recv_timeout: config.recv_timeout,
            host,
            closed: false,
        })
    }

    async fn next_frame(
        &mut self,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
        self.stream.next().await
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> DrbResult<()> {
        if self.closed {
            return Err(DrbError::Connection(format!("{}: send on closed connection", self.host)));
        }
        self.stream.send(Message::Text(frame.into())).await.map_err(|e| {
            self.closed = true;
            DrbError::Connection(format!("{}: send failed: {e}", self.host))
        })
    }

    async fn receive(&mut self) -> DrbResult<String> {
        if self.closed {
            let reason = format!("{}: connection already closed", self.host);
            return Err(DrbError::ConnectionClosed(reason));
        }

        loop {
            let frame = match self.recv_timeout {
                Some(limit) => tokio::time::timeout(limit, self.next_frame())
                    .await
                    .map_err(|_| DrbError::Timeout(limit))?,
                None => self.next_frame().await,
            };

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec()).map_err(|e| {
                        DrbError::MalformedMessage(format!("binary frame is not UTF-8: {e}"))
                    });
                }
                Some(Ok(Message::Ping(data))) => {
                    debug!("[ws] ping from {}", self.host);
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        self.closed = true;
                        let reason = format!("{}: pong failed: {e}", self.host);
                        return Err(DrbError::ConnectionClosed(reason));
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    warn!("[ws] {} sent close frame: {reason:?}", self.host);
                    self.closed = true;
                    return Err(DrbError::ConnectionClosed(format!("{}: close frame", self.host)));
                }
                Some(Err(e)) => {
                    warn!("[ws] {} read error: {e}", self.host);
                    self.closed = true;
                    return Err(DrbError::ConnectionClosed(format!("{}: {e}", self.host)));
                }
                None => {
                    warn!("[ws] {} stream ended", self.host);
                    self.closed = true;
                    return Err(DrbError::ConnectionClosed(format!("{}: stream ended", self.host)));
                }
                _ => {} // Pong, Frame
            }
        }
    }

    async fn close(&mut self) -> DrbResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("[ws] closing connection to {}", self.host);
        self.stream
            .close(None)
            .await
            .map_err(|e| DrbError::Connection(format!("{}: close failed: {e}", self.host)))
    }
}

/// Opens a fresh [`WsTransport`] per call.
#[derive(Debug, Clone)]
pub struct WsConnector {
    config: WsConnConfig,
}

impl WsConnector {
    pub fn new(config: WsConnConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Conn = WsTransport;

    fn endpoint(&self) -> &str {
        &self.config.url
    }

    async fn connect(&self) -> DrbResult<WsTransport> {
        WsTransport::connect(&self.config).await
    }
}

/// Extract the host from a URL string.
fn extract_host(url: &str) -> DrbResult<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| DrbError::Connection(format!("invalid url {url:?}: {e}")))?;
    match parsed.host_str() {
        Some(host) => Ok(host.to_string()),
        None => Err(DrbError::Connection(format!("url {url:?} has no host"))),
    }
}
