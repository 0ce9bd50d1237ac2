//! WebSocket transport: one duplex text stream per connection.

pub mod client;

use async_trait::async_trait;

use crate::error::DrbResult;

pub use client::{WsConnConfig, WsConnector, WsTransport};

/// One open, exclusively owned duplex connection.
///
/// Implementations suspend in [`receive`](Transport::receive) until a frame
/// arrives; they never poll.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send(&mut self, frame: String) -> DrbResult<()>;

    /// Wait for the next text frame.
    async fn receive(&mut self) -> DrbResult<String>;

    /// Close the connection. Calling it again is a no-op.
    async fn close(&mut self) -> DrbResult<()>;
}

/// Opens fresh connections to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Transport;

    /// Endpoint label used in logs and events.
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> DrbResult<Self::Conn>;
}
