//! Typed error definitions for the Deribit session bot.
//!
//! [`DrbError`] separates transport-level failures (which abort the current
//! order cycle and may trigger a reconnect) from reply-level failures (which
//! are reported and let the cycle move on). All variants implement
//! `std::error::Error` via `thiserror`, so they convert into `anyhow::Error`
//! at the binary boundary.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias used across the session and trading layers.
pub type DrbResult<T> = std::result::Result<T, DrbError>;

/// Domain-specific errors for the Deribit session bot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DrbError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// Connect or send failure. Fatal to the current connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The peer closed the connection mid-session.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// No frame arrived before the configured receive deadline.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    /// A frame could not be decoded as a JSON-RPC reply or notification.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The `public/auth` reply carried an error object.
    #[error("authentication failed ({code}): {message}")]
    AuthenticationFailed { code: i64, message: String },

    /// A `private/*` method was attempted before authentication succeeded.
    #[error("{method} requires an authenticated session")]
    NotAuthenticated { method: String },

    /// Any other reply carrying an error object.
    #[error("{method} [{id}] failed ({code}): {message}")]
    Rpc {
        method: String,
        id: String,
        code: i64,
        message: String,
    },

    /// A successful reply whose result lacks an expected field.
    #[error("missing field: {0}")]
    MissingField(String),

    /// The cancellation signal fired while work was in progress.
    #[error("cancelled")]
    Cancelled,
}

impl DrbError {
    /// Returns `true` for failures that leave the connection unusable or the
    /// request/reply pairing in doubt. These abort the current order cycle.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::ConnectionClosed(_)
                | Self::Timeout(_)
                | Self::MalformedMessage(_)
        )
    }

    /// Returns `true` for reply-level failures a cycle may step past.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Rpc { .. } | Self::MissingField(_))
    }
}
