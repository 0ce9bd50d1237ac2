//! Event types emitted by the trading layer to downstream consumers.
//!
//! The core never prints. Balance figures, rejected orders, failed steps and
//! connection lifecycle changes leave as [`TdEvent`] values over an unbounded
//! channel; the runner decides how to render them.

use drb_core::types::{CycleStage, Side};

use crate::cycle::CycleReport;

/// A typed event emitted while sessions and cycles run.
#[derive(Debug, Clone)]
pub enum TdEvent {
    /// A connection was opened.
    Connected {
        endpoint: String,
    },

    /// `public/auth` succeeded on the current connection.
    Authenticated {
        client_id: String,
    },

    /// The current connection was closed.
    Disconnected {
        /// Frames recorded over the session's lifetime.
        frames: u64,
        /// Error replies recorded over the session's lifetime.
        errors: u64,
    },

    /// A fresh order-book snapshot was read.
    OrderBook {
        instrument: String,
        bids: usize,
        asks: usize,
        best_bid: Option<f64>,
        best_ask: Option<f64>,
    },

    /// The exchange rejected one order of a batch.
    OrderRejected {
        side: Side,
        price: f64,
        code: i64,
        message: String,
    },

    /// Account balance from the account summary.
    Balance {
        currency: String,
        balance: f64,
    },

    /// Resting orders cancelled by instrument.
    OrdersCancelled {
        instrument: String,
        count: Option<u64>,
    },

    /// The position close request was accepted.
    PositionClosed {
        instrument: String,
    },

    /// A step failed at the reply level; the cycle carried on.
    StepFailed {
        stage: CycleStage,
        method: String,
        message: String,
    },

    /// A cycle ran to completion.
    CycleCompleted {
        cycle: u64,
        report: CycleReport,
    },

    /// A cycle stopped early (transport failure or cancellation).
    CycleAborted {
        cycle: u64,
        stage: CycleStage,
        reason: String,
    },
}

/// Sender half of the TD event channel.
pub type TdEventSender = tokio::sync::mpsc::UnboundedSender<TdEvent>;

/// Receiver half of the TD event channel.
pub type TdEventReceiver = tokio::sync::mpsc::UnboundedReceiver<TdEvent>;

/// Create a connected sender/receiver pair.
pub fn channel() -> (TdEventSender, TdEventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
