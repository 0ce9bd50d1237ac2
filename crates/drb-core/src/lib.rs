//! # drb-core
//!
//! Core crate for the Deribit session bot, providing:
//!
//! - **Types** (`types`): sides, order intents, price levels, credentials, state enums
//! - **Configuration** (`config`): JSON config deserialization with defaults
//! - **Error types** (`error`): the `DrbError` taxonomy via thiserror
//! - **WebSocket** (`ws`): `Transport`/`Connector` traits and the tungstenite transport
//! - **JSON utilities** (`json_util`): lenient numeric field parsing
//! - **Time utilities** (`time_util`): timestamps and interruptible sleeps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod error;
pub mod json_util;
pub mod logging;
pub mod time_util;
pub mod types;
pub mod ws;

pub use error::{DrbError, DrbResult};
// Re-export types at crate root for convenience.
pub use types::*;
