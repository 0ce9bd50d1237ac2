//! Configuration parsing for the Deribit session bot.
//!
//! Settings come from a single JSON file. Every field has a default, so an
//! empty object `{}` is a valid config that trades `BTC-PERPETUAL` on the
//! Deribit testnet (credentials then come from the environment).
//!
//! # Example config
//!
//! ```json
//! {
//!   "logging": { "module_name": "drb", "log_path": "/tmp/log" },
//!   "credentials": {
//!     "client_id": "...", "client_secret": "...", "auth_method": "client_signature"
//!   },
//!   "session": { "url": "wss://test.deribit.com/ws/api/v2", "recv_timeout_ms": 10000 },
//!   "cycle": {
//!     "instrument": "BTC-PERPETUAL", "depth": 10, "currency": "BTC", "order_amount": 10
//!   },
//!   "trading_loop": { "mode": "reconnect_per_cycle", "max_cycles": 3 }
//! }
//! ```

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::error::DrbError;
use crate::types::{AuthMethod, BatchDiscipline, ConnectionMode, Credentials};

/// Environment variable overriding `credentials.client_id`.
pub const ENV_CLIENT_ID: &str = "DERIBIT_CLIENT_ID";
/// Environment variable overriding `credentials.client_secret`.
pub const ENV_CLIENT_SECRET: &str = "DERIBIT_CLIENT_SECRET";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log file metadata.
    pub logging: LoggingConfig,
    /// API credentials (may be left empty and supplied via env vars).
    pub credentials: CredentialsConfig,
    /// Connection and RPC settings.
    pub session: SessionConfig,
    /// Per-cycle trading parameters.
    pub cycle: CycleConfig,
    /// Cycle repetition and reconnect policy.
    pub trading_loop: LoopConfig,
}

/// Log file metadata block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Credentials block.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub auth_method: AuthMethod,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

impl CredentialsConfig {
    /// Resolve credentials, preferring the environment over the file.
    pub fn resolve(&self) -> Result<Credentials, DrbError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve credentials using `lookup` for the environment.
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials, DrbError> {
        let client_id = lookup(ENV_CLIENT_ID)
            .or_else(|| self.client_id.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DrbError::Config(format!("client_id missing (set {ENV_CLIENT_ID})")))?;
        let client_secret = lookup(ENV_CLIENT_SECRET)
            .or_else(|| self.client_secret.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                DrbError::Config(format!("client_secret missing (set {ENV_CLIENT_SECRET})"))
            })?;
        Ok(Credentials { client_id, client_secret })
    }
}

/// Connection and RPC settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket endpoint.
    pub url: String,
    /// Receive deadline per frame in milliseconds (0 disables the deadline).
    pub recv_timeout_ms: u64,
    /// How order batches are put on the wire.
    pub batch: BatchDiscipline,
    /// Most recent replies kept in the response log (0 keeps everything).
    pub response_log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            recv_timeout_ms: 10_000,
            batch: BatchDiscipline::default(),
            response_log_capacity: 10_000,
        }
    }
}

impl SessionConfig {
    pub fn recv_timeout(&self) -> Option<Duration> {
        (self.recv_timeout_ms > 0).then(|| Duration::from_millis(self.recv_timeout_ms))
    }

    pub fn log_capacity(&self) -> Option<usize> {
        (self.response_log_capacity > 0).then_some(self.response_log_capacity)
    }
}

/// Per-cycle trading parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Instrument to quote and trade.
    pub instrument: String,
    /// Order-book depth requested per side.
    pub depth: u32,
    /// Settlement currency for the account summary.
    pub currency: String,
    /// Fixed amount for every order, independent of book depth.
    pub order_amount: f64,
    /// Dwell between submission and the balance check, in milliseconds.
    pub dwell_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            instrument: "BTC-PERPETUAL".into(),
            depth: 10,
            currency: "BTC".into(),
            order_amount: 10.0,
            dwell_ms: 10_000,
        }
    }
}

impl CycleConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// Cycle repetition and reconnect policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Connection discipline across cycles.
    pub mode: ConnectionMode,
    /// Delay between cycles in milliseconds.
    pub cycle_delay_ms: u64,
    /// Stop after this many cycles, completed or aborted (`None` = run until cancelled).
    pub max_cycles: Option<u64>,
    /// Consecutive transport failures tolerated before giving up.
    pub retry_budget: u32,
    /// Initial reconnect backoff in milliseconds (doubles per failure).
    pub reconnect_backoff_ms: u64,
    /// Upper bound for the reconnect backoff in milliseconds.
    pub max_reconnect_backoff_ms: u64,
    /// Cancel resting orders and flatten the position before closing on shutdown.
    pub flatten_on_shutdown: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::default(),
            cycle_delay_ms: 10_000,
            max_cycles: None,
            retry_budget: 5,
            reconnect_backoff_ms: 100,
            max_reconnect_backoff_ms: 30_000,
            flatten_on_shutdown: true,
        }
    }
}

impl LoopConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }

    /// Backoff before reconnect attempt number `failures` (1-based).
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let ms = self.reconnect_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_reconnect_backoff_ms))
    }
}

impl AppConfig {
    /// Reject settings the trading layer cannot act on.
    pub fn validate(&self) -> Result<(), DrbError> {
        url::Url::parse(&self.session.url)
            .map_err(|e| DrbError::Config(format!("invalid url {:?}: {e}", self.session.url)))?;
        if self.cycle.instrument.is_empty() {
            return Err(DrbError::Config("instrument must not be empty".into()));
        }
        if self.cycle.currency.is_empty() {
            return Err(DrbError::Config("currency must not be empty".into()));
        }
        if self.cycle.depth == 0 {
            return Err(DrbError::Config("depth must be at least 1".into()));
        }
        if !(self.cycle.order_amount.is_finite() && self.cycle.order_amount > 0.0) {
            return Err(DrbError::Config(format!(
                "order_amount must be positive, got {}",
                self.cycle.order_amount
            )));
        }
        Ok(())
    }
}

fn default_url() -> String {
    "wss://test.deribit.com/ws/api/v2".into()
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: AppConfig =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
