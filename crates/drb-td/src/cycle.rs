//! One quote → submit → hold → check → cancel → flatten pass.
//!
//! ```text
//! Idle → Quoting → Submitting → HoldingOpen → BalanceCheck → Cancelling → Closing → Idle
//! ```
//!
//! Reply-level failures ([`DrbError::Rpc`], [`DrbError::MissingField`]) are
//! reported as [`TdEvent::StepFailed`] and the cycle moves on: a failed
//! balance query must not keep orders resting. Anything else (transport
//! failure, malformed frame, cancellation) stops the cycle where it is and is
//! returned to the caller; [`OrderCycle::stage`] then names the stage that
//! failed. A rejected position close is not a failure at all: being flat is
//! the usual reason.

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use drb_core::config::CycleConfig;
use drb_core::error::{DrbError, DrbResult};
use drb_core::json_util::parse_f64_field;
use drb_core::time_util::sleep_or_shutdown;
use drb_core::types::{CycleStage, OrderIntent, Side};
use drb_core::ws::Transport;

use crate::event::{TdEvent, TdEventSender};
use crate::market::{ORDER_BOOK_METHOD, OrderBookSnapshot, order_book_params};
use crate::rpc::{Params, RpcSession};

pub const ACCOUNT_SUMMARY_METHOD: &str = "private/get_account_summary";
pub const CANCEL_ALL_METHOD: &str = "private/cancel_all_by_instrument";
pub const CLOSE_POSITION_METHOD: &str = "private/close_position";

/// What one cycle achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub orders_submitted: usize,
    pub orders_accepted: usize,
    pub orders_rejected: usize,
    pub balance: Option<f64>,
    /// Orders the exchange reported as cancelled.
    pub cancelled: Option<u64>,
    pub position_closed: bool,
    /// Stages that failed at the reply level, in order.
    pub failed_steps: Vec<CycleStage>,
}

/// A BUY per bid level and a SELL per ask level, bids first, book order kept.
pub fn build_intents(
    instrument: &str,
    amount: f64,
    snapshot: &OrderBookSnapshot,
) -> Vec<OrderIntent> {
    let limit = |side, level| OrderIntent::limit(side, instrument, level, amount);
    let bids = snapshot.bids.iter().map(|level| limit(Side::Buy, level));
    let asks = snapshot.asks.iter().map(|level| limit(Side::Sell, level));
    bids.chain(asks).collect()
}

/// The order-cycle state machine.
pub struct OrderCycle {
    config: CycleConfig,
    events: TdEventSender,
    stage: CycleStage,
}

impl OrderCycle {
    pub fn new(config: CycleConfig, events: TdEventSender) -> Self {
        Self {
            config,
            events,
            stage: CycleStage::Idle,
        }
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Current stage; after a failed [`run`](Self::run), the stage that failed.
    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    /// Run one full cycle on an authenticated session.
    ///
    /// Returns `Err` only for failures that stop the cycle early.
    pub async fn run<T: Transport>(
        &mut self,
        session: &mut RpcSession<T>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> DrbResult<CycleReport> {
        let mut report = CycleReport::default();
        self.stage = CycleStage::Idle;

        // -- Quoting --
        self.enter(CycleStage::Quoting);
        let snapshot = match self.quote(session).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                self.recover(e, ORDER_BOOK_METHOD, &mut report)?;
                None
            }
        };

        // -- Submitting --
        self.enter(CycleStage::Submitting);
        let intents = snapshot
            .map(|s| build_intents(&self.config.instrument, self.config.order_amount, &s))
            .unwrap_or_default();
        self.submit(session, &intents, &mut report).await?;

        // -- HoldingOpen --
        self.enter(CycleStage::HoldingOpen);
        debug!(
            "[cycle] holding {} order(s) for {:?}",
            report.orders_accepted,
            self.config.dwell(),
        );
        if !sleep_or_shutdown(self.config.dwell(), shutdown).await {
            return Err(DrbError::Cancelled);
        }

        // -- BalanceCheck --
        self.enter(CycleStage::BalanceCheck);
        match self.balance(session).await {
            Ok(balance) => report.balance = Some(balance),
            Err(e) => self.recover(e, ACCOUNT_SUMMARY_METHOD, &mut report)?,
        }

        // -- Cancelling / Closing --
        self.unwind(session, &mut report).await?;

        self.enter(CycleStage::Idle);
        info!(
            "[cycle] done: {}/{} order(s) accepted, balance={:?}, cancelled={:?}",
            report.orders_accepted, report.orders_submitted, report.balance, report.cancelled,
        );
        Ok(report)
    }

    /// Cancel every resting order on the instrument and close the position.
    ///
    /// The explicit teardown for orderly shutdown. Reply-level failures are
    /// reported; only transport failures return `Err`.
    pub async fn flatten<T: Transport>(
        &mut self,
        session: &mut RpcSession<T>,
    ) -> DrbResult<CycleReport> {
        let mut report = CycleReport::default();
        info!("[cycle] flattening {}", self.config.instrument);
        self.unwind(session, &mut report).await?;
        self.enter(CycleStage::Idle);
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    async fn quote<T: Transport>(
        &self,
        session: &mut RpcSession<T>,
    ) -> DrbResult<OrderBookSnapshot> {
        let params = order_book_params(&self.config.instrument, self.config.depth);
        let reply = session.call(ORDER_BOOK_METHOD, Some(params)).await?;
        let snapshot = OrderBookSnapshot::from_response(&reply)?;

        self.emit(TdEvent::OrderBook {
            instrument: self.config.instrument.clone(),
            bids: snapshot.bids.len(),
            asks: snapshot.asks.len(),
            best_bid: snapshot.best_bid(),
            best_ask: snapshot.best_ask(),
        });
        Ok(snapshot)
    }

    async fn submit<T: Transport>(
        &self,
        session: &mut RpcSession<T>,
        intents: &[OrderIntent],
        report: &mut CycleReport,
    ) -> DrbResult<()> {
        if intents.is_empty() {
            debug!("[cycle] nothing to submit");
            return Ok(());
        }

        let batch = intents
            .iter()
            .map(|i| (i.method().to_string(), Some(i.params())))
            .collect();
        let results = session.call_batch(batch).await?;
        report.orders_submitted = intents.len();

        for (intent, result) in intents.iter().zip(results) {
            match result {
                Ok(_) => report.orders_accepted += 1,
                Err(DrbError::Rpc { code, message, .. }) => {
                    report.orders_rejected += 1;
                    warn!(
                        "[cycle] {} @ {} rejected ({code}): {message}",
                        intent.side, intent.price,
                    );
                    self.emit(TdEvent::OrderRejected {
                        side: intent.side,
                        price: intent.price,
                        code,
                        message,
                    });
                }
                Err(other) => return Err(other),
            }
        }
        if report.orders_rejected > 0 {
            report.failed_steps.push(CycleStage::Submitting);
        }
        Ok(())
    }

    async fn balance<T: Transport>(&self, session: &mut RpcSession<T>) -> DrbResult<f64> {
        let params = self.currency_params();
        let reply = session.call(ACCOUNT_SUMMARY_METHOD, Some(params)).await?;
        let balance = parse_f64_field(reply.result()?, "balance")
            .ok_or_else(|| DrbError::MissingField("result.balance".into()))?;

        info!("[cycle] {} balance: {balance}", self.config.currency);
        self.emit(TdEvent::Balance {
            currency: self.config.currency.clone(),
            balance,
        });
        Ok(balance)
    }

    /// Cancelling then Closing; shared by [`run`](Self::run) and [`flatten`](Self::flatten).
    ///
    /// Closing is best-effort: a rejected close (typically "no position")
    /// leaves `position_closed` false and is not a failed step.
    async fn unwind<T: Transport>(
        &mut self,
        session: &mut RpcSession<T>,
        report: &mut CycleReport,
    ) -> DrbResult<()> {
        self.enter(CycleStage::Cancelling);
        match session.call(CANCEL_ALL_METHOD, Some(self.instrument_params())).await {
            Ok(reply) => {
                let count = reply.result.as_ref().and_then(|r| r.as_u64());
                report.cancelled = count;
                self.emit(TdEvent::OrdersCancelled {
                    instrument: self.config.instrument.clone(),
                    count,
                });
            }
            Err(e) => self.recover(e, CANCEL_ALL_METHOD, report)?,
        }

        self.enter(CycleStage::Closing);
        let mut params = self.instrument_params();
        params.insert("type".into(), json!("market"));
        match session.call(CLOSE_POSITION_METHOD, Some(params)).await {
            Ok(_) => {
                report.position_closed = true;
                self.emit(TdEvent::PositionClosed {
                    instrument: self.config.instrument.clone(),
                });
            }
            Err(DrbError::Rpc { code, message, .. }) => {
                report.position_closed = false;
                info!("[cycle] {} not closed ({code}): {message}", self.config.instrument);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn enter(&mut self, stage: CycleStage) {
        debug!("[cycle] {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Report a reply-level failure and continue, or hand anything else back.
    fn recover(&self, err: DrbError, method: &str, report: &mut CycleReport) -> DrbResult<()> {
        if !err.is_recoverable() {
            return Err(err);
        }
        warn!("[cycle] {} step failed: {err}", self.stage);
        report.failed_steps.push(self.stage);
        self.emit(TdEvent::StepFailed {
            stage: self.stage,
            method: method.to_string(),
            message: err.to_string(),
        });
        Ok(())
    }

    fn emit(&self, event: TdEvent) {
        let _ = self.events.send(event);
    }

    fn instrument_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("instrument_name".into(), json!(self.config.instrument));
        params
    }

    fn currency_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("currency".into(), json!(self.config.currency));
        params
    }
}
