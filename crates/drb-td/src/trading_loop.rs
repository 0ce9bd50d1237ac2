//! Repeats [`OrderCycle`]s over one or many sessions.
//!
//! The loop owns the connection lifecycle: it opens and authenticates
//! sessions, runs cycles on them, reconnects with exponential backoff after
//! transport failures and closes every session it opened exactly once,
//! whichever way the loop ends.

use tokio::sync::watch;
use tracing::{error, info, warn};

use drb_core::config::{AppConfig, LoopConfig};
use drb_core::error::{DrbError, DrbResult};
use drb_core::time_util::{shutdown_requested, sleep_or_shutdown};
use drb_core::types::{AuthMethod, BatchDiscipline, ConnectionMode, Credentials};
use drb_core::ws::Connector;

use crate::cycle::OrderCycle;
use crate::event::{TdEvent, TdEventSender};
use crate::rpc::RpcSession;

/// Totals for one [`TradingLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles_completed: u64,
    /// Cycles aborted by a transport failure.
    pub cycles_failed: u64,
    pub connections_opened: u64,
}

pub struct TradingLoop<C: Connector> {
    connector: C,
    credentials: Credentials,
    auth_method: AuthMethod,
    discipline: BatchDiscipline,
    log_capacity: Option<usize>,
    config: LoopConfig,
    cycle: OrderCycle,
    events: TdEventSender,
    shutdown: watch::Receiver<bool>,
}

impl<C: Connector> TradingLoop<C> {
    pub fn new(
        connector: C,
        credentials: Credentials,
        config: &AppConfig,
        events: TdEventSender,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            connector,
            credentials,
            auth_method: config.credentials.auth_method,
            discipline: config.session.batch,
            log_capacity: config.session.log_capacity(),
            config: config.trading_loop.clone(),
            cycle: OrderCycle::new(config.cycle.clone(), events.clone()),
            events,
            shutdown,
        }
    }

    /// Run until `max_cycles` is reached, shutdown is requested, or the
    /// retry budget is exhausted.
    ///
    /// `AuthenticationFailed` ends the loop immediately. Shutdown is not an
    /// error.
    pub async fn run(&mut self) -> DrbResult<LoopSummary> {
        let mut summary = LoopSummary::default();
        let mut live: Option<RpcSession<C::Conn>> = None;
        let mut failures: u32 = 0;
        let mut started: u64 = 0;

        info!(
            "[loop] starting against {} ({:?}, {:?} batches)",
            self.connector.endpoint(),
            self.config.mode,
            self.discipline,
        );

        let outcome: DrbResult<()> = loop {
            if shutdown_requested(&self.shutdown) {
                break Ok(());
            }
            if self.config.max_cycles.is_some_and(|max| started >= max) {
                break Ok(());
            }

            let mut session = match live.take() {
                Some(session) => session,
                None => match self.connect(&mut summary).await {
                    Ok(session) => session,
                    Err(e @ DrbError::AuthenticationFailed { .. }) => {
                        error!("[loop] {e}");
                        break Err(e);
                    }
                    Err(e) => {
                        failures += 1;
                        if let Some(stop) = self.retry(failures, e).await {
                            break stop;
                        }
                        continue;
                    }
                },
            };

            started += 1;
            match self.cycle.run(&mut session, &mut self.shutdown).await {
                Ok(report) => {
                    summary.cycles_completed += 1;
                    failures = 0;
                    let _ = self.events.send(TdEvent::CycleCompleted { cycle: started, report });

                    match self.config.mode {
                        ConnectionMode::Persistent => live = Some(session),
                        ConnectionMode::ReconnectPerCycle => self.close_session(session).await,
                    }
                }
                Err(DrbError::Cancelled) => {
                    info!("[loop] cycle {started} cancelled during {}", self.cycle.stage());
                    let _ = self.events.send(TdEvent::CycleAborted {
                        cycle: started,
                        stage: self.cycle.stage(),
                        reason: DrbError::Cancelled.to_string(),
                    });
                    live = Some(session);
                    break Ok(());
                }
                Err(e) => {
                    summary.cycles_failed += 1;
                    warn!("[loop] cycle {started} aborted during {}: {e}", self.cycle.stage());
                    let _ = self.events.send(TdEvent::CycleAborted {
                        cycle: started,
                        stage: self.cycle.stage(),
                        reason: e.to_string(),
                    });
                    self.close_session(session).await;

                    failures += 1;
                    if let Some(stop) = self.retry(failures, e).await {
                        break stop;
                    }
                    continue;
                }
            }

            if self.config.max_cycles.is_some_and(|max| started >= max) {
                break Ok(());
            }
            if !sleep_or_shutdown(self.config.cycle_delay(), &mut self.shutdown).await {
                break Ok(());
            }
        };

        if let Some(mut session) = live.take() {
            if self.config.flatten_on_shutdown && shutdown_requested(&self.shutdown) {
                if let Err(e) = self.cycle.flatten(&mut session).await {
                    warn!("[loop] flatten on shutdown failed: {e}");
                }
            }
            self.close_session(session).await;
        }

        info!(
            "[loop] stopped: {} completed, {} failed, {} connection(s)",
            summary.cycles_completed, summary.cycles_failed, summary.connections_opened,
        );
        outcome.map(|()| summary)
    }

    /// Open and authenticate a fresh session. A session that fails to
    /// authenticate is closed before returning.
    async fn connect(&self, summary: &mut LoopSummary) -> DrbResult<RpcSession<C::Conn>> {
        let mut session =
            RpcSession::open(&self.connector, self.discipline, self.log_capacity).await?;
        summary.connections_opened += 1;
        let _ = self.events.send(TdEvent::Connected {
            endpoint: self.connector.endpoint().to_string(),
        });

        match session.authenticate(&self.credentials, self.auth_method).await {
            Ok(_) => {
                let _ = self.events.send(TdEvent::Authenticated {
                    client_id: self.credentials.client_id.clone(),
                });
                Ok(session)
            }
            Err(e) => {
                self.close_session(session).await;
                Err(e)
            }
        }
    }

    async fn close_session(&self, session: RpcSession<C::Conn>) {
        let log = session.close().await;
        let _ = self.events.send(TdEvent::Disconnected {
            frames: log.total(),
            errors: log.error_count(),
        });
    }

    /// Back off after the `failures`-th consecutive failure.
    ///
    /// Returns the loop's outcome when it should stop: the error once the
    /// budget is spent, `Ok` when shutdown interrupts the backoff.
    async fn retry(&mut self, failures: u32, err: DrbError) -> Option<DrbResult<()>> {
        if failures > self.config.retry_budget {
            error!("[loop] giving up after {failures} consecutive failure(s): {err}");
            return Some(Err(err));
        }
        let delay = self.config.backoff(failures);
        warn!("[loop] {err}; reconnecting in {delay:?} ({failures}/{})", self.config.retry_budget);
        if sleep_or_shutdown(delay, &mut self.shutdown).await {
            None
        } else {
            Some(Ok(()))
        }
    }
}
