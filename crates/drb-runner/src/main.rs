//! # drb-runner
//!
//! Entry point for the Deribit order-cycle bot.
//!
//! Loads a JSON configuration file, resolves credentials, and runs the
//! trading loop until the cycle limit is reached or Ctrl+C is pressed.
//! With `--snapshot` it prints one order-book snapshot and exits.
//!
//! # Usage
//!
//! ```bash
//! drb-runner config.json --log-level info --cycles 3
//! drb-runner config.json --snapshot
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use drb_core::ws::{WsConnConfig, WsConnector};
use drb_td::{TdEvent, TdEventReceiver, TradingLoop};

/// Deribit order-cycle runner.
#[derive(Parser)]
#[command(name = "drb-runner", about = "Deribit JSON-RPC order-cycle runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Stop after this many cycles (overrides `trading_loop.max_cycles`).
    #[arg(long)]
    cycles: Option<u64>,

    /// Print one order-book snapshot and exit.
    #[arg(long)]
    snapshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = drb_core::config::load_config(&cli.config)?;
    if let Some(cycles) = cli.cycles {
        config.trading_loop.max_cycles = Some(cycles);
    }

    // 2. Initialize logging
    let log_dir = cli.log_dir.as_deref().or(config.logging.log_path.as_deref());
    let prefix = config.logging.module_name.as_deref().unwrap_or("drb-runner");
    drb_core::logging::init_logging(&cli.log_level, log_dir, prefix)?;

    info!("drb-runner starting: config={}, log_level={}", cli.config.display(), cli.log_level);

    let connector = WsConnector::new(WsConnConfig {
        url: config.session.url.clone(),
        recv_timeout: config.session.recv_timeout(),
    });

    // 3. One-shot snapshot mode
    if cli.snapshot {
        let (instrument, depth) = (&config.cycle.instrument, config.cycle.depth);
        let snapshot = drb_td::fetch_top_of_book(&connector, instrument, depth)
            .await
            .context("fetching order book")?;
        info!(
            "{}: {} bid(s), {} ask(s), best bid={:?}, best ask={:?}",
            config.cycle.instrument,
            snapshot.bids.len(),
            snapshot.asks.len(),
            snapshot.best_bid(),
            snapshot.best_ask(),
        );
        info!("bids: {:?}", snapshot.bid_prices());
        info!("asks: {:?}", snapshot.ask_prices());
        return Ok(());
    }

    // 4. Credentials, events and shutdown wiring
    let credentials = config.credentials.resolve().context("resolving credentials")?;
    let (events_tx, events_rx) = drb_td::event::channel();
    let consumer = tokio::spawn(render_events(events_rx));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = stop_tx.send(true);
        }
    });

    // 5. Run the loop
    let mut trading_loop = TradingLoop::new(connector, credentials, &config, events_tx, stop_rx);
    let outcome = trading_loop.run().await;
    drop(trading_loop);
    let _ = consumer.await;

    match outcome {
        Ok(summary) => {
            info!(
                "done: {} cycle(s) completed, {} failed, {} connection(s) opened",
                summary.cycles_completed, summary.cycles_failed, summary.connections_opened,
            );
            Ok(())
        }
        Err(e) => {
            error!("trading loop terminated: {e}");
            Err(e.into())
        }
    }
}

/// Render trading events as status lines until every sender is gone.
async fn render_events(mut rx: TdEventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            TdEvent::Connected { endpoint } => info!("connected to {endpoint}"),
            TdEvent::Authenticated { client_id } => info!("authenticated as {client_id}"),
            TdEvent::Disconnected { frames, errors } => {
                info!("disconnected: {frames} response(s) logged, {errors} error(s)")
            }
            TdEvent::OrderBook { instrument, bids, asks, best_bid, best_ask } => {
                info!("{instrument} book: {bids}x{asks} levels, best {best_bid:?} / {best_ask:?}")
            }
            TdEvent::OrderRejected { side, price, code, message } => {
                warn!("{side} @ {price} rejected ({code}): {message}")
            }
            TdEvent::Balance { currency, balance } => info!("Balance: {balance} {currency}"),
            TdEvent::OrdersCancelled { instrument, count } => match count {
                Some(n) => info!("{instrument}: {n} order(s) cancelled"),
                None => info!("{instrument}: orders cancelled"),
            },
            TdEvent::PositionClosed { instrument } => info!("{instrument}: position closed"),
            TdEvent::StepFailed { stage, method, message } => {
                warn!("{stage}: {method} failed: {message}")
            }
            TdEvent::CycleCompleted { cycle, report } => info!(
                "cycle {cycle} completed: {}/{} order(s) accepted, {} step(s) failed",
                report.orders_accepted,
                report.orders_submitted,
                report.failed_steps.len(),
            ),
            TdEvent::CycleAborted { cycle, stage, reason } => {
                warn!("cycle {cycle} aborted during {stage}: {reason}")
            }
        }
    }
}
