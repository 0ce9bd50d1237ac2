//! # drb-td
//!
//! Trading layer for the Deribit JSON-RPC API.
//!
//! A [`RpcSession`](rpc::RpcSession) owns one connection, correlates replies
//! to requests by id and records every frame in its
//! [`ResponseLog`](rpc::ResponseLog). An [`OrderCycle`](cycle::OrderCycle)
//! drives one quote → submit → hold → check → cancel → flatten pass over an
//! authenticated session, and the [`TradingLoop`](trading_loop::TradingLoop)
//! repeats cycles, reconnecting as needed. The lifecycle is:
//! `open()` → `authenticate()` → cycles → `close()`.
//!
//! Status leaves the crate as [`TdEvent`](event::TdEvent) values; nothing
//! here prints.
//!
//! ## Methods used
//!
//! | Stage        | Method                              | Auth |
//! |--------------|-------------------------------------|------|
//! | Auth         | `public/auth`                       | no   |
//! | Quoting      | `public/get_order_book`             | no   |
//! | Submitting   | `private/buy`, `private/sell`       | yes  |
//! | BalanceCheck | `private/get_account_summary`       | yes  |
//! | Cancelling   | `private/cancel_all_by_instrument`  | yes  |
//! | Closing      | `private/close_position`            | yes  |

pub mod cycle;
pub mod event;
pub mod market;
pub mod rpc;
pub mod trading_loop;

#[cfg(test)]
pub(crate) mod testing;

pub use cycle::{CycleReport, OrderCycle, build_intents};
pub use event::{TdEvent, TdEventReceiver, TdEventSender};
pub use market::{OrderBookSnapshot, fetch_top_of_book};
pub use rpc::RpcSession;
pub use trading_loop::{LoopSummary, TradingLoop};
