//! Time helpers shared by the session and trading layers.
//!
//! Wall-clock timestamps are used for request signing and response-log
//! entries. [`sleep_or_shutdown`] is the only delay primitive the trading
//! loop uses: every pause races a shutdown watch so a cancellation request
//! never waits out a dwell interval.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;

/// Returns the current Unix timestamp in milliseconds.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Returns `true` if the shutdown flag is already raised.
#[inline]
pub fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` if the full duration elapsed and `false` if the shutdown
/// flag was raised (before or during the sleep). A dropped sender never
/// interrupts the sleep.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if shutdown_requested(shutdown) {
        return false;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    tokio::select! {
        _ = &mut sleep => true,
        raised = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
            if raised {
                false
            } else {
                (&mut sleep).await;
                true
            }
        }
    }
}
