//! Append-only record of every frame a session decoded.
//!
//! Each session owns one [`ResponseLog`]; it is handed back by
//! [`RpcSession::close`](super::RpcSession::close). With a capacity set, the
//! oldest entries are evicted but [`total`](ResponseLog::total) keeps
//! counting.

use std::collections::VecDeque;
use std::time::Duration;

use super::codec::RpcResponse;

/// One decoded frame and what it answered.
#[derive(Debug, Clone)]
pub struct LoggedResponse {
    /// Method of the matching request, `None` for stray frames and notifications.
    pub method: Option<String>,
    /// Local receive time (ms since epoch).
    pub received_at_ms: u64,
    /// Send-to-receive time for replies to our own requests.
    pub round_trip: Option<Duration>,
    pub response: RpcResponse,
}

/// Bounded, append-only response log.
#[derive(Debug, Clone, Default)]
pub struct ResponseLog {
    entries: VecDeque<LoggedResponse>,
    capacity: Option<usize>,
    total: u64,
    errors: u64,
}

impl ResponseLog {
    /// A log keeping at most `capacity` entries (`None` = unbounded).
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.filter(|c| *c > 0),
            total: 0,
            errors: 0,
        }
    }

    pub fn push(&mut self, entry: LoggedResponse) {
        if let Some(cap) = self.capacity {
            while self.entries.len() >= cap {
                self.entries.pop_front();
            }
        }
        self.total += 1;
        if entry.response.is_error() {
            self.errors += 1;
        }
        self.entries.push_back(entry);
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LoggedResponse> {
        self.entries.iter()
    }

    /// Retained entries answering `method`.
    pub fn for_method<'a>(
        &'a self,
        method: &'a str,
    ) -> impl Iterator<Item = &'a LoggedResponse> + 'a {
        self.entries.iter().filter(move |e| e.method.as_deref() == Some(method))
    }

    pub fn last(&self) -> Option<&LoggedResponse> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames recorded over the log's lifetime, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Error replies recorded over the log's lifetime.
    pub fn error_count(&self) -> u64 {
        self.errors
    }
}
