//! In-flight request tracking for network-idle waits.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Quiet window before the network counts as idle
pub const NETWORK_IDLE_THRESHOLD_MS: u64 = 500;

/// Counts requests between start and finish events
#[derive(Debug)]
pub struct NetworkTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug)]
struct TrackerState {
    in_flight: HashSet<String>,
    last_change: Instant,
    total: usize,
}

impl Default for NetworkTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkTracker {
    /// Create a tracker with nothing in flight
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                in_flight: HashSet::new(),
                last_change: Instant::now(),
                total: 0,
            }),
        }
    }

    /// A request left the page
    pub fn request_started(&self, request_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.in_flight.insert(request_id.to_string()) {
            state.total += 1;
            state.last_change = Instant::now();
        }
    }

    /// A request finished, failed, or was cancelled
    pub fn request_finished(&self, request_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.in_flight.remove(request_id) {
            state.last_change = Instant::now();
        }
    }

    /// Number of requests currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .len()
    }

    /// Number of requests seen since creation
    #[must_use]
    pub fn total(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total
    }

    /// Nothing in flight for at least `quiet`
    #[must_use]
    pub fn is_idle(&self, quiet: Duration) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.is_empty() && state.last_change.elapsed() >= quiet
    }
}
