//! Circuit Breaker for upstream failures
//!
//! Counts consecutive failed upstream calls. Once the count reaches the
//! threshold every fetch is served from synthetic data, without touching the
//! network, until an operator resets the breaker.
//!
//! ```text
//! [CLOSED {n}] ──failure──→ [CLOSED {n+1}] ── n+1 >= threshold? ──→ [OPEN]
//!     ↑  │                                                            │
//!     │  └──success──→ [CLOSED {0}]                                   │
//!     │                                                               │
//!     └──────────────────────── manual reset ─────────────────────────┘
//! ```
//!
//! The breaker is a cheap handle: clones share one counter, so a single
//! breaker can guard every fetch of a session. All transitions happen under
//! one lock, so concurrent completions cannot interleave an increment with a
//! reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

/// Default number of consecutive failures that opens the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u64 = 3;

/// Breaker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests go upstream.
    #[default]
    Closed,
    /// Too many failures; requests are answered with synthetic data.
    Open,
}

/// Events that drive breaker transitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitEvent {
    /// An upstream call succeeded.
    RequestSucceeded,
    /// An upstream call failed (network, HTTP error or bad payload).
    RequestFailed,
    /// Operator reset.
    ManualReset,
}

#[derive(Debug, Default)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u64,
    trips: u64,
    manual_resets: u64,
}

/// Shared failure counter and open/closed switch.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<BreakerInner>>,
    forced_synthetic: Arc<AtomicBool>,
    threshold: u64,
}

impl CircuitBreaker {
    /// Breaker with the default threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_FAILURE_THRESHOLD)
    }

    /// Breaker that opens after `threshold` consecutive failures.
    pub fn with_threshold(threshold: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BreakerInner::default())),
            forced_synthetic: Arc::new(AtomicBool::new(false)),
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.inner.lock().consecutive_failures
    }

    /// Times the breaker has opened.
    pub fn trip_count(&self) -> u64 {
        self.inner.lock().trips
    }

    pub fn manual_reset_count(&self) -> u64 {
        self.inner.lock().manual_resets
    }

    /// Force (or stop forcing) synthetic data regardless of failures.
    pub fn force_synthetic(&self, forced: bool) {
        let previous = self.forced_synthetic.swap(forced, Ordering::SeqCst);
        if previous != forced {
            info!(forced, "Synthetic data mode toggled");
        }
    }

    pub fn is_forced_synthetic(&self) -> bool {
        self.forced_synthetic.load(Ordering::SeqCst)
    }

    /// Whether fetches must skip the network and use synthetic data.
    pub fn should_bypass(&self) -> bool {
        self.is_forced_synthetic() || self.state() == CircuitState::Open
    }

    /// Record a successful upstream call. Returns the new failure count (0).
    pub fn record_success(&self) -> u64 {
        self.process_event(CircuitEvent::RequestSucceeded);
        0
    }

    /// Record a failed upstream call. Returns the new failure count.
    pub fn record_failure(&self) -> u64 {
        let mut inner = self.inner.lock();
        Self::apply(&mut inner, CircuitEvent::RequestFailed, self.threshold);
        inner.consecutive_failures
    }

    /// Close the breaker and clear the counter.
    pub fn reset(&self) {
        self.process_event(CircuitEvent::ManualReset);
    }

    /// Process an event and return the resulting state.
    pub fn process_event(&self, event: CircuitEvent) -> CircuitState {
        let mut inner = self.inner.lock();
        Self::apply(&mut inner, event, self.threshold)
    }

    fn apply(inner: &mut BreakerInner, event: CircuitEvent, threshold: u64) -> CircuitState {
        match event {
            CircuitEvent::RequestFailed => {
                inner.consecutive_failures += 1;
            }
            CircuitEvent::RequestSucceeded => {
                inner.consecutive_failures = 0;
            }
            CircuitEvent::ManualReset => {
                inner.consecutive_failures = 0;
                inner.manual_resets += 1;
            }
        }

        let next = Self::next_state(inner.state, event, inner.consecutive_failures, threshold);
        if next != inner.state {
            match next {
                CircuitState::Open => {
                    inner.trips += 1;
                    warn!(
                        failures = inner.consecutive_failures,
                        threshold, "Circuit breaker opened, switching to synthetic data"
                    );
                }
                CircuitState::Closed => info!("Circuit breaker closed"),
            }
        }
        inner.state = next;
        next
    }

    /// Pure transition function.
    fn next_state(
        state: CircuitState,
        event: CircuitEvent,
        failures: u64,
        threshold: u64,
    ) -> CircuitState {
        match (state, event) {
            (_, CircuitEvent::ManualReset) => CircuitState::Closed,
            (CircuitState::Closed, CircuitEvent::RequestFailed) if failures >= threshold => {
                CircuitState::Open
            }
            // open stays open until an operator resets it
            (state, _) => state,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
