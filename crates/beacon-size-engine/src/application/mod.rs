//! # Application Layer
//!
//! - `circuit_breaker`: consecutive-failure breaker
//! - `fetch_client`: timeouts, breaker and synthetic fallback around the source
//! - `query_state`: stale-while-revalidate state per query
//! - `range_model`: the active slot window
//! - `dashboard`: the display pipeline
//! - `scheduler`: interval polling and countdown

pub mod circuit_breaker;
pub mod dashboard;
pub mod fetch_client;
pub mod query_state;
pub mod range_model;
pub mod scheduler;

pub use circuit_breaker::{CircuitBreaker, CircuitEvent, CircuitState, DEFAULT_FAILURE_THRESHOLD};
pub use dashboard::{
    join_blob_fees, BlockView, Dashboard, DashboardSnapshot, PollReport, QueryPhases,
    SlotBlobView,
};
pub use fetch_client::{Operation, ResilientFetchClient};
pub use query_state::{Completion, QueryPhase, QueryState, QueryTicket};
pub use range_model::RangeModel;
pub use scheduler::{Countdown, PollTarget, PollingScheduler};
