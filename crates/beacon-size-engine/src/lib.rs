//! # Beacon Size Engine
//!
//! Normalization, derived metrics and resilient data acquisition for the
//! beacon block size dashboard.
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Purpose
//!
//! Upstream reports per-block byte counts (SSZ size, Snappy size, one size
//! per block field) and per-blob metadata. Those numbers are untrusted and
//! sometimes internally inconsistent. This crate turns them into values that
//! are safe to display:
//! - component sizes corrected and scaled so they never exceed the block
//! - percentages that always add up to 100%
//! - a top-2 plus "Other" summary per block
//! - blob base fees estimated from excess blob gas when upstream omits them
//!
//! and keeps working when upstream is down, by switching to deterministic
//! synthetic data.
//!
//! ## Failure Handling
//!
//! | Failure | Handling |
//! |---------|----------|
//! | Network (no response, timeout) | Synthetic data, failure counted |
//! | HTTP error / bad payload | Reported to the caller, failure counted |
//! | 3 consecutive failures | Breaker opens, synthetic data until reset |
//! | Invalid slot window | Rejected locally, never sent upstream |
//! | Oversized components, zero fees | Corrected silently, logged |
//!
//! ## Module Structure
//!
//! ```text
//! beacon-size-engine/
//! ├── domain/          # Block, ComponentMap, SlotRange, errors, constants
//! ├── algorithms/      # Normalizer, aggregator, fee estimator, window math
//! ├── ports/           # BlockSizeApi (inbound), BeaconSizeSource + SyntheticDataProvider (outbound)
//! ├── adapters/        # reqwest source, seeded synthetic data
//! ├── application/     # Circuit breaker, fetch client, dashboard, scheduler
//! └── config.rs        # EngineConfig
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{DeterministicSynthetic, HttpBeaconSizeSource, SyntheticHead};
pub use algorithms::{
    aggregate_components, aggregate_top, estimate_blob_base_fee, last_n_blocks,
    normalize_components, parse_range, resolve_blob_base_fee, slide_to_head, AnomalyPolicy,
    AnomalyRule, ComponentNormalizer, NormalizedComponents, SummaryEntry, ThresholdRule,
};
pub use application::{
    join_blob_fees, BlockView, CircuitBreaker, CircuitState, Countdown, Dashboard,
    DashboardSnapshot, PollReport, PollTarget, PollingScheduler, QueryPhase, QueryPhases,
    QueryState, RangeModel, ResilientFetchClient, SlotBlobView,
};
pub use config::{EngineConfig, FetchTimeouts};
pub use domain::{
    BlobFeeData, BlobInfo, Block, BlockBlobs, BlockComponent, BlockId, ComponentMap,
    ConfigError, FetchError, FetchResult, RangeError, RangeField, Slot, SlotRange, SourceError,
    SourceResult, MAX_SLOT_SPAN,
};
pub use ports::{
    BeaconSizeSource, BlockSizeApi, DataOrigin, Fetched, MockBehavior, MockSource,
    SyntheticDataProvider,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
