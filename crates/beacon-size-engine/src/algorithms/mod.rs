//! # Algorithms
//!
//! Pure functions: no I/O, no shared state.
//!
//! - `normalizer`: anomaly correction and sum-consistent component sizes
//! - `aggregator`: top-N plus "Other" summaries
//! - `fee_estimator`: EIP-4844 blob base fee fallback
//! - `range`: slot window parsing, shortcuts and head tracking

pub mod aggregator;
pub mod fee_estimator;
pub mod normalizer;
pub mod range;

pub use aggregator::{aggregate_components, aggregate_top, SummaryEntry, OTHER_LABEL};
pub use fee_estimator::{estimate_blob_base_fee, resolve_blob_base_fee};
pub use normalizer::{
    normalize_components, percentage_of, AnomalyPolicy, AnomalyRule, ComponentNormalizer,
    Correction, NormalizedComponents, ThresholdRule,
};
pub use range::{last_n_blocks, parse_range, slide_to_head};
