//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits.

mod http_source;
mod synthetic;

pub use http_source::HttpBeaconSizeSource;
pub use synthetic::{DeterministicSynthetic, SyntheticHead};
