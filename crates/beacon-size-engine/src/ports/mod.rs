//! # Ports
//!
//! - `inbound`: the API consumers call ([`BlockSizeApi`])
//! - `outbound`: what the engine depends on ([`BeaconSizeSource`],
//!   [`SyntheticDataProvider`])

pub mod inbound;
pub mod outbound;

pub use inbound::{BlockSizeApi, DataOrigin, Fetched};
pub use outbound::{BeaconSizeSource, MockBehavior, MockSource, SyntheticDataProvider};
