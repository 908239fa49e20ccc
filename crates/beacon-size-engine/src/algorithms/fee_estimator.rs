//! # Blob Fee Estimator
//!
//! EIP-4844 blob base fee derived from excess blob gas:
//!
//! ```text
//! fee_wei  = MIN_BASE_FEE_PER_BLOB_GAS * e^(excess_blob_gas / UPDATE_FRACTION)
//! fee_gwei = round(fee_wei / 1e9), at least 1 when excess_blob_gas > 0
//! ```
//!
//! Used only when upstream reports a missing or zero fee next to positive
//! excess gas. A non-zero upstream fee is never overridden.

use tracing::debug;

use crate::domain::{BlobFeeData, BLOB_BASE_FEE_UPDATE_FRACTION, MIN_BASE_FEE_PER_BLOB_GAS};

const WEI_PER_GWEI: f64 = 1e9;

/// Estimated blob base fee in Gwei.
///
/// Zero is reserved for `excess_blob_gas == 0`; any positive excess yields at least 1.
pub fn estimate_blob_base_fee(excess_blob_gas: u64) -> u64 {
    if excess_blob_gas == 0 {
        return 0;
    }
    let exponent = excess_blob_gas as f64 / BLOB_BASE_FEE_UPDATE_FRACTION as f64;
    let fee_wei = MIN_BASE_FEE_PER_BLOB_GAS as f64 * exponent.exp();
    // `as` saturates at u64::MAX once the curve overflows f64
    let fee_gwei = (fee_wei / WEI_PER_GWEI).round() as u64;
    fee_gwei.max(1)
}

/// Fill in a missing fee. Returns true when the estimate was used.
pub fn resolve_blob_base_fee(fee: &mut BlobFeeData) -> bool {
    if fee.blob_base_fee != 0 || fee.excess_blob_gas == 0 {
        return false;
    }
    fee.blob_base_fee = estimate_blob_base_fee(fee.excess_blob_gas);
    debug!(
        slot = fee.slot,
        excess_blob_gas = fee.excess_blob_gas,
        estimated_fee = fee.blob_base_fee,
        "Upstream blob base fee missing, using estimate"
    );
    true
}
