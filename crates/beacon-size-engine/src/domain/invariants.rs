//! # Domain Invariants
//!
//! Network constants and the checks every block/blob/fee payload must pass
//! before it reaches a consumer, whether it came from upstream or from the
//! synthetic provider.

use super::entities::{BlobFeeData, Block, BlockBlobs, ComponentMap, SlotRange};

/// Largest allowed `end - start` of a slot window.
pub const MAX_SLOT_SPAN: u64 = 100;

/// Seconds per slot.
pub const SECONDS_PER_SLOT: u64 = 12;

/// Mainnet beacon chain genesis time (unix seconds).
pub const MAINNET_GENESIS_TIME: u64 = 1_606_824_023;

/// EIP-4844 minimum blob base fee, in wei.
pub const MIN_BASE_FEE_PER_BLOB_GAS: u64 = 1;

/// EIP-4844 blob base fee update fraction.
pub const BLOB_BASE_FEE_UPDATE_FRACTION: u64 = 3_338_477;

/// Size of one blob in bytes.
pub const BYTES_PER_BLOB: u64 = 131_072;

/// Maximum blobs per block.
pub const MAX_BLOBS_PER_BLOCK: u64 = 6;

/// Every component fits in the block and the sum does not exceed it.
pub fn invariant_components_bounded(components: &ComponentMap, ssz_size: u64) -> bool {
    components.iter().all(|(_, v)| v <= ssz_size) && components.total() <= ssz_size
}

/// Block-level invariant: components bounded, compression ratio in `[0, 1]`.
pub fn invariant_block(block: &Block) -> bool {
    invariant_components_bounded(&block.components, block.ssz_size)
        && (0.0..=1.0).contains(&block.compression_ratio)
}

/// Blob-level invariant: count matches the list and zero/non-zero bytes add up.
pub fn invariant_block_blobs(blobs: &BlockBlobs) -> bool {
    blobs.count as usize == blobs.blobs.len()
        && blobs
            .blobs
            .iter()
            .all(|b| b.zero_bytes + b.non_zero_bytes == b.size)
        && blobs.total_size == blobs.blobs.iter().map(|b| b.size).sum::<u64>()
}

/// Fee invariant: a zero fee only with zero excess gas.
pub fn invariant_fee(fee: &BlobFeeData) -> bool {
    fee.excess_blob_gas == 0 || fee.blob_base_fee >= 1
}

/// Slot lies within the requested window.
pub fn invariant_in_range(slot: u64, range: &SlotRange) -> bool {
    range.contains(slot)
}
