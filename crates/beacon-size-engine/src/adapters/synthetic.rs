//! Synthetic Data Adapter
//!
//! Deterministic stand-in data used when upstream is unreachable or the
//! circuit breaker is open. Every value is derived from `(seed, slot)`, so the
//! same slot always renders the same way.
//!
//! Component sizes follow typical byte costs of real blocks:
//!
//! | Field | Bytes |
//! |-------|-------|
//! | execution payload | ~65% of the block |
//! | attestation | 112 each |
//! | deposit | 1240 each |
//! | proposer slashing | 416 each |
//! | attester slashing | 624 each |
//! | voluntary exit | 112 each |
//! | sync aggregate | 64 |
//! | KZG commitment | 48 each |

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::algorithms::estimate_blob_base_fee;
use crate::domain::{
    BlobFeeData, BlobInfo, Block, BlockBlobs, BlockComponent, ComponentMap, Slot,
    BYTES_PER_BLOB, MAINNET_GENESIS_TIME, MAX_BLOBS_PER_BLOCK, SECONDS_PER_SLOT,
};
use crate::ports::outbound::SyntheticDataProvider;

const EXECUTION_PAYLOAD_SHARE: f64 = 0.65;
const ATTESTATION_BYTES: u64 = 112;
const DEPOSIT_BYTES: u64 = 1_240;
const PROPOSER_SLASHING_BYTES: u64 = 416;
const ATTESTER_SLASHING_BYTES: u64 = 624;
const VOLUNTARY_EXIT_BYTES: u64 = 112;
const SYNC_AGGREGATE_BYTES: u64 = 64;
const KZG_COMMITMENT_BYTES: u64 = 48;

/// Fixed block overhead outside the reported components.
const BLOCK_OVERHEAD_BYTES: u64 = 1_024;

/// Blob gas targeted per block (3 blobs).
const TARGET_BLOB_GAS_PER_BLOCK: u64 = 393_216;

#[derive(Clone, Copy, Debug)]
enum Stream {
    Block = 1,
    Blobs = 2,
    Fee = 3,
    BlobDetail = 4,
}

/// Where the synthetic chain head is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticHead {
    /// Follows mainnet slot timing from the wall clock.
    WallClock,
    /// Pinned to a slot.
    Fixed(Slot),
}

/// Seeded, per-slot deterministic synthetic data.
#[derive(Clone, Debug)]
pub struct DeterministicSynthetic {
    seed: u64,
    head: SyntheticHead,
}

impl DeterministicSynthetic {
    /// Head follows the wall clock.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            head: SyntheticHead::WallClock,
        }
    }

    /// Head pinned to `head`.
    pub fn with_fixed_head(seed: u64, head: Slot) -> Self {
        Self {
            seed,
            head: SyntheticHead::Fixed(head),
        }
    }

    fn rng(&self, slot: Slot, stream: Stream) -> StdRng {
        let mixed = self.seed
            ^ slot.wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (stream as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        StdRng::seed_from_u64(mixed)
    }

    fn blob_count(&self, slot: Slot) -> u64 {
        self.rng(slot, Stream::Blobs).gen_range(0..=MAX_BLOBS_PER_BLOCK)
    }
}

impl SyntheticDataProvider for DeterministicSynthetic {
    fn head_slot(&self) -> Slot {
        match self.head {
            SyntheticHead::Fixed(slot) => slot,
            SyntheticHead::WallClock => {
                let now = chrono::Utc::now().timestamp().max(0) as u64;
                now.saturating_sub(MAINNET_GENESIS_TIME) / SECONDS_PER_SLOT
            }
        }
    }

    fn block(&self, slot: Slot) -> Block {
        let mut rng = self.rng(slot, Stream::Block);
        let drawn_size: u64 = rng.gen_range(60_000..=180_000);

        let attestations = rng.gen_range(64..=128u64) * ATTESTATION_BYTES;
        let deposits = u64::from(rng.gen_bool(0.05)) * DEPOSIT_BYTES;
        let proposer_slashings = u64::from(rng.gen_bool(0.01)) * PROPOSER_SLASHING_BYTES;
        let attester_slashings = u64::from(rng.gen_bool(0.01)) * ATTESTER_SLASHING_BYTES;
        let voluntary_exits = rng.gen_range(0..=2u64) * VOLUNTARY_EXIT_BYTES;
        let commitments = self.blob_count(slot) * KZG_COMMITMENT_BYTES;
        let execution_payload = (drawn_size as f64 * EXECUTION_PAYLOAD_SHARE).round() as u64;

        let components: ComponentMap = [
            (BlockComponent::ExecutionPayload, execution_payload),
            (BlockComponent::Attestations, attestations),
            (BlockComponent::Deposits, deposits),
            (BlockComponent::ProposerSlashings, proposer_slashings),
            (BlockComponent::AttesterSlashings, attester_slashings),
            (BlockComponent::VoluntaryExits, voluntary_exits),
            (BlockComponent::SyncAggregate, SYNC_AGGREGATE_BYTES),
            (BlockComponent::BlobKzgCommitments, commitments),
        ]
        .into_iter()
        .collect();

        let ssz_size = drawn_size.max(components.total() + BLOCK_OVERHEAD_BYTES);
        let ratio: f64 = rng.gen_range(0.45..0.75);
        let snappy_size = (ssz_size as f64 * ratio).round() as u64;
        let root: [u8; 32] = rng.gen();

        Block {
            slot,
            ssz_size,
            snappy_size,
            compression_ratio: round4(snappy_size as f64 / ssz_size as f64),
            components,
            block_root: format!("0x{}", hex::encode(root)),
            timestamp: MAINNET_GENESIS_TIME + slot * SECONDS_PER_SLOT,
        }
    }

    fn block_blobs(&self, slot: Slot) -> BlockBlobs {
        let count = self.blob_count(slot);
        if count == 0 {
            return BlockBlobs::empty(slot);
        }

        let mut rng = self.rng(slot, Stream::BlobDetail);
        let blobs: Vec<BlobInfo> = (0..count)
            .map(|index| {
                let size = BYTES_PER_BLOB;
                let zero_bytes = rng.gen_range(0..=size / 2);
                let non_zero_bytes = size - zero_bytes;
                let ratio: f64 = rng.gen_range(0.30..1.0);
                let compressed_size = (size as f64 * ratio).round() as u64;
                BlobInfo {
                    index: index.to_string(),
                    size,
                    compressed_size,
                    compression_ratio: round4(compressed_size as f64 / size as f64),
                    zero_bytes,
                    non_zero_bytes,
                    zero_percentage: round2(zero_bytes as f64 / size as f64 * 100.0),
                }
            })
            .collect();

        let total_size: u64 = blobs.iter().map(|b| b.size).sum();
        let total_compressed_size: u64 = blobs.iter().map(|b| b.compressed_size).sum();
        BlockBlobs {
            slot,
            count,
            blobs,
            total_size,
            total_compressed_size,
            avg_compression_ratio: round4(total_compressed_size as f64 / total_size as f64),
        }
    }

    fn blob_fee(&self, slot: Slot) -> BlobFeeData {
        let mut rng = self.rng(slot, Stream::Fee);
        let excess_blob_gas = rng.gen_range(0..=200u64) * TARGET_BLOB_GAS_PER_BLOCK;
        BlobFeeData {
            slot,
            excess_blob_gas,
            blob_base_fee: estimate_blob_base_fee(excess_blob_gas),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{invariant_block, invariant_block_blobs, invariant_fee, SlotRange};

    #[test]
    fn test_same_slot_same_data() {
        let a = DeterministicSynthetic::with_fixed_head(7, 1000);
        let b = DeterministicSynthetic::with_fixed_head(7, 1000);
        assert_eq!(a.block(42), b.block(42));
        assert_eq!(a.block_blobs(42), b.block_blobs(42));
        assert_eq!(a.blob_fee(42), b.blob_fee(42));
    }

    #[test]
    fn test_synthetic_payloads_hold_invariants() {
        let provider = DeterministicSynthetic::with_fixed_head(1, 10_000);
        for slot in 0..200 {
            let block = provider.block(slot);
            assert!(invariant_block(&block), "block {} out of bounds", slot);
            assert_eq!(block.block_root.len(), 66);

            let blobs = provider.block_blobs(slot);
            assert!(invariant_block_blobs(&blobs), "blobs {} inconsistent", slot);
            assert_eq!(
                block.components.get(BlockComponent::BlobKzgCommitments),
                blobs.count * KZG_COMMITMENT_BYTES
            );

            assert!(invariant_fee(&provider.blob_fee(slot)));
        }
    }

    #[test]
    fn test_range_stays_in_window() {
        let provider = DeterministicSynthetic::with_fixed_head(1, 10_000);
        let range = SlotRange::new(500, 520).unwrap();
        let blocks = provider.blocks(&range);
        assert_eq!(blocks.len(), 21);
        assert!(blocks.iter().all(|b| range.contains(b.slot)));
        assert!(provider.blob_fees(&range).iter().all(|f| range.contains(f.slot)));
    }

    #[test]
    fn test_wall_clock_head_is_past_genesis() {
        let provider = DeterministicSynthetic::new(0);
        assert!(provider.head_slot() > 8_000_000);
    }
}
