//! # Outbound Ports
//!
//! Dependencies of the engine: the upstream size API and the synthetic
//! fallback capability.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{
    BlobFeeData, Block, BlockBlobs, BlockComponent, BlockId, ComponentMap, Slot, SlotRange,
    SourceError, SourceResult,
};

/// Upstream size API - outbound port.
///
/// One method per REST endpoint:
///
/// | Method | Path |
/// |--------|------|
/// | `block` | `GET /block/{slotOrHead}` |
/// | `blocks` | `GET /blocks?start&end` |
/// | `latest` | `GET /latest` |
/// | `block_blobs` | `GET /blob/{slotOrHead}` |
/// | `blobs` | `GET /blobs?start&end` |
/// | `blob_fee` | `GET /blob-fee/{slotOrHead}` |
/// | `blob_fees` | `GET /blob-fees?start&end` |
#[async_trait]
pub trait BeaconSizeSource: Send + Sync {
    async fn block(&self, id: BlockId) -> SourceResult<Block>;

    async fn blocks(&self, range: SlotRange) -> SourceResult<Vec<Block>>;

    async fn latest(&self) -> SourceResult<Block>;

    async fn block_blobs(&self, id: BlockId) -> SourceResult<BlockBlobs>;

    async fn blobs(&self, range: SlotRange) -> SourceResult<Vec<BlockBlobs>>;

    async fn blob_fee(&self, id: BlockId) -> SourceResult<BlobFeeData>;

    async fn blob_fees(&self, range: SlotRange) -> SourceResult<Vec<BlobFeeData>>;

    /// Identifier for logs.
    fn source_id(&self) -> &str;
}

/// Fallback data with the same schema and invariants as upstream data.
///
/// Implementations must be deterministic per slot, keep every component
/// within the block size and never produce slots outside a requested range.
pub trait SyntheticDataProvider: Send + Sync {
    /// Slot the synthetic chain head is at.
    fn head_slot(&self) -> Slot;

    fn block(&self, slot: Slot) -> Block;

    fn block_blobs(&self, slot: Slot) -> BlockBlobs;

    fn blob_fee(&self, slot: Slot) -> BlobFeeData;

    fn resolve(&self, id: BlockId) -> Slot {
        match id {
            BlockId::Head => self.head_slot(),
            BlockId::Slot(slot) => slot,
        }
    }

    fn blocks(&self, range: &SlotRange) -> Vec<Block> {
        range.slots().map(|slot| self.block(slot)).collect()
    }

    fn blobs(&self, range: &SlotRange) -> Vec<BlockBlobs> {
        range.slots().map(|slot| self.block_blobs(slot)).collect()
    }

    fn blob_fees(&self, range: &SlotRange) -> Vec<BlobFeeData> {
        range.slots().map(|slot| self.blob_fee(slot)).collect()
    }
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

/// Scripted response of a [`MockSource`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum MockBehavior {
    /// Answer with fixture data.
    Succeed,
    /// Fail as if the server were unreachable.
    NetworkDown,
    /// Answer with a non-success status.
    HttpError(u16),
    /// Answer with an undecodable body.
    Garbage,
    /// Answer with fixture data after a delay.
    Slow(Duration),
}

/// In-memory source that plays a script of behaviors, then repeats a default.
///
/// Fixture blocks report an overcounted execution payload, and fixture fees
/// report zero fees, so the whole correction pipeline is exercised.
#[derive(Debug)]
pub struct MockSource {
    script: Mutex<VecDeque<MockBehavior>>,
    fallback: MockBehavior,
    head: Slot,
    calls: AtomicUsize,
}

impl MockSource {
    /// A source that always succeeds with the head at `head`.
    pub fn healthy(head: Slot) -> Self {
        Self::with_default(head, MockBehavior::Succeed)
    }

    /// A source that repeats `behavior` on every call.
    pub fn with_default(head: Slot, behavior: MockBehavior) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: behavior,
            head,
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue behaviors for the next calls.
    pub fn script(self, behaviors: impl IntoIterator<Item = MockBehavior>) -> Self {
        self.script.lock().extend(behaviors);
        self
    }

    /// Queue more behaviors on a shared source.
    pub fn push(&self, behavior: MockBehavior) {
        self.script.lock().push_back(behavior);
    }

    /// Number of calls that reached the source.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fixture block for a slot.
    pub fn fixture_block(slot: Slot) -> Block {
        let ssz_size = 100_000;
        let components: ComponentMap = [
            (BlockComponent::ExecutionPayload, 97_000),
            (BlockComponent::Attestations, 14_336),
            (BlockComponent::SyncAggregate, 64),
            (BlockComponent::BlobKzgCommitments, 144),
        ]
        .into_iter()
        .collect();
        Block {
            slot,
            ssz_size,
            snappy_size: 55_000,
            compression_ratio: 0.55,
            components,
            block_root: format!("0x{:064x}", slot),
            timestamp: 1_700_000_000 + slot * 12,
        }
    }

    /// Fixture blobs for a slot: `slot % 3` blobs.
    pub fn fixture_blobs(slot: Slot) -> BlockBlobs {
        let count = slot % 3;
        if count == 0 {
            return BlockBlobs::empty(slot);
        }
        let blobs: Vec<_> = (0..count)
            .map(|i| crate::domain::BlobInfo {
                index: i.to_string(),
                size: 131_072,
                compressed_size: 65_536,
                compression_ratio: 0.5,
                zero_bytes: 31_072,
                non_zero_bytes: 100_000,
                zero_percentage: 23.71,
            })
            .collect();
        BlockBlobs {
            slot,
            count,
            total_size: 131_072 * count,
            total_compressed_size: 65_536 * count,
            avg_compression_ratio: 0.5,
            blobs,
        }
    }

    /// Fixture fee for a slot: positive excess gas, fee missing.
    pub fn fixture_fee(slot: Slot) -> BlobFeeData {
        BlobFeeData {
            slot,
            excess_blob_gas: 1_000 * (slot + 1),
            blob_base_fee: 0,
        }
    }

    async fn respond<T>(&self, fixture: impl FnOnce() -> T) -> SourceResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match behavior {
            MockBehavior::Succeed => Ok(fixture()),
            MockBehavior::NetworkDown => Err(SourceError::Network("connection refused".into())),
            MockBehavior::HttpError(status) => Err(SourceError::Status {
                status,
                message: "mock upstream error".into(),
            }),
            MockBehavior::Garbage => Err(SourceError::Decode("expected value at line 1".into())),
            MockBehavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(fixture())
            }
        }
    }

    fn slot_of(&self, id: BlockId) -> Slot {
        match id {
            BlockId::Head => self.head,
            BlockId::Slot(slot) => slot,
        }
    }
}

#[async_trait]
impl BeaconSizeSource for MockSource {
    async fn block(&self, id: BlockId) -> SourceResult<Block> {
        let slot = self.slot_of(id);
        self.respond(|| Self::fixture_block(slot)).await
    }

    async fn blocks(&self, range: SlotRange) -> SourceResult<Vec<Block>> {
        self.respond(|| range.slots().map(Self::fixture_block).collect())
            .await
    }

    async fn latest(&self) -> SourceResult<Block> {
        let head = self.head;
        self.respond(|| Self::fixture_block(head)).await
    }

    async fn block_blobs(&self, id: BlockId) -> SourceResult<BlockBlobs> {
        let slot = self.slot_of(id);
        self.respond(|| Self::fixture_blobs(slot)).await
    }

    async fn blobs(&self, range: SlotRange) -> SourceResult<Vec<BlockBlobs>> {
        self.respond(|| range.slots().map(Self::fixture_blobs).collect())
            .await
    }

    async fn blob_fee(&self, id: BlockId) -> SourceResult<BlobFeeData> {
        let slot = self.slot_of(id);
        self.respond(|| Self::fixture_fee(slot)).await
    }

    async fn blob_fees(&self, range: SlotRange) -> SourceResult<Vec<BlobFeeData>> {
        self.respond(|| range.slots().map(Self::fixture_fee).collect())
            .await
    }

    fn source_id(&self) -> &str {
        "mock"
    }
}
