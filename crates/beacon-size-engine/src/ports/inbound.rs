//! # Inbound Ports
//!
//! What consumers call. Network failures never surface through this API:
//! they are answered with synthetic data tagged [`DataOrigin::Synthetic`].

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::{BlobFeeData, Block, BlockBlobs, BlockId, FetchResult, SlotRange};

/// Where a payload came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    /// Upstream answered.
    Live,
    /// Produced locally because upstream was unreachable or the breaker is open.
    Synthetic,
}

/// A payload together with its origin.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Fetched<T> {
    pub data: T,
    pub origin: DataOrigin,
}

impl<T> Fetched<T> {
    pub fn live(data: T) -> Self {
        Self {
            data,
            origin: DataOrigin::Live,
        }
    }

    pub fn synthetic(data: T) -> Self {
        Self {
            data,
            origin: DataOrigin::Synthetic,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == DataOrigin::Synthetic
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            origin: self.origin,
        }
    }
}

/// Block size API - inbound port.
#[async_trait]
pub trait BlockSizeApi: Send + Sync {
    /// Latest (head) block.
    async fn latest_block(&self) -> FetchResult<Fetched<Block>>;

    /// One block by slot or head.
    async fn block(&self, id: BlockId) -> FetchResult<Fetched<Block>>;

    /// Blocks in a window, sorted by slot. Missed slots are absent.
    async fn blocks(&self, range: SlotRange) -> FetchResult<Fetched<Vec<Block>>>;

    /// Blobs of one block.
    async fn block_blobs(&self, id: BlockId) -> FetchResult<Fetched<BlockBlobs>>;

    /// Blobs per block in a window, sorted by slot.
    async fn blobs(&self, range: SlotRange) -> FetchResult<Fetched<Vec<BlockBlobs>>>;

    /// Blob fee of one block.
    async fn blob_fee(&self, id: BlockId) -> FetchResult<Fetched<BlobFeeData>>;

    /// Blob fees in a window, sorted by slot.
    async fn blob_fees(&self, range: SlotRange) -> FetchResult<Fetched<Vec<BlobFeeData>>>;
}
