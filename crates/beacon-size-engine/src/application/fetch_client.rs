//! # Resilient Fetch Client
//!
//! Wraps every upstream call with a timeout, the shared [`CircuitBreaker`]
//! and a synthetic fallback.
//!
//! | Outcome | Breaker | Caller sees |
//! |---------|---------|-------------|
//! | breaker open / forced | untouched | synthetic data, no network call |
//! | success | reset to 0 | live data |
//! | network failure or timeout | +1 | synthetic data |
//! | HTTP error status | +1 | [`FetchError::Upstream`] |
//! | undecodable body | +1 | [`FetchError::Decode`] |

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::algorithms::resolve_blob_base_fee;
use crate::config::{EngineConfig, FetchTimeouts};
use crate::domain::{
    invariant_in_range, BlobFeeData, Block, BlockBlobs, BlockId, FetchError, FetchResult, Slot,
    SlotRange, SourceError, SourceResult,
};
use crate::ports::inbound::{BlockSizeApi, Fetched};
use crate::ports::outbound::{BeaconSizeSource, SyntheticDataProvider};

/// One logical upstream operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Latest,
    Block,
    Blocks,
    BlockBlobs,
    Blobs,
    BlobFee,
    BlobFees,
}

impl Operation {
    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Latest => "latest",
            Operation::Block => "block",
            Operation::Blocks => "blocks",
            Operation::BlockBlobs => "blob",
            Operation::Blobs => "blobs",
            Operation::BlobFee => "blob-fee",
            Operation::BlobFees => "blob-fees",
        }
    }

    /// Time allowed for one attempt.
    pub fn timeout(&self, timeouts: &FetchTimeouts) -> Duration {
        match self {
            Operation::Latest => timeouts.latest(),
            Operation::Block | Operation::BlockBlobs | Operation::BlobFee => timeouts.single(),
            Operation::Blocks | Operation::Blobs | Operation::BlobFees => timeouts.range(),
        }
    }
}

/// Fetch client that never surfaces network failures.
pub struct ResilientFetchClient<S: BeaconSizeSource, P: SyntheticDataProvider> {
    source: Arc<S>,
    synthetic: P,
    breaker: CircuitBreaker,
    timeouts: FetchTimeouts,
    /// Live blocks by slot. Head lookups and synthetic blocks never land here.
    block_cache: Mutex<LruCache<Slot, Block>>,
}

impl<S: BeaconSizeSource, P: SyntheticDataProvider> ResilientFetchClient<S, P> {
    /// Create a client with its own breaker built from `config`.
    pub fn new(source: Arc<S>, synthetic: P, config: &EngineConfig) -> Self {
        let breaker = CircuitBreaker::with_threshold(config.failure_threshold);
        breaker.force_synthetic(config.force_synthetic);
        Self::with_breaker(source, synthetic, breaker, config)
    }

    /// Create a client guarded by a shared breaker.
    pub fn with_breaker(
        source: Arc<S>,
        synthetic: P,
        breaker: CircuitBreaker,
        config: &EngineConfig,
    ) -> Self {
        let cache_size = NonZeroUsize::new(config.block_cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            synthetic,
            breaker,
            timeouts: config.timeouts,
            block_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn synthetic(&self) -> &P {
        &self.synthetic
    }

    /// Number of cached live blocks.
    pub fn cached_blocks(&self) -> usize {
        self.block_cache.lock().len()
    }

    /// Run one upstream call under the breaker and timeout.
    async fn guarded<T, F, G>(&self, operation: Operation, call: F, fallback: G) -> FetchResult<Fetched<T>>
    where
        F: Future<Output = SourceResult<T>> + Send,
        G: FnOnce(&P) -> T + Send,
        T: Send,
    {
        if self.breaker.should_bypass() {
            debug!(operation = operation.name(), "Bypassing upstream, serving synthetic data");
            return Ok(Fetched::synthetic(fallback(&self.synthetic)));
        }

        let limit = operation.timeout(&self.timeouts);
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Network(format!(
                "no response within {}s",
                limit.as_secs_f64()
            ))),
        };

        match outcome {
            Ok(data) => {
                self.breaker.record_success();
                Ok(Fetched::live(data))
            }
            Err(SourceError::Network(reason)) => {
                let failures = self.breaker.record_failure();
                warn!(
                    operation = operation.name(),
                    source = self.source.source_id(),
                    failures,
                    %reason,
                    "Upstream unreachable, serving synthetic data"
                );
                Ok(Fetched::synthetic(fallback(&self.synthetic)))
            }
            Err(SourceError::Status { status, message }) => {
                let failures = self.breaker.record_failure();
                warn!(
                    operation = operation.name(),
                    status,
                    failures,
                    %message,
                    "Upstream returned an error"
                );
                Err(FetchError::Upstream {
                    operation: operation.name(),
                    status,
                    message,
                })
            }
            Err(SourceError::Decode(reason)) => {
                let failures = self.breaker.record_failure();
                warn!(
                    operation = operation.name(),
                    failures,
                    %reason,
                    "Upstream payload could not be decoded"
                );
                Err(FetchError::Decode {
                    operation: operation.name(),
                    reason,
                })
            }
        }
    }

    fn remember_blocks<'a>(&self, blocks: impl IntoIterator<Item = &'a Block>) {
        let mut cache = self.block_cache.lock();
        for block in blocks {
            cache.put(block.slot, block.clone());
        }
    }
}

/// Restrict range results to the window, sorted by slot, one entry per slot.
///
/// Missed slots simply stay absent.
fn tidy_range<T>(
    mut items: Vec<T>,
    range: &SlotRange,
    operation: Operation,
    slot_of: impl Fn(&T) -> Slot,
) -> Vec<T> {
    let received = items.len();
    items.retain(|item| invariant_in_range(slot_of(item), range));
    items.sort_by_key(|item| slot_of(item));
    items.dedup_by_key(|item| slot_of(item));
    if items.len() != received {
        debug!(
            operation = operation.name(),
            %range,
            received,
            kept = items.len(),
            "Dropped out-of-window or duplicate entries"
        );
    }
    items
}

#[async_trait]
impl<S, P> BlockSizeApi for ResilientFetchClient<S, P>
where
    S: BeaconSizeSource + 'static,
    P: SyntheticDataProvider + 'static,
{
    async fn latest_block(&self) -> FetchResult<Fetched<Block>> {
        let fetched = self
            .guarded(Operation::Latest, self.source.latest(), |p| {
                p.block(p.head_slot())
            })
            .await?;
        if !fetched.is_synthetic() {
            self.remember_blocks([&fetched.data]);
        }
        Ok(fetched)
    }

    async fn block(&self, id: BlockId) -> FetchResult<Fetched<Block>> {
        if let BlockId::Slot(slot) = id {
            if !self.breaker.should_bypass() {
                if let Some(block) = self.block_cache.lock().get(&slot).cloned() {
                    debug!(slot, "Block cache hit");
                    return Ok(Fetched::live(block));
                }
            }
        }

        let fetched = self
            .guarded(Operation::Block, self.source.block(id), move |p| {
                p.block(p.resolve(id))
            })
            .await?;
        if !fetched.is_synthetic() {
            self.remember_blocks([&fetched.data]);
        }
        Ok(fetched)
    }

    async fn blocks(&self, range: SlotRange) -> FetchResult<Fetched<Vec<Block>>> {
        let fetched = self
            .guarded(Operation::Blocks, self.source.blocks(range), move |p| {
                p.blocks(&range)
            })
            .await?
            .map(|blocks| tidy_range(blocks, &range, Operation::Blocks, |b| b.slot));
        if !fetched.is_synthetic() {
            self.remember_blocks(&fetched.data);
        }
        Ok(fetched)
    }

    async fn block_blobs(&self, id: BlockId) -> FetchResult<Fetched<BlockBlobs>> {
        self.guarded(Operation::BlockBlobs, self.source.block_blobs(id), move |p| {
            p.block_blobs(p.resolve(id))
        })
        .await
    }

    async fn blobs(&self, range: SlotRange) -> FetchResult<Fetched<Vec<BlockBlobs>>> {
        Ok(self
            .guarded(Operation::Blobs, self.source.blobs(range), move |p| {
                p.blobs(&range)
            })
            .await?
            .map(|blobs| tidy_range(blobs, &range, Operation::Blobs, |b| b.slot)))
    }

    async fn blob_fee(&self, id: BlockId) -> FetchResult<Fetched<BlobFeeData>> {
        Ok(self
            .guarded(Operation::BlobFee, self.source.blob_fee(id), move |p| {
                p.blob_fee(p.resolve(id))
            })
            .await?
            .map(|mut fee| {
                resolve_blob_base_fee(&mut fee);
                fee
            }))
    }

    async fn blob_fees(&self, range: SlotRange) -> FetchResult<Fetched<Vec<BlobFeeData>>> {
        Ok(self
            .guarded(Operation::BlobFees, self.source.blob_fees(range), move |p| {
                p.blob_fees(&range)
            })
            .await?
            .map(|fees| {
                let mut fees = tidy_range(fees, &range, Operation::BlobFees, |f| f.slot);
                fees.iter_mut().for_each(|fee| {
                    resolve_blob_base_fee(fee);
                });
                fees
            }))
    }
}
