//! # Dashboard
//!
//! Runs the display pipeline for the active slot window:
//!
//! ```text
//! RangeModel ──→ tokio::join!(latest, blocks, blobs, fees)
//!                   │
//!                   ├─ blocks ──→ ComponentNormalizer ──→ Aggregator ──→ BlockView
//!                   └─ blobs + fees ──→ join by slot ──→ SlotBlobView
//! ```
//!
//! Each query keeps its own [`QueryState`], so a failed or pending query
//! keeps showing its last good payload while the others move on. After the
//! window changes, only the entries of an earlier window that fall inside
//! the new one stay visible until the new window has loaded.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::query_state::{QueryPhase, QueryState, QueryTicket};
use super::range_model::RangeModel;
use super::scheduler::{Countdown, PollTarget};
use crate::algorithms::{
    aggregate_components, ComponentNormalizer, NormalizedComponents, SummaryEntry,
};
use crate::domain::{
    invariant_in_range, BlobFeeData, Block, BlockBlobs, BlockComponent, FetchError, RangeError,
    Slot, SlotRange,
};
use crate::ports::inbound::{BlockSizeApi, DataOrigin, Fetched};

/// One block ready for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BlockView {
    pub block: Block,
    pub normalized: NormalizedComponents,
    /// Share of each component in the corrected sum.
    pub percentages: Vec<(BlockComponent, f64)>,
    /// Top two components plus "Other".
    pub summary: Vec<SummaryEntry>,
    pub origin: DataOrigin,
}

impl BlockView {
    pub fn build(block: Block, origin: DataOrigin, normalizer: &ComponentNormalizer) -> Self {
        let normalized = normalizer.normalize(&block.components, block.ssz_size);
        if normalized.was_corrected() {
            debug!(
                slot = block.slot,
                corrections = ?normalized.corrections,
                "Corrected block components"
            );
        }
        let percentages = normalized.percentages();
        let summary = aggregate_components(&normalized.components);
        Self {
            block,
            normalized,
            percentages,
            summary,
            origin,
        }
    }

    pub fn slot(&self) -> Slot {
        self.block.slot
    }
}

/// Blobs and fee of one slot. Either side may be missing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlotBlobView {
    pub slot: Slot,
    pub blobs: Option<BlockBlobs>,
    pub fee: Option<BlobFeeData>,
}

impl SlotBlobView {
    pub fn blob_count(&self) -> u64 {
        self.blobs.as_ref().map_or(0, |b| b.count)
    }

    /// A slot whose block carried no blobs, shown as an explicit empty row.
    pub fn is_empty(&self) -> bool {
        self.blob_count() == 0
    }
}

/// Join blobs and fees by slot, keeping slots present in only one of them.
pub fn join_blob_fees(blobs: &[BlockBlobs], fees: &[BlobFeeData]) -> Vec<SlotBlobView> {
    let mut joined: BTreeMap<Slot, SlotBlobView> = BTreeMap::new();
    for entry in blobs {
        joined
            .entry(entry.slot)
            .or_insert_with(|| SlotBlobView {
                slot: entry.slot,
                blobs: None,
                fee: None,
            })
            .blobs = Some(entry.clone());
    }
    for fee in fees {
        joined
            .entry(fee.slot)
            .or_insert_with(|| SlotBlobView {
                slot: fee.slot,
                blobs: None,
                fee: None,
            })
            .fee = Some(fee.clone());
    }
    joined.into_values().collect()
}

/// Phase of every query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QueryPhases {
    pub latest: QueryPhase,
    pub blocks: QueryPhase,
    pub blobs: QueryPhase,
    pub fees: QueryPhase,
}

/// Everything a renderer needs for one frame.
#[derive(Clone, Debug, Serialize)]
pub struct DashboardSnapshot {
    pub range: SlotRange,
    pub latest: Option<BlockView>,
    pub blocks: Vec<BlockView>,
    pub blob_slots: Vec<SlotBlobView>,
    pub phases: QueryPhases,
    /// Last error of each query that has one.
    pub errors: Vec<String>,
    pub circuit: CircuitState,
    pub consecutive_failures: u64,
    /// Some displayed data is synthetic.
    pub synthetic: bool,
    /// Seconds until the next poll; `None` while auto refresh is off.
    pub next_poll_secs: Option<u64>,
}

/// Outcome of one refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollReport {
    /// Latest slot seen, live or synthetic.
    pub head: Option<Slot>,
    /// Window after the refresh.
    pub range: SlotRange,
    /// The window moved to follow the head.
    pub slid: bool,
    /// Queries that answered with an error.
    pub failed_queries: usize,
}

#[derive(Default)]
struct DashboardState {
    latest: QueryState<(), BlockView>,
    blocks: QueryState<SlotRange, Vec<BlockView>>,
    blobs: QueryState<SlotRange, Fetched<Vec<BlockBlobs>>>,
    fees: QueryState<SlotRange, Fetched<Vec<BlobFeeData>>>,
}

impl DashboardState {
    fn supersede(&mut self, range: SlotRange) {
        self.blocks.supersede(range);
        self.blobs.supersede(range);
        self.fees.supersede(range);
    }
}

struct RangeTickets {
    blocks: QueryTicket<SlotRange>,
    blobs: QueryTicket<SlotRange>,
    fees: QueryTicket<SlotRange>,
}

/// Display pipeline over a [`BlockSizeApi`].
pub struct Dashboard {
    api: Arc<dyn BlockSizeApi>,
    breaker: CircuitBreaker,
    range: RangeModel,
    normalizer: ComponentNormalizer,
    countdown: Option<Countdown>,
    state: Mutex<DashboardState>,
}

impl Dashboard {
    pub fn new(api: Arc<dyn BlockSizeApi>, breaker: CircuitBreaker, range: RangeModel) -> Self {
        Self {
            api,
            breaker,
            range,
            normalizer: ComponentNormalizer::default(),
            countdown: None,
            state: Mutex::new(DashboardState::default()),
        }
    }

    pub fn with_normalizer(mut self, normalizer: ComponentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Report the scheduler's countdown in snapshots.
    pub fn with_countdown(mut self, countdown: Countdown) -> Self {
        self.countdown = Some(countdown);
        self
    }

    pub fn range(&self) -> &RangeModel {
        &self.range
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Validate and apply user-entered bounds. In-flight results for the
    /// previous window will be discarded.
    pub fn select_range(&self, start: &str, end: &str) -> Result<SlotRange, RangeError> {
        let range = self.range.submit(start, end)?;
        self.state.lock().supersede(range);
        Ok(range)
    }

    /// "Last N blocks" relative to the latest known slot.
    pub fn select_last(&self, count: u64) -> Option<SlotRange> {
        let head = self.latest_slot()?;
        let range = self.range.select_last(head, count);
        self.state.lock().supersede(range);
        Some(range)
    }

    /// Close the circuit breaker after an operator intervention.
    pub fn reset_circuit(&self) {
        self.breaker.reset();
    }

    pub fn latest_slot(&self) -> Option<Slot> {
        self.state.lock().latest.data().map(BlockView::slot)
    }

    /// Fetch the latest block and the active window concurrently. When
    /// `follow_head` is set and the head moved past the window, the window
    /// slides forward and is fetched again.
    pub async fn refresh(&self, follow_head: bool) -> PollReport {
        let range = self.range.current();
        let (latest_ticket, tickets) = {
            let mut state = self.state.lock();
            (state.latest.begin(()), Self::begin_range(&mut state, range))
        };

        let (latest, blocks, blobs, fees) = tokio::join!(
            self.api.latest_block(),
            self.api.blocks(range),
            self.api.blobs(range),
            self.api.blob_fees(range),
        );

        let head = latest.as_ref().ok().map(|fetched| fetched.data.slot);
        let mut failed_queries = usize::from(latest.is_err());
        let latest = latest.map(|fetched| {
            BlockView::build(fetched.data, fetched.origin, &self.normalizer)
        });
        self.state.lock().latest.complete(latest_ticket, latest);
        failed_queries += self.apply_range(tickets, blocks, blobs, fees);

        let mut report = PollReport {
            head,
            range,
            slid: false,
            failed_queries,
        };

        if follow_head {
            if let Some(next) = head.and_then(|head| self.range.follow_head(head)) {
                info!(%next, "Window follows chain head");
                self.state.lock().supersede(next);
                report.failed_queries += self.refresh_range().await;
                report.range = next;
                report.slid = true;
            }
        }
        report
    }

    /// Fetch the active window only. Returns the number of failed queries.
    pub async fn refresh_range(&self) -> usize {
        let range = self.range.current();
        let tickets = Self::begin_range(&mut self.state.lock(), range);
        let (blocks, blobs, fees) = tokio::join!(
            self.api.blocks(range),
            self.api.blobs(range),
            self.api.blob_fees(range),
        );
        self.apply_range(tickets, blocks, blobs, fees)
    }

    fn begin_range(state: &mut DashboardState, range: SlotRange) -> RangeTickets {
        RangeTickets {
            blocks: state.blocks.begin(range),
            blobs: state.blobs.begin(range),
            fees: state.fees.begin(range),
        }
    }

    fn apply_range(
        &self,
        tickets: RangeTickets,
        blocks: Result<Fetched<Vec<Block>>, FetchError>,
        blobs: Result<Fetched<Vec<BlockBlobs>>, FetchError>,
        fees: Result<Fetched<Vec<BlobFeeData>>, FetchError>,
    ) -> usize {
        let failed = [blocks.is_err(), blobs.is_err(), fees.is_err()]
            .into_iter()
            .filter(|failed| *failed)
            .count();
        if failed > 0 {
            warn!(failed, range = %tickets.blocks.key(), "Range queries failed, keeping last data");
        }

        let blocks = blocks.map(|fetched| {
            let origin = fetched.origin;
            fetched
                .data
                .into_iter()
                .map(|block| BlockView::build(block, origin, &self.normalizer))
                .collect::<Vec<_>>()
        });
        let current = self.range.current();
        let mut state = self.state.lock();
        // the window may have changed while the requests were out
        state.supersede(current);
        state.blocks.complete(tickets.blocks, blocks);
        state.blobs.complete(tickets.blobs, blobs);
        state.fees.complete(tickets.fees, fees);
        failed
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let state = self.state.lock();
        let range = self.range.current();

        let latest = state.latest.data().cloned();
        let blocks: Vec<BlockView> = visible(&state.blocks, &range, BlockView::slot)
            .into_iter()
            .cloned()
            .collect();
        let blobs = visible_fetched(&state.blobs, &range, |b| b.slot);
        let fees = visible_fetched(&state.fees, &range, |f| f.slot);
        let blob_slots = join_blob_fees(&blobs.0, &fees.0);

        let synthetic = latest
            .as_ref()
            .is_some_and(|view| view.origin == DataOrigin::Synthetic)
            || blocks.iter().any(|view| view.origin == DataOrigin::Synthetic)
            || blobs.1
            || fees.1;

        let errors = [
            state.latest.last_error(),
            state.blocks.last_error(),
            state.blobs.last_error(),
            state.fees.last_error(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();

        DashboardSnapshot {
            range,
            latest,
            blocks,
            blob_slots,
            phases: QueryPhases {
                latest: state.latest.phase(),
                blocks: state.blocks.phase(),
                blobs: state.blobs.phase(),
                fees: state.fees.phase(),
            },
            errors,
            circuit: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
            synthetic,
            next_poll_secs: self.countdown.as_ref().and_then(Countdown::seconds_remaining),
        }
    }
}

/// Entries of `query` that belong to `range`: the current payload, or what
/// an earlier window left inside this one.
fn visible<'a, T>(
    query: &'a QueryState<SlotRange, Vec<T>>,
    range: &SlotRange,
    slot_of: impl Fn(&T) -> Slot,
) -> Vec<&'a T> {
    match (query.data(), query.previous()) {
        (Some(current), _) => current.iter().collect(),
        (None, Some((_, earlier))) => earlier
            .iter()
            .filter(|item| invariant_in_range(slot_of(item), range))
            .collect(),
        (None, None) => Vec::new(),
    }
}

/// Like [`visible`], plus whether the entries are synthetic.
fn visible_fetched<T: Clone>(
    query: &QueryState<SlotRange, Fetched<Vec<T>>>,
    range: &SlotRange,
    slot_of: impl Fn(&T) -> Slot,
) -> (Vec<T>, bool) {
    let fetched = query.data().or(query.previous().map(|(_, earlier)| earlier));
    match fetched {
        Some(fetched) => {
            let items: Vec<T> = fetched
                .data
                .iter()
                .filter(|item| invariant_in_range(slot_of(item), range))
                .cloned()
                .collect();
            let synthetic = fetched.is_synthetic() && !items.is_empty();
            (items, synthetic)
        }
        None => (Vec::new(), false),
    }
}

#[async_trait]
impl PollTarget for Dashboard {
    async fn poll(&self) {
        let report = self.refresh(true).await;
        debug!(
            head = ?report.head,
            range = %report.range,
            slid = report.slid,
            failed = report.failed_queries,
            "Dashboard refreshed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DeterministicSynthetic;
    use crate::application::ResilientFetchClient;
    use crate::config::EngineConfig;
    use crate::domain::MAX_SLOT_SPAN;
    use crate::ports::outbound::{MockBehavior, MockSource};

    fn dashboard(source: MockSource, range: (Slot, Slot)) -> (Dashboard, Arc<MockSource>) {
        let source = Arc::new(source);
        let config = EngineConfig::for_testing();
        let client = ResilientFetchClient::new(
            source.clone(),
            DeterministicSynthetic::with_fixed_head(7, 1_000),
            &config,
        );
        let breaker = client.breaker().clone();
        let range = RangeModel::new(SlotRange::new(range.0, range.1).unwrap(), MAX_SLOT_SPAN);
        (Dashboard::new(Arc::new(client), breaker, range), source)
    }

    fn blobs(slot: Slot, count: u64) -> BlockBlobs {
        BlockBlobs {
            count,
            ..BlockBlobs::empty(slot)
        }
    }

    fn fee(slot: Slot) -> BlobFeeData {
        BlobFeeData {
            slot,
            excess_blob_gas: 0,
            blob_base_fee: 0,
        }
    }

    #[test]
    fn test_join_keeps_one_sided_slots() {
        let joined = join_blob_fees(&[blobs(2, 1), blobs(1, 0)], &[fee(2), fee(3)]);
        let slots: Vec<_> = joined.iter().map(|v| v.slot).collect();
        assert_eq!(slots, vec![1, 2, 3]);

        assert!(joined[0].is_empty());
        assert!(joined[0].blobs.is_some());
        assert!(joined[0].fee.is_none());
        assert_eq!(joined[1].blob_count(), 1);
        assert!(joined[2].blobs.is_none());
    }

    #[tokio::test]
    async fn test_refresh_runs_full_pipeline() {
        let (dashboard, _) = dashboard(MockSource::healthy(1_000), (990, 1_000));
        let report = dashboard.refresh(false).await;
        assert_eq!(report.head, Some(1_000));
        assert_eq!(report.failed_queries, 0);

        let snapshot = dashboard.snapshot();
        assert!(!snapshot.synthetic);
        assert_eq!(snapshot.blocks.len(), 11);
        assert_eq!(snapshot.phases.blocks, QueryPhase::Ready);

        // fixture execution payload is 97% of the block
        let view = &snapshot.blocks[0];
        assert_eq!(
            view.normalized.components.get(BlockComponent::ExecutionPayload),
            65_000
        );
        assert!(view.summary.len() <= 3);
        let total: f64 = view.percentages.iter().map(|(_, p)| p).sum();
        assert!((total - 100.0).abs() < 0.1);

        // fixture fees arrive as zero with positive excess gas
        assert!(snapshot
            .blob_slots
            .iter()
            .all(|v| v.fee.as_ref().is_some_and(|f| f.blob_base_fee >= 1)));
    }

    #[tokio::test]
    async fn test_failed_query_keeps_last_good_data() {
        let (dashboard, source) = dashboard(MockSource::healthy(1_000), (990, 1_000));
        dashboard.refresh(false).await;

        source.push(MockBehavior::Succeed);
        source.push(MockBehavior::HttpError(500));
        let report = dashboard.refresh(false).await;
        assert_eq!(report.failed_queries, 1);

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.blocks.len(), 11);
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.phases.blocks, QueryPhase::Ready);
    }

    #[tokio::test]
    async fn test_window_follows_head() {
        let (dashboard, _) = dashboard(MockSource::healthy(1_050), (1_000, 1_020));
        let report = dashboard.refresh(true).await;

        assert!(report.slid);
        assert_eq!((report.range.start(), report.range.end()), (1_030, 1_050));
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.range, report.range);
        assert!(snapshot.blocks.iter().all(|v| report.range.contains(v.slot())));
    }

    #[tokio::test]
    async fn test_select_last_uses_latest_slot() {
        let (dashboard, _) = dashboard(MockSource::healthy(1_050), (0, 10));
        assert!(dashboard.select_last(20).is_none());

        dashboard.refresh(false).await;
        let range = dashboard.select_last(20).unwrap();
        assert_eq!((range.start(), range.end()), (1_030, 1_050));
    }

    #[tokio::test]
    async fn test_new_window_hides_previous_window_data() {
        let (dashboard, source) = dashboard(MockSource::healthy(1_000), (990, 1_000));
        dashboard.refresh(false).await;
        assert_eq!(dashboard.snapshot().blocks.len(), 11);

        let range = dashboard.select_range("200", "210").unwrap();
        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.phases.blocks, QueryPhase::Empty);
        assert!(snapshot.blocks.is_empty());
        assert!(snapshot.blob_slots.is_empty());

        source.push(MockBehavior::HttpError(500));
        assert_eq!(dashboard.refresh_range().await, 1);

        let snapshot = dashboard.snapshot();
        assert_eq!(snapshot.range, range);
        assert_ne!(snapshot.phases.blocks, QueryPhase::Ready);
        assert!(snapshot.blocks.iter().all(|v| range.contains(v.slot())));
        assert!(snapshot.blob_slots.iter().all(|v| range.contains(v.slot)));
        assert_eq!(snapshot.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_window_keeps_shared_slots() {
        let (dashboard, source) = dashboard(MockSource::healthy(1_000), (990, 1_000));
        dashboard.refresh(false).await;

        dashboard.select_range("995", "1005").unwrap();
        source.push(MockBehavior::HttpError(500));
        dashboard.refresh_range().await;

        let snapshot = dashboard.snapshot();
        let slots: Vec<_> = snapshot.blocks.iter().map(BlockView::slot).collect();
        assert_eq!(slots, (995..=1_000).collect::<Vec<_>>());
        assert_eq!(snapshot.phases.blocks, QueryPhase::Empty);
    }

    #[tokio::test]
    async fn test_invalid_selection_keeps_window() {
        let (dashboard, _) = dashboard(MockSource::healthy(1_000), (990, 1_000));
        assert!(dashboard.select_range("50", "10").is_err());
        assert_eq!(dashboard.range().current(), SlotRange::new(990, 1_000).unwrap());
    }
}
