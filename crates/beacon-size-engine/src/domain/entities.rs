//! # Domain Entities
//!
//! Wire-level data reported by the upstream size API, plus the validated
//! slot window used to query it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::{RangeError, RangeField};
use super::invariants::MAX_SLOT_SPAN;

/// Consensus-layer slot number.
pub type Slot = u64;

// =============================================================================
// Block components
// =============================================================================

/// Block body fields whose serialized size is reported per block.
///
/// Declaration order is the canonical iteration order of a [`ComponentMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockComponent {
    ExecutionPayload,
    Attestations,
    Deposits,
    ProposerSlashings,
    AttesterSlashings,
    VoluntaryExits,
    SyncAggregate,
    BlobKzgCommitments,
}

impl BlockComponent {
    /// All components in canonical order.
    pub const ALL: [BlockComponent; 8] = [
        BlockComponent::ExecutionPayload,
        BlockComponent::Attestations,
        BlockComponent::Deposits,
        BlockComponent::ProposerSlashings,
        BlockComponent::AttesterSlashings,
        BlockComponent::VoluntaryExits,
        BlockComponent::SyncAggregate,
        BlockComponent::BlobKzgCommitments,
    ];

    /// Field name as used by the upstream API.
    pub fn name(&self) -> &'static str {
        match self {
            BlockComponent::ExecutionPayload => "execution_payload",
            BlockComponent::Attestations => "attestations",
            BlockComponent::Deposits => "deposits",
            BlockComponent::ProposerSlashings => "proposer_slashings",
            BlockComponent::AttesterSlashings => "attester_slashings",
            BlockComponent::VoluntaryExits => "voluntary_exits",
            BlockComponent::SyncAggregate => "sync_aggregate",
            BlockComponent::BlobKzgCommitments => "blob_kzg_commitments",
        }
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            BlockComponent::ExecutionPayload => "Execution Payload",
            BlockComponent::Attestations => "Attestations",
            BlockComponent::Deposits => "Deposits",
            BlockComponent::ProposerSlashings => "Proposer Slashings",
            BlockComponent::AttesterSlashings => "Attester Slashings",
            BlockComponent::VoluntaryExits => "Voluntary Exits",
            BlockComponent::SyncAggregate => "Sync Aggregate",
            BlockComponent::BlobKzgCommitments => "Blob KZG Commitments",
        }
    }

    /// Parse an upstream field name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for BlockComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte count per block component.
///
/// Upstream sends a JSON object keyed by field name. Unknown fields are
/// dropped and negative counts are read as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, i64>", into = "BTreeMap<String, u64>")]
pub struct ComponentMap {
    entries: BTreeMap<BlockComponent, u64>,
}

impl ComponentMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of a component, zero when absent.
    pub fn get(&self, component: BlockComponent) -> u64 {
        self.entries.get(&component).copied().unwrap_or(0)
    }

    /// Whether the component was reported at all.
    pub fn contains(&self, component: BlockComponent) -> bool {
        self.entries.contains_key(&component)
    }

    /// Set the size of a component.
    pub fn insert(&mut self, component: BlockComponent, bytes: u64) {
        self.entries.insert(component, bytes);
    }

    /// Entries in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockComponent, u64)> + '_ {
        self.entries.iter().map(|(c, v)| (*c, *v))
    }

    /// Mutable sizes in canonical order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut u64> + '_ {
        self.entries.values_mut()
    }

    /// Number of reported components.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no component was reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all component sizes.
    pub fn total(&self) -> u64 {
        self.entries.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }
}

impl FromIterator<(BlockComponent, u64)> for ComponentMap {
    fn from_iter<I: IntoIterator<Item = (BlockComponent, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<String, i64>> for ComponentMap {
    fn from(raw: BTreeMap<String, i64>) -> Self {
        let mut map = ComponentMap::new();
        for (name, bytes) in raw {
            let Some(component) = BlockComponent::from_name(&name) else {
                tracing::debug!(field = %name, "Ignoring unknown block component");
                continue;
            };
            if bytes < 0 {
                tracing::debug!(field = %name, bytes, "Negative component size read as zero");
            }
            map.insert(component, bytes.max(0) as u64);
        }
        map
    }
}

impl From<ComponentMap> for BTreeMap<String, u64> {
    fn from(map: ComponentMap) -> Self {
        map.iter().map(|(c, v)| (c.name().to_string(), v)).collect()
    }
}

// =============================================================================
// Blocks, blobs and fees
// =============================================================================

/// Size report for one beacon block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub slot: Slot,
    /// SSZ-serialized size in bytes.
    pub ssz_size: u64,
    /// Snappy-compressed size in bytes.
    pub snappy_size: u64,
    /// `snappy_size / ssz_size`, display only.
    #[serde(default)]
    pub compression_ratio: f64,
    #[serde(default)]
    pub components: ComponentMap,
    /// 32-byte root as a 0x-prefixed hex string.
    #[serde(default)]
    pub block_root: String,
    /// Unix seconds.
    #[serde(default)]
    pub timestamp: u64,
}

/// Per-blob metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub index: String,
    pub size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub zero_bytes: u64,
    pub non_zero_bytes: u64,
    pub zero_percentage: f64,
}

/// Blobs attached to one block.
///
/// `count == 0` is a valid block without blobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockBlobs {
    pub slot: Slot,
    pub count: u64,
    #[serde(default)]
    pub blobs: Vec<BlobInfo>,
    #[serde(default)]
    pub total_size: u64,
    #[serde(default)]
    pub total_compressed_size: u64,
    #[serde(default)]
    pub avg_compression_ratio: f64,
}

impl BlockBlobs {
    /// An explicit "no blobs" record for a slot.
    pub fn empty(slot: Slot) -> Self {
        Self {
            slot,
            count: 0,
            blobs: Vec::new(),
            total_size: 0,
            total_compressed_size: 0,
            avg_compression_ratio: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Blob fee market data for one slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobFeeData {
    pub slot: Slot,
    #[serde(default)]
    pub excess_blob_gas: u64,
    /// Gwei. Missing or `null` upstream values read as zero.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub blob_base_fee: u64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

// =============================================================================
// Query parameters
// =============================================================================

/// Block selector for single-block lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockId {
    Head,
    Slot(Slot),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Head => f.write_str("head"),
            BlockId::Slot(slot) => write!(f, "{}", slot),
        }
    }
}

/// Inclusive slot window. Construction enforces `start <= end` and the span limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SlotRange {
    start: Slot,
    end: Slot,
}

impl SlotRange {
    /// Validate a window against the default span limit.
    pub fn new(start: Slot, end: Slot) -> Result<Self, RangeError> {
        Self::with_max_span(start, end, MAX_SLOT_SPAN)
    }

    /// Validate a window against a custom span limit.
    pub fn with_max_span(start: Slot, end: Slot, max_span: u64) -> Result<Self, RangeError> {
        if start > end {
            return Err(RangeError::StartAfterEnd { start, end });
        }
        let span = end - start;
        if span > max_span {
            return Err(RangeError::SpanTooLarge {
                span,
                max: max_span,
            });
        }
        Ok(Self { start, end })
    }

    /// Build a window whose bounds were derived from an already valid one.
    pub(crate) fn trusted(start: Slot, end: Slot) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn start(&self) -> Slot {
        self.start
    }

    pub fn end(&self) -> Slot {
        self.end
    }

    /// `end - start`.
    pub fn span(&self) -> u64 {
        self.end - self.start
    }

    /// Number of slots covered (inclusive).
    pub fn slot_count(&self) -> u64 {
        self.span() + 1
    }

    pub fn contains(&self, slot: Slot) -> bool {
        (self.start..=self.end).contains(&slot)
    }

    /// Iterate every slot in the window.
    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        self.start..=self.end
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Parse a user-supplied slot bound.
pub(crate) fn parse_bound(field: RangeField, input: &str) -> Result<Slot, RangeError> {
    input
        .trim()
        .parse::<Slot>()
        .map_err(|_| RangeError::InvalidBound {
            field,
            input: input.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_map_decodes_upstream_object() {
        let json = r#"{"execution_payload": 65000, "attestations": 12000, "bogus": 5, "deposits": -3}"#;
        let map: ComponentMap = serde_json::from_str(json).unwrap();

        assert_eq!(map.get(BlockComponent::ExecutionPayload), 65_000);
        assert_eq!(map.get(BlockComponent::Attestations), 12_000);
        assert_eq!(map.get(BlockComponent::Deposits), 0);
        assert!(map.contains(BlockComponent::Deposits));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_component_map_iterates_in_field_order() {
        let map: ComponentMap = [
            (BlockComponent::SyncAggregate, 64),
            (BlockComponent::ExecutionPayload, 1),
            (BlockComponent::Attestations, 2),
        ]
        .into_iter()
        .collect();

        let order: Vec<_> = map.iter().map(|(c, _)| c).collect();
        assert_eq!(
            order,
            vec![
                BlockComponent::ExecutionPayload,
                BlockComponent::Attestations,
                BlockComponent::SyncAggregate
            ]
        );
        assert_eq!(map.total(), 67);
    }

    #[test]
    fn test_block_decodes_with_missing_optional_fields() {
        let json = r#"{"slot": 7, "ssz_size": 1000, "snappy_size": 600}"#;
        let block: Block = serde_json::from_str(json).unwrap();
        assert_eq!(block.slot, 7);
        assert!(block.components.is_empty());
        assert_eq!(block.block_root, "");
    }

    #[test]
    fn test_fee_null_reads_as_zero() {
        let fee: BlobFeeData =
            serde_json::from_str(r#"{"slot": 1, "excess_blob_gas": 10, "blob_base_fee": null}"#)
                .unwrap();
        assert_eq!(fee.blob_base_fee, 0);

        let fee: BlobFeeData = serde_json::from_str(r#"{"slot": 1}"#).unwrap();
        assert_eq!(fee.excess_blob_gas, 0);
        assert_eq!(fee.blob_base_fee, 0);
    }

    #[test]
    fn test_slot_range_validation() {
        assert!(SlotRange::new(10, 10).is_ok());
        assert!(SlotRange::new(0, 100).is_ok());
        assert!(matches!(
            SlotRange::new(50, 10),
            Err(RangeError::StartAfterEnd { start: 50, end: 10 })
        ));
        assert!(matches!(
            SlotRange::new(0, 150),
            Err(RangeError::SpanTooLarge { span: 150, max: 100 })
        ));
    }

    #[test]
    fn test_block_id_display() {
        assert_eq!(BlockId::Head.to_string(), "head");
        assert_eq!(BlockId::Slot(42).to_string(), "42");
    }
}
