//! # Property Tests
//!
//! Invariants of the pure algorithms and of the synthetic provider over
//! generated inputs.

use beacon_size_engine::{
    aggregate_components, estimate_blob_base_fee, last_n_blocks, normalize_components,
    parse_range, AnomalyPolicy, BlockComponent, ComponentMap, ComponentNormalizer,
    DeterministicSynthetic, RangeError, SyntheticDataProvider, MAX_SLOT_SPAN,
};
use beacon_size_engine::domain::{invariant_block, invariant_block_blobs, invariant_fee};
use proptest::{collection::vec, prelude::*};

fn component_map(values: &[u64]) -> ComponentMap {
    BlockComponent::ALL
        .into_iter()
        .zip(values.iter().copied())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig { max_global_rejects: 65_536, ..ProptestConfig::default() })]

    #[test]
    fn test_normalized_sum_never_exceeds_block(
        values in vec(0u64..400_000, 8),
        ssz_size in 1u64..300_000,
    ) {
        let normalized = normalize_components(&component_map(&values), ssz_size);
        prop_assert!(normalized.total <= ssz_size);
        prop_assert!(normalized.components.iter().all(|(_, v)| v <= ssz_size));
        prop_assert_eq!(normalized.total, normalized.components.total());
    }

    #[test]
    fn test_rescale_preserves_proportions(
        values in vec(0u64..100_000, 8),
        ssz_size in 1_000u64..100_000,
    ) {
        let raw = component_map(&values);
        let sum = raw.total();
        prop_assume!(sum > ssz_size);
        // every value fits the block, so no clamping and only rescaling happens
        prop_assume!(values.iter().all(|v| *v <= ssz_size));

        let normalizer = ComponentNormalizer::new(AnomalyPolicy::none());
        let normalized = normalizer.normalize(&raw, ssz_size);
        for (component, before) in raw.iter() {
            let exact = before as f64 * ssz_size as f64 / sum as f64;
            let after = normalized.components.get(component) as f64;
            prop_assert!(
                (after - exact).abs() <= BlockComponent::ALL.len() as f64,
                "{} moved from {} to {}", component, exact, after
            );
        }
    }

    #[test]
    fn test_percentages_sum_to_hundred(
        values in vec(0u64..200_000, 8),
        ssz_size in 1u64..300_000,
    ) {
        let normalized = normalize_components(&component_map(&values), ssz_size);
        let sum: f64 = normalized.percentages().iter().map(|(_, p)| p).sum();
        if normalized.total == 0 {
            prop_assert_eq!(sum, 0.0);
        } else {
            prop_assert!((sum - 100.0).abs() <= 0.1, "percentages sum to {}", sum);
        }
    }

    #[test]
    fn test_aggregate_is_compact_and_sum_preserving(
        values in vec(0u64..200_000, 0..=8),
    ) {
        let components = component_map(&values);
        let summary = aggregate_components(&components);
        prop_assert!(summary.len() <= 3);
        let total: u64 = summary.iter().map(|e| e.value()).sum();
        prop_assert!(total.abs_diff(components.total()) <= 1);
    }

    #[test]
    fn test_fee_positive_for_positive_excess(excess in 1u64..500_000_000) {
        prop_assert!(estimate_blob_base_fee(excess) >= 1);
    }

    #[test]
    fn test_fee_is_monotonic(a in 0u64..300_000_000, b in 0u64..300_000_000) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(estimate_blob_base_fee(low) <= estimate_blob_base_fee(high));
    }

    #[test]
    fn test_reversed_range_rejected(start in 1u64..1_000_000, back in 1u64..1_000) {
        let end = start.saturating_sub(back);
        prop_assume!(end < start);
        let err = parse_range(&start.to_string(), &end.to_string(), MAX_SLOT_SPAN).unwrap_err();
        prop_assert_eq!(err, RangeError::StartAfterEnd { start, end });
    }

    #[test]
    fn test_last_n_ends_at_head(latest in 0u64..20_000_000, count in 0u64..500) {
        let range = last_n_blocks(latest, count, MAX_SLOT_SPAN);
        prop_assert_eq!(range.end(), latest);
        prop_assert!(range.span() <= count.min(MAX_SLOT_SPAN));
    }

    #[test]
    fn test_synthetic_data_is_valid(seed in any::<u64>(), slot in 0u64..20_000_000) {
        let provider = DeterministicSynthetic::with_fixed_head(seed, 20_000_000);
        let block = provider.block(slot);
        prop_assert_eq!(block.slot, slot);
        prop_assert!(invariant_block(&block));
        prop_assert!(invariant_block_blobs(&provider.block_blobs(slot)));
        prop_assert!(invariant_fee(&provider.blob_fee(slot)));
    }
}

#[test]
fn test_fee_of_zero_excess_is_zero() {
    assert_eq!(estimate_blob_base_fee(0), 0);
}

#[test]
fn test_overcounted_execution_payload_is_replaced() {
    let ssz_size = 200_000;
    let raw = component_map(&[194_000, 10_000]);
    let normalized = normalize_components(&raw, ssz_size);
    assert_eq!(
        normalized.components.get(BlockComponent::ExecutionPayload),
        130_000
    );
}
