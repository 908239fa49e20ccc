//! # Component Normalizer
//!
//! Turns the raw per-field sizes of a block into a map that is safe to chart:
//!
//! 1. Known upstream anomalies are replaced by empirical estimates
//!    ([`AnomalyPolicy`]).
//! 2. Every value is clamped to `ssz_size`.
//! 3. If the sum still exceeds `ssz_size`, all values are rescaled by
//!    `ssz_size / sum` and rounded. Rounding overshoot is trimmed from the
//!    largest component so `Σ ≤ ssz_size` always holds.
//!
//! Percentages are taken against the corrected sum, not `ssz_size`, so they
//! always add up to 100%.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::domain::{BlockComponent, ComponentMap};

/// Share of `ssz_size` at which an execution payload size is considered overcounted.
pub const EXECUTION_PAYLOAD_ANOMALY_RATIO: f64 = 0.95;
/// Typical execution payload share used as a replacement.
pub const EXECUTION_PAYLOAD_ESTIMATE_RATIO: f64 = 0.65;
/// Share of `ssz_size` at which an attestation size is considered overcounted.
pub const ATTESTATIONS_ANOMALY_RATIO: f64 = 0.80;
/// Typical attestation share used as a replacement.
pub const ATTESTATIONS_ESTIMATE_RATIO: f64 = 0.25;

/// A single detect/correct rule for misreported component sizes.
pub trait AnomalyRule: Send + Sync + fmt::Debug {
    /// Short identifier used in logs and [`Correction`] records.
    fn name(&self) -> &str;

    /// Whether the map shows this anomaly.
    fn detect(&self, components: &ComponentMap, ssz_size: u64) -> bool;

    /// Rewrite the map in place.
    fn correct(&self, components: &mut ComponentMap, ssz_size: u64);
}

/// Replace one component with a fixed share of the block when it claims too much of it.
#[derive(Clone, Debug, PartialEq)]
pub struct ThresholdRule {
    pub component: BlockComponent,
    /// `value >= ssz_size * detect_ratio` triggers the rule.
    pub detect_ratio: f64,
    /// Replacement is `ssz_size * replacement_ratio`.
    pub replacement_ratio: f64,
}

impl ThresholdRule {
    pub fn new(component: BlockComponent, detect_ratio: f64, replacement_ratio: f64) -> Self {
        Self {
            component,
            detect_ratio,
            replacement_ratio,
        }
    }
}

impl AnomalyRule for ThresholdRule {
    fn name(&self) -> &str {
        self.component.name()
    }

    fn detect(&self, components: &ComponentMap, ssz_size: u64) -> bool {
        ssz_size > 0
            && components.contains(self.component)
            && components.get(self.component) as f64 >= ssz_size as f64 * self.detect_ratio
    }

    fn correct(&self, components: &mut ComponentMap, ssz_size: u64) {
        let estimate = (ssz_size as f64 * self.replacement_ratio).round() as u64;
        components.insert(self.component, estimate);
    }
}

/// Ordered list of anomaly rules, applied first to last.
#[derive(Debug)]
pub struct AnomalyPolicy {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl AnomalyPolicy {
    /// A policy that corrects nothing.
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// The two observed upstream misreports: execution payload and attestations.
    pub fn empirical() -> Self {
        Self::none()
            .with_rule(ThresholdRule::new(
                BlockComponent::ExecutionPayload,
                EXECUTION_PAYLOAD_ANOMALY_RATIO,
                EXECUTION_PAYLOAD_ESTIMATE_RATIO,
            ))
            .with_rule(ThresholdRule::new(
                BlockComponent::Attestations,
                ATTESTATIONS_ANOMALY_RATIO,
                ATTESTATIONS_ESTIMATE_RATIO,
            ))
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: impl AnomalyRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every matching rule, returning the names of those that fired.
    pub fn apply(&self, components: &mut ComponentMap, ssz_size: u64) -> Vec<String> {
        let mut fired = Vec::new();
        for rule in &self.rules {
            if rule.detect(components, ssz_size) {
                rule.correct(components, ssz_size);
                fired.push(rule.name().to_string());
            }
        }
        fired
    }
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self::empirical()
    }
}

/// What the normalizer changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    /// An anomaly rule replaced a value.
    Anomaly { rule: String },
    /// A value larger than the block was clamped.
    Clamped {
        component: BlockComponent,
        from: u64,
        to: u64,
    },
    /// All values were scaled down to fit the block.
    Rescaled { from_total: u64, to_total: u64 },
}

/// Corrected component sizes of one block.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedComponents {
    pub components: ComponentMap,
    /// Sum of corrected values; the denominator for percentages.
    pub total: u64,
    pub corrections: Vec<Correction>,
}

impl NormalizedComponents {
    /// Share of the corrected sum, in percent. Zero when the map is empty.
    pub fn percentage(&self, component: BlockComponent) -> f64 {
        percentage_of(self.components.get(component), self.total)
    }

    /// Percentages for every reported component, in canonical order.
    pub fn percentages(&self) -> Vec<(BlockComponent, f64)> {
        self.components
            .iter()
            .map(|(c, v)| (c, percentage_of(v, self.total)))
            .collect()
    }

    pub fn was_corrected(&self) -> bool {
        !self.corrections.is_empty()
    }
}

/// `value / total * 100`, guarded against an empty total.
pub fn percentage_of(value: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        value as f64 / total as f64 * 100.0
    }
}

/// Normalizer bound to an anomaly policy.
#[derive(Debug, Default)]
pub struct ComponentNormalizer {
    policy: AnomalyPolicy,
}

impl ComponentNormalizer {
    pub fn new(policy: AnomalyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AnomalyPolicy {
        &self.policy
    }

    /// Correct a raw component map against the block's SSZ size.
    pub fn normalize(&self, raw: &ComponentMap, ssz_size: u64) -> NormalizedComponents {
        let mut components = raw.clone();
        let mut corrections = Vec::new();

        for rule in self.policy.apply(&mut components, ssz_size) {
            debug!(rule = %rule, ssz_size, "Replaced anomalous component size");
            corrections.push(Correction::Anomaly { rule });
        }

        let clamped: Vec<(BlockComponent, u64)> = components
            .iter()
            .filter(|(_, v)| *v > ssz_size)
            .collect();
        for (component, from) in clamped {
            components.insert(component, ssz_size);
            corrections.push(Correction::Clamped {
                component,
                from,
                to: ssz_size,
            });
        }

        let sum = components.total();
        if sum > ssz_size {
            let factor = ssz_size as f64 / sum as f64;
            for value in components.values_mut() {
                *value = (*value as f64 * factor).round() as u64;
            }
            trim_overshoot(&mut components, ssz_size);
            let to_total = components.total();
            debug!(from_total = sum, to_total, ssz_size, "Rescaled component sizes");
            corrections.push(Correction::Rescaled {
                from_total: sum,
                to_total,
            });
        }

        let total = components.total();
        NormalizedComponents {
            components,
            total,
            corrections,
        }
    }
}

/// Normalize with the empirical anomaly policy.
pub fn normalize_components(raw: &ComponentMap, ssz_size: u64) -> NormalizedComponents {
    ComponentNormalizer::default().normalize(raw, ssz_size)
}

/// Take rounding overshoot off the largest components until `Σ ≤ limit`.
fn trim_overshoot(components: &mut ComponentMap, limit: u64) {
    let mut excess = components.total().saturating_sub(limit);
    while excess > 0 {
        let Some((largest, value)) = components
            .iter()
            .filter(|(_, v)| *v > 0)
            .max_by_key(|(_, v)| *v)
        else {
            break;
        };
        let cut = excess.min(value);
        components.insert(largest, value - cut);
        excess -= cut;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(BlockComponent, u64)]) -> ComponentMap {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_overcounted_execution_payload_is_replaced() {
        let raw = map(&[
            (BlockComponent::ExecutionPayload, 97_000),
            (BlockComponent::Attestations, 10_000),
            (BlockComponent::SyncAggregate, 64),
        ]);

        let normalized = normalize_components(&raw, 100_000);

        assert_eq!(
            normalized.components.get(BlockComponent::ExecutionPayload),
            65_000
        );
        assert_eq!(normalized.components.get(BlockComponent::Attestations), 10_000);
        assert_eq!(normalized.total, 75_064);
        assert_eq!(
            normalized.corrections,
            vec![Correction::Anomaly {
                rule: "execution_payload".into()
            }]
        );
    }

    #[test]
    fn test_overcounted_attestations_are_replaced() {
        let raw = map(&[
            (BlockComponent::ExecutionPayload, 10_000),
            (BlockComponent::Attestations, 85_000),
        ]);

        let normalized = normalize_components(&raw, 100_000);

        assert_eq!(normalized.components.get(BlockComponent::Attestations), 25_000);
        assert_eq!(normalized.total, 35_000);
    }

    #[test]
    fn test_below_threshold_is_untouched() {
        let raw = map(&[
            (BlockComponent::ExecutionPayload, 94_000),
            (BlockComponent::Attestations, 5_000),
        ]);

        let normalized = normalize_components(&raw, 100_000);

        assert_eq!(normalized.components, raw);
        assert!(!normalized.was_corrected());
    }

    #[test]
    fn test_oversized_field_is_clamped_then_rescaled() {
        let raw = map(&[
            (BlockComponent::ExecutionPayload, 50_000),
            (BlockComponent::Deposits, 250_000),
        ]);

        let normalized = normalize_components(&raw, 100_000);

        assert!(normalized.total <= 100_000);
        assert!(normalized
            .corrections
            .iter()
            .any(|c| matches!(c, Correction::Clamped { component: BlockComponent::Deposits, .. })));
        assert!(normalized
            .corrections
            .iter()
            .any(|c| matches!(c, Correction::Rescaled { .. })));
        // 50k : 100k after clamping -> one third / two thirds of the block
        assert_eq!(normalized.components.get(BlockComponent::ExecutionPayload), 33_333);
        assert_eq!(normalized.components.get(BlockComponent::Deposits), 66_667);
    }

    #[test]
    fn test_rescale_rounding_never_exceeds_block() {
        // 10/3 each rounds down, leaving the total just under the block
        let raw = map(&[
            (BlockComponent::Deposits, 5),
            (BlockComponent::VoluntaryExits, 5),
            (BlockComponent::ProposerSlashings, 5),
        ]);

        let normalized = normalize_components(&raw, 10);

        assert!(normalized.total <= 10);
        assert!(normalized.total >= 9);

        // 0.5 rounds up for both entries and has to be trimmed back
        let raw = map(&[
            (BlockComponent::Deposits, 1),
            (BlockComponent::VoluntaryExits, 1),
        ]);
        let normalized = normalize_components(&raw, 1);
        assert_eq!(normalized.total, 1);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let raw = map(&[
            (BlockComponent::ExecutionPayload, 60_000),
            (BlockComponent::Attestations, 20_000),
            (BlockComponent::SyncAggregate, 64),
            (BlockComponent::BlobKzgCommitments, 288),
        ]);

        let normalized = normalize_components(&raw, 90_000);
        let sum: f64 = normalized.percentages().iter().map(|(_, p)| p).sum();

        assert!((sum - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_empty_map_yields_zero_percentages() {
        let normalized = normalize_components(&ComponentMap::new(), 100_000);
        assert_eq!(normalized.total, 0);
        assert!(normalized.percentages().is_empty());
        assert_eq!(normalized.percentage(BlockComponent::ExecutionPayload), 0.0);
    }

    #[test]
    fn test_zero_ssz_size_zeroes_everything() {
        let raw = map(&[(BlockComponent::ExecutionPayload, 500)]);
        let normalized = normalize_components(&raw, 0);
        assert_eq!(normalized.total, 0);
        assert_eq!(normalized.percentage(BlockComponent::ExecutionPayload), 0.0);
    }

    #[test]
    fn test_custom_policy_rule() {
        let policy = AnomalyPolicy::none().with_rule(ThresholdRule::new(
            BlockComponent::Deposits,
            0.5,
            0.1,
        ));
        let normalizer = ComponentNormalizer::new(policy);
        let raw = map(&[
            (BlockComponent::ExecutionPayload, 97_000),
            (BlockComponent::Deposits, 110_000),
        ]);

        let normalized = normalizer.normalize(&raw, 200_000);

        // Only the custom rule is active
        assert!(normalized.was_corrected());
        assert_eq!(normalized.components.get(BlockComponent::Deposits), 20_000);
        assert_eq!(normalized.components.get(BlockComponent::ExecutionPayload), 97_000);
        assert_eq!(normalized.total, 117_000);

        // the default policy has no deposit rule, so deposits are only rescaled
        let rescaled = normalize_components(&raw, 200_000);
        assert_eq!(rescaled.components.get(BlockComponent::Deposits), 106_280);
        assert_eq!(rescaled.components.get(BlockComponent::ExecutionPayload), 93_720);
        assert_eq!(rescaled.total, 200_000);
    }
}
