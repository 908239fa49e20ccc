//! # Aggregator
//!
//! Folds a corrected component map into a compact summary: the largest
//! components plus one "Other" bucket that keeps its constituents.

use serde::Serialize;

use crate::domain::{BlockComponent, ComponentMap};

/// Number of components shown individually in a summary.
pub const DEFAULT_TOP_COMPONENTS: usize = 2;

/// Label of the remainder bucket.
pub const OTHER_LABEL: &str = "Other";

/// One slice of a summarized block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SummaryEntry {
    /// A single component.
    Component { component: BlockComponent, value: u64 },
    /// Everything below the top components.
    Other {
        value: u64,
        constituents: Vec<(BlockComponent, u64)>,
    },
}

impl SummaryEntry {
    pub fn name(&self) -> &str {
        match self {
            SummaryEntry::Component { component, .. } => component.label(),
            SummaryEntry::Other { .. } => OTHER_LABEL,
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            SummaryEntry::Component { value, .. } | SummaryEntry::Other { value, .. } => *value,
        }
    }

    pub fn is_other(&self) -> bool {
        matches!(self, SummaryEntry::Other { .. })
    }
}

/// Top-2 plus "Other" summary.
pub fn aggregate_components(components: &ComponentMap) -> Vec<SummaryEntry> {
    aggregate_top(components, DEFAULT_TOP_COMPONENTS)
}

/// Keep the `top` largest components and fold the rest into "Other".
///
/// Equal sizes keep canonical field order, and so do the constituents of
/// "Other". "Other" is omitted when its total is zero. Output values always sum to `components.total()`.
pub fn aggregate_top(components: &ComponentMap, top: usize) -> Vec<SummaryEntry> {
    let mut ranked: Vec<(BlockComponent, u64)> = components.iter().collect();
    // stable sort keeps field order for ties
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let split = top.min(ranked.len());
    let mut rest = ranked.split_off(split);
    // constituents are listed in field order
    rest.sort_by_key(|(component, _)| *component);

    let mut summary: Vec<SummaryEntry> = ranked
        .into_iter()
        .map(|(component, value)| SummaryEntry::Component { component, value })
        .collect();

    let other_total: u64 = rest.iter().map(|(_, v)| v).sum();
    if other_total > 0 {
        summary.push(SummaryEntry::Other {
            value: other_total,
            constituents: rest.into_iter().filter(|(_, v)| *v > 0).collect(),
        });
    }

    debug_assert_eq!(
        summary.iter().map(SummaryEntry::value).sum::<u64>(),
        components.total()
    );
    summary
}
