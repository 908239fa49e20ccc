//! # Slot Window Arithmetic
//!
//! Parsing user input into a [`SlotRange`], "last N blocks" shortcuts and
//! head tracking.

use crate::domain::{parse_bound, RangeError, RangeField, Slot, SlotRange};

/// Validate a pair of user-supplied bounds.
///
/// Both bounds are always supplied together.
pub fn parse_range(start: &str, end: &str, max_span: u64) -> Result<SlotRange, RangeError> {
    let start = parse_bound(RangeField::Start, start)?;
    let end = parse_bound(RangeField::End, end)?;
    SlotRange::with_max_span(start, end, max_span)
}

/// Window ending at `latest` and reaching `count` slots back.
///
/// `count` is capped at `max_span`; near genesis the window starts at 0.
pub fn last_n_blocks(latest: Slot, count: u64, max_span: u64) -> SlotRange {
    let span = count.min(max_span).min(latest);
    SlotRange::trusted(latest - span, latest)
}

/// Slide `range` forward so it ends at `latest`, keeping its span.
///
/// Returns `None` while the head is still inside (or behind) the window.
pub fn slide_to_head(range: &SlotRange, latest: Slot) -> Option<SlotRange> {
    if latest <= range.end() {
        return None;
    }
    let span = range.span();
    Some(SlotRange::trusted(latest - span, latest))
}
