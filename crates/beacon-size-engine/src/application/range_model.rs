//! # Range Model
//!
//! Holds the active slot window. Candidate windows are validated before they
//! are accepted; an accepted window replaces the previous one whole and is
//! broadcast to subscribers. Rejected input leaves the window and subscribers
//! untouched.

use tokio::sync::watch;
use tracing::info;

use crate::algorithms::{last_n_blocks, parse_range, slide_to_head};
use crate::domain::{RangeError, Slot, SlotRange};

/// Active slot window plus change notifications.
#[derive(Debug)]
pub struct RangeModel {
    max_span: u64,
    tx: watch::Sender<SlotRange>,
}

impl RangeModel {
    pub fn new(initial: SlotRange, max_span: u64) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { max_span, tx }
    }

    pub fn current(&self) -> SlotRange {
        *self.tx.borrow()
    }

    pub fn max_span(&self) -> u64 {
        self.max_span
    }

    /// Receiver notified on every accepted change.
    pub fn subscribe(&self) -> watch::Receiver<SlotRange> {
        self.tx.subscribe()
    }

    /// Accept user-entered bounds.
    pub fn submit(&self, start: &str, end: &str) -> Result<SlotRange, RangeError> {
        let range = parse_range(start, end, self.max_span)?;
        self.replace(range);
        Ok(range)
    }

    /// Accept numeric bounds.
    pub fn set(&self, start: Slot, end: Slot) -> Result<SlotRange, RangeError> {
        let range = SlotRange::with_max_span(start, end, self.max_span)?;
        self.replace(range);
        Ok(range)
    }

    /// "Last N blocks" shortcut relative to the latest known slot.
    pub fn select_last(&self, latest: Slot, count: u64) -> SlotRange {
        let range = last_n_blocks(latest, count, self.max_span);
        self.replace(range);
        range
    }

    /// Slide the window so it ends at `latest`, if the head moved past it.
    pub fn follow_head(&self, latest: Slot) -> Option<SlotRange> {
        let range = slide_to_head(&self.current(), latest)?;
        self.replace(range);
        Some(range)
    }

    fn replace(&self, range: SlotRange) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == range {
                return false;
            }
            *current = range;
            true
        });
        if changed {
            info!(%range, "Slot range changed");
        }
    }
}
