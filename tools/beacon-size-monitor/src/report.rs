//! Plain-text rendering of a dashboard snapshot.

use std::fmt;

use beacon_size_engine::algorithms::percentage_of;
use beacon_size_engine::{BlockView, CircuitState, DashboardSnapshot, QueryPhase, SlotBlobView};
use chrono::{TimeZone, Utc};

/// One frame of the text report.
pub struct Report<'a>(pub &'a DashboardSnapshot);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        writeln!(f, "{}", header(snapshot))?;

        match &snapshot.latest {
            Some(view) => {
                writeln!(f, "Latest  {}", block_line(view))?;
                writeln!(f, "        {}", summary_line(view))?;
            }
            None => writeln!(f, "Latest  {}", phase_placeholder(snapshot.phases.latest))?,
        }

        writeln!(f, "\nBlocks ({})", phase_label(snapshot.phases.blocks))?;
        if snapshot.blocks.is_empty() {
            writeln!(f, "  {}", phase_placeholder(snapshot.phases.blocks))?;
        }
        for view in snapshot.blocks.iter().rev() {
            writeln!(f, "  {}  {}", block_line(view), summary_line(view))?;
        }

        writeln!(
            f,
            "\nBlobs ({}, fees {})",
            phase_label(snapshot.phases.blobs),
            phase_label(snapshot.phases.fees)
        )?;
        if snapshot.blob_slots.is_empty() {
            writeln!(f, "  {}", phase_placeholder(snapshot.phases.blobs))?;
        }
        for view in snapshot.blob_slots.iter().rev() {
            writeln!(f, "  {}", blob_line(view))?;
        }

        if !snapshot.errors.is_empty() {
            writeln!(f, "\nErrors")?;
            for error in &snapshot.errors {
                writeln!(f, "  {}", error)?;
            }
        }
        Ok(())
    }
}

/// Render one frame.
pub fn render(snapshot: &DashboardSnapshot) -> String {
    Report(snapshot).to_string()
}

fn header(snapshot: &DashboardSnapshot) -> String {
    let origin = if snapshot.synthetic { "SYNTHETIC" } else { "LIVE" };
    let circuit = match snapshot.circuit {
        CircuitState::Closed => format!("circuit closed ({} failures)", snapshot.consecutive_failures),
        CircuitState::Open => "circuit OPEN, reset to retry upstream".to_string(),
    };
    let next_poll = snapshot
        .next_poll_secs
        .map_or_else(|| "auto refresh off".to_string(), |s| format!("next poll in {}s", s));
    format!(
        "Slots {}  [{}]  {}  {}",
        snapshot.range, origin, circuit, next_poll
    )
}

fn block_line(view: &BlockView) -> String {
    let block = &view.block;
    let time = i64::try_from(block.timestamp)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "slot {:>9}  {}  {:>9} ssz  {:>9} snappy ({:.2})",
        block.slot,
        time,
        format_bytes(block.ssz_size),
        format_bytes(block.snappy_size),
        block.compression_ratio
    )
}

fn summary_line(view: &BlockView) -> String {
    view.summary
        .iter()
        .map(|entry| {
            format!(
                "{} {:.1}%",
                entry.name(),
                percentage_of(entry.value(), view.normalized.total)
            )
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn blob_line(view: &SlotBlobView) -> String {
    let fee = view
        .fee
        .as_ref()
        .map_or_else(|| "-".to_string(), |f| format!("{} gwei", f.blob_base_fee));
    match &view.blobs {
        Some(blobs) if !blobs.is_empty() => format!(
            "slot {:>9}  {} blobs  {:>9} -> {:>9} ({:.2})  fee {}",
            view.slot,
            blobs.count,
            format_bytes(blobs.total_size),
            format_bytes(blobs.total_compressed_size),
            blobs.avg_compression_ratio,
            fee
        ),
        Some(_) => format!("slot {:>9}  no blobs  fee {}", view.slot, fee),
        None => format!("slot {:>9}  blobs unknown  fee {}", view.slot, fee),
    }
}

fn phase_label(phase: QueryPhase) -> &'static str {
    match phase {
        QueryPhase::Empty => "empty",
        QueryPhase::Loading => "loading",
        QueryPhase::Ready => "ready",
        QueryPhase::Refreshing => "refreshing",
    }
}

fn phase_placeholder(phase: QueryPhase) -> &'static str {
    match phase {
        QueryPhase::Loading | QueryPhase::Refreshing => "loading...",
        QueryPhase::Empty | QueryPhase::Ready => "no data",
    }
}

/// Human readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["B", "KB", "MB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
