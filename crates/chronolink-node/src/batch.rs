//! Time-slot and harness-range planning for configure batches.

use serde::Serialize;

/// Where one device sits in a configured batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotAssignment {
    pub time_slot: u8,
    /// Sum of every device's count in the batch.
    pub total: u16,
    /// First pin of this device in the shared numbering.
    pub start: u16,
    /// This device's own count.
    pub count: u16,
    pub is_last: bool,
}

/// Largest batch that fits the one-byte time slot.
pub const MAX_BATCH: usize = u8::MAX as usize + 1;

/// Assign slots and pin ranges in submission order.
///
/// Returns `None` for batches larger than [`MAX_BATCH`]. Totals saturate at
/// `u16::MAX`.
pub fn plan_slots(counts: &[u16]) -> Option<Vec<SlotAssignment>> {
    if counts.len() > MAX_BATCH {
        return None;
    }

    let total = counts.iter().fold(0u16, |acc, &n| acc.saturating_add(n));
    let last = counts.len().saturating_sub(1);
    let mut start = 0u16;
    let mut plan = Vec::with_capacity(counts.len());
    for (index, &count) in counts.iter().enumerate() {
        plan.push(SlotAssignment {
            time_slot: u8::try_from(index).ok()?,
            total,
            start,
            count,
            is_last: index == last,
        });
        start = start.saturating_add(count);
    }
    Some(plan)
}
