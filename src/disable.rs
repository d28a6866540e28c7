//! Keeping manually disabled windows disabled across a re-plan.

use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    slots::{SLOT_COUNT, SlotState, SlotStore},
};

/// A window the user switched off, keyed by its stringified boundaries.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DisabledRange {
    pub start: String,
    pub end: String,
    pub state: SlotState,
    pub soc: u8,
}

/// Snapshot the disabled windows of the live sequence before a reset.
pub fn store_disable(store: &SlotStore) -> Vec<DisabledRange> {
    let mut ranges = Vec::new();
    for index in 0..SLOT_COUNT - 1 {
        let slot = store.get(index);
        if slot.is_off() {
            break;
        }
        if slot.active {
            continue;
        }
        let (Some(start), Some(end)) = (slot.start, store.get(index + 1).start) else {
            continue;
        };
        ranges.push(DisabledRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            state: slot.state,
            soc: slot.soc,
        });
    }
    ranges
}

/// Re-apply the snapshot onto the freshly planned sequence.
///
/// Matching is exact string equality on both boundaries: a re-plan that lands
/// on a slightly different grid re-enables the window. That is a known
/// limitation of the scheme, not something to paper over with tolerant
/// matching.
pub fn restore_disable(store: &mut SlotStore, ranges: &[DisabledRange]) {
    if ranges.is_empty() {
        return;
    }
    for index in 0..SLOT_COUNT - 1 {
        if store.get(index).is_off() {
            break;
        }
        let (Some(start), Some(end)) = (store.get(index).start, store.get(index + 1).start)
        else {
            continue;
        };
        let (start, end) = (start.to_rfc3339(), end.to_rfc3339());
        if ranges.iter().any(|range| range.start == start && range.end == end) {
            info!(%start, %end, "restoring the disabled flag");
            store.get_mut(index).active = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::*;
    use crate::{planner::ScheduleSegment, slots::SlotState};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    fn segments() -> [ScheduleSegment; 3] {
        [
            ScheduleSegment { start: at(2), end: at(4), state: SlotState::Charge, soc: 100 },
            ScheduleSegment { start: at(4), end: at(17), state: SlotState::Pause, soc: 100 },
            ScheduleSegment { start: at(17), end: at(18), state: SlotState::Discharge, soc: 20 },
        ]
    }

    #[test]
    fn test_survives_identical_replan() {
        let mut store = SlotStore::default();
        store.write_segments(0, &segments());
        store.get_mut(2).active = false;

        let ranges = store_disable(&store);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].state, SlotState::Discharge);

        store.reset();
        store.write_segments(0, &segments());
        assert!(store.get(2).active);
        restore_disable(&mut store, &ranges);
        assert!(!store.get(2).active);
        assert!(store.get(0).active);
        assert!(store.get(1).active);
    }

    #[test]
    fn test_shifted_grid_is_not_restored() {
        let mut store = SlotStore::default();
        store.write_segments(0, &segments());
        store.get_mut(2).active = false;
        let ranges = store_disable(&store);

        store.reset();
        let mut shifted = segments();
        shifted[2].start += TimeDelta::minutes(15);
        shifted[1].end += TimeDelta::minutes(15);
        store.write_segments(0, &shifted);
        restore_disable(&mut store, &ranges);
        // Exact-match only: the moved window comes back enabled.
        assert!(store.get(2).active);
    }

    #[test]
    fn test_ignores_residue_past_the_sentinel() {
        let mut store = SlotStore::default();
        store.write_segments(0, &segments());
        // Stale inactive entry beyond the sentinel.
        store.get_mut(7).start = Some(at(20));
        store.get_mut(7).state = SlotState::Charge;
        store.get_mut(7).active = false;
        assert!(store_disable(&store).is_empty());
    }
}
