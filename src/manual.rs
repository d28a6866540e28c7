//! User-authored override windows, folded into the computed schedule on
//! every planning cycle.

use chrono::{DateTime, Utc};
use enumset::{EnumSet, enum_set};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::PlannerError,
    prelude::*,
    slots::{NEUTRAL_SOC, SLOT_COUNT, Slot, SlotState, SlotStore},
};

/// States a manual slot may carry — everything except the sentinel.
pub const MANUAL_STATES: EnumSet<SlotState> = enum_set!(
    SlotState::Charge
        | SlotState::Discharge
        | SlotState::Sell
        | SlotState::SellExcess
        | SlotState::DiscardExcess
        | SlotState::Pause
);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualSlotEntry {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: SlotState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub soc: Option<u8>,
}

impl ManualSlotEntry {
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.start >= self.end {
            return Err(PlannerError::Validation(format!(
                "manual slot must start before it ends, got {}..{}",
                self.start, self.end,
            )));
        }
        if !MANUAL_STATES.contains(self.state) {
            return Err(PlannerError::Validation(format!(
                "`{}` is not a valid manual slot state",
                self.state,
            )));
        }
        Ok(())
    }

    /// Explicit SOC, or the state's default. `sell` has no sensible default —
    /// `None` means the entry cannot be applied.
    fn resolve_soc(&self, config: &Config) -> Option<u8> {
        let soc = match self.soc {
            Some(soc) => soc,
            None => match self.state {
                SlotState::Charge | SlotState::Pause => config.battery_max_soc,
                SlotState::SellExcess => config.battery_shutdown_soc,
                SlotState::Discharge | SlotState::DiscardExcess => NEUTRAL_SOC,
                SlotState::Sell | SlotState::Off => return None,
            },
        };
        Some(config.clamp_soc(soc))
    }
}

/// Splice the manual entries into the store.
///
/// Entries are processed in storage order, not time order: a later entry can
/// shift the indices an earlier one settled on, so out-of-chronology lists
/// merge exactly the way they were entered. Re-running with unchanged entries
/// and an unchanged computed schedule is a no-op.
#[instrument(skip_all, fields(n_entries = entries.len()))]
pub fn add_manual_slots(store: &mut SlotStore, entries: &[ManualSlotEntry], config: &Config) {
    for entry in entries {
        let Some(soc) = entry.resolve_soc(config) else {
            warn!(start = %entry.start, "manual `sell` slot without an explicit SOC, skipping");
            continue;
        };
        merge_entry(store, entry, soc);
    }
}

#[expect(clippy::cast_possible_wrap)]
fn merge_entry(store: &mut SlotStore, entry: &ManualSlotEntry, soc: u8) {
    let start_index = position_at(store, 0, entry.start);
    let end_index = position_at(store, start_index, entry.end);
    if start_index >= SLOT_COUNT - 2 {
        warn!(start = %entry.start, "no room left in the slot array, skipping manual slot");
        return;
    }
    let end_is_end = store.get(end_index).start == Some(entry.end);

    if start_index == end_index && !end_is_end {
        // The manual window falls strictly inside one existing slot: open two
        // positions, one for the window and one for the tail of the slot it
        // interrupted.
        store.shift_forward(start_index, 2);
        let (resume_state, resume_soc) = if start_index > 0 {
            let covering = store.get(start_index - 1);
            (covering.state, covering.soc)
        } else {
            (SlotState::Off, NEUTRAL_SOC)
        };
        *store.get_mut(start_index) =
            Slot { start: Some(entry.start), state: entry.state, active: true, soc };
        *store.get_mut(start_index + 1) =
            Slot { start: Some(entry.end), state: resume_state, active: true, soc: resume_soc };
    } else {
        let moves =
            end_index as isize - start_index as isize - 2 + isize::from(end_is_end);
        if moves < 0 {
            store.shift_forward(start_index, moves.unsigned_abs());
        } else if moves > 0 {
            store.shift_back(start_index, moves.unsigned_abs());
        }
        store.get_mut(start_index + 1).start = Some(entry.end);
        *store.get_mut(start_index) =
            Slot { start: Some(entry.start), state: entry.state, active: true, soc };
    }
}

/// First position at or after `from` whose start is unset or not before `time`.
fn position_at(store: &SlotStore, from: usize, time: DateTime<Utc>) -> usize {
    (from..SLOT_COUNT)
        .find(|&index| store.get(index).start.is_none_or(|start| start >= time))
        .unwrap_or(SLOT_COUNT - 1)
}
