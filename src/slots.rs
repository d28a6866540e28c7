use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{planner::ScheduleSegment, prelude::*};

pub const SLOT_COUNT: usize = 50;

/// Default target state-of-charge for slots that do not carry a meaningful one.
pub const NEUTRAL_SOC: u8 = 50;

/// Battery action for one schedule window.
#[derive(
    Debug,
    Default,
    Hash,
    clap::ValueEnum,
    enumset::EnumSetType,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum SlotState {
    /// Forced charging from the grid.
    #[display("charge")]
    Charge,

    /// Forced discharging into household consumption.
    #[display("discharge")]
    Discharge,

    /// Forced export to the grid.
    #[display("sell")]
    Sell,

    /// Export only the excess solar production.
    #[display("sell-excess")]
    SellExcess,

    /// Curtail the excess solar production.
    #[display("discard-excess")]
    DiscardExcess,

    /// Hold the battery at its current level.
    #[display("pause")]
    Pause,

    /// End-of-schedule sentinel. The first `off` slot terminates the live
    /// sequence; whatever sits after it is stale residue.
    #[default]
    #[display("off")]
    Off,
}

/// One position of the device schedule.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    // TOML has no null, hence the omitted key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    pub state: SlotState,
    pub active: bool,
    pub soc: u8,
}

impl Default for Slot {
    fn default() -> Self {
        Self { start: None, state: SlotState::Off, active: false, soc: NEUTRAL_SOC }
    }
}

impl Slot {
    pub const fn is_off(&self) -> bool {
        matches!(self.state, SlotState::Off)
    }
}

/// The 50-position schedule the hardware adapter reads from position 1.
///
/// Positions are chronological up to the first `off` slot. A slot runs until
/// the next slot's start, so there are no explicit end times, and a gap
/// between two planned segments simply stretches the earlier one.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotStore(Vec<Slot>);

impl Default for SlotStore {
    fn default() -> Self {
        Self(vec![Slot::default(); SLOT_COUNT])
    }
}

impl SlotStore {
    /// Wipe the whole array back to inactive `off` slots.
    pub fn reset(&mut self) {
        self.0.fill(Slot::default());
    }

    /// Bring a freshly deserialized store back to the fixed capacity.
    pub fn normalize(&mut self) {
        self.0.resize(SLOT_COUNT, Slot::default());
    }

    pub fn get(&self, index: usize) -> &Slot {
        &self.0[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Slot {
        &mut self.0[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.0.iter()
    }

    /// Smallest position holding an `off` slot — the append point for newly
    /// planned segments. `None` means the array is completely occupied.
    pub fn first_free_index(&self) -> Option<usize> {
        self.0.iter().position(Slot::is_off)
    }

    /// Open `steps` positions at `from_index` by moving everything from there
    /// towards the tail. Iterates from the high end downward so that sources
    /// are read before they are overwritten; the last `steps` entries fall off.
    pub fn shift_forward(&mut self, from_index: usize, steps: usize) {
        for index in (from_index..SLOT_COUNT - steps).rev() {
            self.0[index + steps] = self.0[index].clone();
        }
    }

    /// Close `steps` positions at `from_index` by moving the tail towards the
    /// head. The entries at the very end keep their previous content.
    pub fn shift_back(&mut self, from_index: usize, steps: usize) {
        for index in from_index..SLOT_COUNT - steps {
            self.0[index] = self.0[index + steps].clone();
        }
    }

    /// Write the segments sequentially starting at `start_index` and terminate
    /// them with an inactive `off` sentinel carrying the last segment's end.
    ///
    /// Segments that do not fit before the sentinel position are dropped.
    pub fn write_segments(&mut self, start_index: usize, segments: &[ScheduleSegment]) {
        let capacity = SLOT_COUNT - 1 - start_index;
        if segments.len() > capacity {
            warn!(
                n_segments = segments.len(),
                capacity,
                "planned segments exceed the slot array, truncating",
            );
        }
        let segments = &segments[..segments.len().min(capacity)];
        for (offset, segment) in segments.iter().enumerate() {
            self.0[start_index + offset] = Slot {
                start: Some(segment.start),
                state: segment.state,
                active: true,
                soc: segment.soc,
            };
        }
        if let Some(last) = segments.last() {
            let sentinel = &mut self.0[start_index + segments.len()];
            sentinel.start = Some(last.end);
            sentinel.state = SlotState::Off;
            sentinel.active = false;
        }
    }

    /// One-step tick: when position 2's start has passed, position 1 is done,
    /// so the whole array moves down one step. Returns whether it moved.
    pub fn advance_if_expired(&mut self, now: DateTime<Utc>) -> bool {
        match self.0[1].start {
            Some(next_start) if now > next_start => {
                self.shift_back(0, 1);
                true
            }
            _ => false,
        }
    }
}
