use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::{area::Area, error::PlannerError, planner::Strategy, slots::SlotState};

/// Per-install planner settings.
///
/// Owned by the surrounding platform: persisted as its own document, edited
/// through the entity layer, and read-only for the strategies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Price zone; planning refuses to start without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<Area>,

    pub currency: String,

    pub strategy: Strategy,

    /// Evening time-of-day from which charging may start.
    pub earliest_charge_time: NaiveTime,

    /// Morning time-of-day from which discharging may start.
    pub earliest_discharge_time: NaiveTime,

    pub basic_nr_of_charge_hours: f64,
    pub basic_nr_of_discharge_hours: f64,

    pub cheapest_hours_nr_of_charge_hours: f64,

    pub price_peak_nr_of_charge_hours: f64,
    pub price_peak_nr_of_discharge_hours: f64,

    /// Round-trip efficiency in percent: a charge window is only worth pairing
    /// with a discharge window when `charge_avg × factor ≤ discharge_avg`.
    pub price_peak_efficiency_factor: f64,

    pub price_peak_cheap_state: SlotState,
    pub price_peak_expensive_state: SlotState,
    pub price_peak_inbetween_state: SlotState,

    pub battery_max_soc: u8,

    /// SOC below which the inverter shuts the battery down.
    pub battery_shutdown_soc: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            area: None,
            currency: "EUR".to_string(),
            strategy: Strategy::Basic,
            earliest_charge_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            earliest_discharge_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            basic_nr_of_charge_hours: 2.0,
            basic_nr_of_discharge_hours: 2.0,
            cheapest_hours_nr_of_charge_hours: 3.0,
            price_peak_nr_of_charge_hours: 2.0,
            price_peak_nr_of_discharge_hours: 2.0,
            price_peak_efficiency_factor: 85.0,
            price_peak_cheap_state: SlotState::Charge,
            price_peak_expensive_state: SlotState::Discharge,
            price_peak_inbetween_state: SlotState::Pause,
            battery_max_soc: 100,
            battery_shutdown_soc: 20,
        }
    }
}

impl Config {
    pub fn area(&self) -> Result<&Area, PlannerError> {
        self.area.as_ref().ok_or(PlannerError::ConfigurationMissing("area"))
    }

    pub fn clamp_soc(&self, soc: u8) -> u8 {
        soc.clamp(self.battery_shutdown_soc, self.battery_max_soc)
    }
}
