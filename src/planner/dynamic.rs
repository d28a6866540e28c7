//! Exploratory strategy driven by the recorded state-of-charge history.
//!
//! Groundwork only: it inspects the history document and plans nothing yet,
//! leaving the schedule to the manual slots. It must never take the planning
//! cycle down with it, so a missing or unreadable document is a logged no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    planner::{DayContext, ScheduleSegment},
    prelude::*,
    prices::PricePoint,
    storage::{SOC_HISTORY, Storage},
};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SocHistoryDocument {
    #[serde(default)]
    pub samples: Vec<SocSample>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SocSample {
    pub time: DateTime<Utc>,
    pub soc: u8,
}

pub fn plan_day(
    storage: &Storage,
    _prices: &[PricePoint],
    _config: &Config,
    _context: &DayContext,
) -> Vec<ScheduleSegment> {
    match storage.read::<SocHistoryDocument>(SOC_HISTORY) {
        Ok(history) => match history.samples.last() {
            Some(last) => info!(
                n_samples = history.samples.len(),
                last_soc = last.soc,
                "SOC history loaded, dynamic planning is not implemented yet",
            ),
            None => info!("no SOC history recorded yet, planning nothing"),
        },
        Err(error) => {
            warn!("failed to load the SOC history, planning nothing: {error:#}");
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Tz;

    use super::*;

    #[test]
    fn test_no_ops_without_a_history_store() {
        let storage = Storage::new(std::env::temp_dir().join("stoat-dynamic-none"));
        let context = DayContext {
            start_of_day: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            timezone: Tz::Europe__Stockholm,
            now: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        };
        let segments = plan_day(&storage, &[], &Config::default(), &context);
        assert!(segments.is_empty());
    }
}
