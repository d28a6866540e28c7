//! Charge on the cheapest quarter-hours of the day, self-use otherwise.

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    config::Config,
    planner::{DayContext, ScheduleSegment, build_segments, quarter_count},
    prices::PricePoint,
    slots::SlotState,
};

pub fn plan_day(
    prices: &[PricePoint],
    config: &Config,
    _context: &DayContext,
) -> Vec<ScheduleSegment> {
    let count = quarter_count(config.cheapest_hours_nr_of_charge_hours);
    let cheapest: Vec<usize> = (0..prices.len())
        .filter(|&index| prices[index].value.is_finite())
        .sorted_by_key(|&index| OrderedFloat(prices[index].value))
        .take(count)
        .collect();

    let labels: Vec<Option<(SlotState, u8)>> = (0..prices.len())
        .map(|index| {
            if cheapest.contains(&index) {
                Some((SlotState::Charge, config.battery_max_soc))
            } else {
                Some((SlotState::Discharge, config.battery_shutdown_soc))
            }
        })
        .collect();
    build_segments(prices, &labels)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    use super::*;
    use crate::planner::tests::quarter_points;

    #[test]
    fn test_charges_on_cheapest_run_and_discharges_around_it() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let prices = quarter_points(start, &[5.0, 1.0, 1.0, 1.0, 1.0, 5.0, 5.0, 5.0]);
        let config = Config {
            cheapest_hours_nr_of_charge_hours: 1.0,
            battery_max_soc: 90,
            battery_shutdown_soc: 20,
            ..Config::default()
        };
        let context = DayContext {
            start_of_day: start,
            timezone: Tz::Europe__Stockholm,
            now: start,
        };
        let segments = plan_day(&prices, &config, &context);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].state, SlotState::Discharge);
        assert_eq!(segments[0].soc, 20);
        assert_eq!(segments[1].state, SlotState::Charge);
        assert_eq!(segments[1].start, prices[1].start);
        assert_eq!(segments[1].end, prices[5].start);
        assert_eq!(segments[1].soc, 90);
        assert_eq!(segments[2].state, SlotState::Discharge);
        assert_eq!(segments[2].end, prices[7].end);
    }

    #[test]
    fn test_never_selects_more_than_available() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let prices = quarter_points(start, &[1.0, 2.0]);
        let config =
            Config { cheapest_hours_nr_of_charge_hours: 5.0, ..Config::default() };
        let context = DayContext {
            start_of_day: start,
            timezone: Tz::Europe__Stockholm,
            now: start,
        };
        let segments = plan_day(&prices, &config, &context);
        // Everything is a charge segment, coalesced into one.
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].state, SlotState::Charge);
    }
}
