//! Threshold strategy: charge overnight, discharge during the day.

use itertools::Itertools;
use ordered_float::OrderedFloat;

use crate::{
    config::Config,
    planner::{DayContext, ScheduleSegment, build_segments, quarter_count},
    prices::PricePoint,
    slots::SlotState,
};

/// Split the day at the configured times: the charge window wraps midnight
/// (`[earliest_charge, 24:00) ∪ [00:00, earliest_discharge)`), the discharge
/// window is the complement. Pick the cheapest quarter-hours of the one and
/// the most expensive of the other; unselected charge-window time becomes
/// `pause`, unselected discharge-window time is covered positionally by
/// whatever segment precedes it.
pub fn plan_day(
    prices: &[PricePoint],
    config: &Config,
    context: &DayContext,
) -> Vec<ScheduleSegment> {
    let in_charge_window = |point: &PricePoint| {
        let time = point.start.with_timezone(&context.timezone).time();
        time < config.earliest_discharge_time || time >= config.earliest_charge_time
    };

    let charge_selection = select(
        prices,
        quarter_count(config.basic_nr_of_charge_hours),
        |index| in_charge_window(&prices[index]),
        false,
    );
    let discharge_selection = select(
        prices,
        quarter_count(config.basic_nr_of_discharge_hours),
        |index| !in_charge_window(&prices[index]),
        true,
    );

    let labels: Vec<Option<(SlotState, u8)>> = prices
        .iter()
        .enumerate()
        .map(|(index, point)| {
            if charge_selection.contains(&index) {
                Some((SlotState::Charge, config.battery_max_soc))
            } else if discharge_selection.contains(&index) {
                Some((SlotState::Discharge, config.battery_shutdown_soc))
            } else if in_charge_window(point) {
                Some((SlotState::Pause, config.battery_max_soc))
            } else {
                None
            }
        })
        .collect();
    build_segments(prices, &labels)
}

/// Indices of the `count` best finite-priced quarter-hours within the window.
fn select(
    prices: &[PricePoint],
    count: usize,
    in_window: impl Fn(usize) -> bool,
    most_expensive: bool,
) -> Vec<usize> {
    let candidates = (0..prices.len())
        .filter(|&index| in_window(index) && prices[index].value.is_finite());
    let sorted = if most_expensive {
        candidates
            .sorted_by(|&a, &b| OrderedFloat(prices[b].value).cmp(&OrderedFloat(prices[a].value)))
    } else {
        candidates.sorted_by(|&a, &b| OrderedFloat(prices[a].value).cmp(&OrderedFloat(prices[b].value)))
    };
    sorted.take(count).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc};
    use chrono_tz::Tz;

    use super::*;
    use crate::planner::tests::quarter_points;

    /// 96 quarter-hours, the four cheapest at 02:00–03:00 and the four most
    /// expensive at 17:00–18:00 local time.
    #[test]
    fn test_reference_day() {
        let timezone = Tz::Europe__Stockholm;
        // Local midnight of 2025-06-01 is 2025-05-31T22:00Z.
        let start_of_day = Utc.with_ymd_and_hms(2025, 5, 31, 22, 0, 0).unwrap();
        let mut values = vec![1.0; 96];
        for value in &mut values[8..12] {
            *value = 0.10;
        }
        for value in &mut values[68..72] {
            *value = 3.00;
        }
        let prices = quarter_points(start_of_day, &values);
        let config = Config {
            earliest_charge_time: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            earliest_discharge_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            basic_nr_of_charge_hours: 1.0,
            basic_nr_of_discharge_hours: 1.0,
            battery_max_soc: 100,
            battery_shutdown_soc: 20,
            ..Config::default()
        };
        let context =
            DayContext { start_of_day, timezone, now: start_of_day };

        let segments = plan_day(&prices, &config, &context);

        let charge: Vec<_> =
            segments.iter().filter(|s| s.state == SlotState::Charge).collect();
        assert_eq!(charge.len(), 1);
        assert_eq!(charge[0].start, prices[8].start);
        assert_eq!(charge[0].end, prices[12].start);
        assert_eq!(charge[0].soc, 100);

        let discharge: Vec<_> =
            segments.iter().filter(|s| s.state == SlotState::Discharge).collect();
        assert_eq!(discharge.len(), 1);
        assert_eq!(discharge[0].start, prices[68].start);
        assert_eq!(discharge[0].end, prices[72].start);
        assert_eq!(discharge[0].soc, 20);

        // Pause fills the remainder of the charge window: 00:00–02:00,
        // 03:00–06:00, and the evening 22:00–24:00 stretch.
        let pauses: Vec<_> =
            segments.iter().filter(|s| s.state == SlotState::Pause).collect();
        assert_eq!(pauses.len(), 3);
        assert_eq!(pauses[0].start, prices[0].start);
        assert_eq!(pauses[0].end, prices[8].start);
        assert_eq!(pauses[1].start, prices[12].start);
        assert_eq!(pauses[1].end, prices[24].start);
        assert_eq!(pauses[2].start, prices[88].start);
        assert_eq!(pauses[2].end, prices[95].end);
        assert!(pauses.iter().all(|s| s.soc == 100));
    }

    #[test]
    fn test_selection_is_bounded_by_window_size() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let prices = quarter_points(start, &[1.0, 2.0, 3.0, 4.0]);
        let selected = select(&prices, 100, |_| true, false);
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn test_infinite_price_is_never_selected() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let prices = quarter_points(start, &[f64::INFINITY, 2.0, 3.0]);
        assert_eq!(select(&prices, 3, |_| true, false), vec![1, 2]);
        // Defensively excluded from the expensive side as well.
        assert_eq!(select(&prices, 3, |_| true, true), vec![2, 1]);
    }
}
