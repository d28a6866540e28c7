//! Price-peak matching: find disjoint price troughs and peaks of the
//! configured widths and pair every peak with a trough that pays for it.

use std::collections::HashSet;

use ordered_float::OrderedFloat;

use crate::{
    config::Config,
    planner::{DayContext, ScheduleSegment, build_segments, quarter_count},
    prelude::*,
    prices::PricePoint,
    slots::SlotState,
};

pub fn plan_day(
    prices: &[PricePoint],
    config: &Config,
    _context: &DayContext,
) -> Vec<ScheduleSegment> {
    let values: Vec<f64> = prices.iter().map(|point| point.value).collect();
    let charge_width = quarter_count(config.price_peak_nr_of_charge_hours);
    let discharge_width = quarter_count(config.price_peak_nr_of_discharge_hours);

    let discharge_periods = WindowSearch::builder()
        .prices(&values)
        .window_size(discharge_width)
        .guard_size(charge_width)
        .find_cheap(false)
        .build()
        .select();
    debug!(?discharge_periods);
    let charge_periods = WindowSearch::builder()
        .prices(&values)
        .window_size(charge_width)
        .guard_size(discharge_width)
        .find_cheap(true)
        .build()
        .select();
    debug!(?charge_periods);

    let matched = match_periods(
        &values,
        charge_periods,
        discharge_periods,
        config.price_peak_efficiency_factor / 100.0,
    );
    info!(n_pairs = matched.len(), "matched charge/discharge periods");

    let mut labels: Vec<Option<(SlotState, u8)>> =
        vec![Some((config.price_peak_inbetween_state, 100)); values.len()];
    for (charge, discharge) in &matched {
        for &index in charge {
            labels[index] = Some((config.price_peak_cheap_state, 100));
        }
        for &index in discharge {
            labels[index] = Some((config.price_peak_expensive_state, 0));
        }
    }
    build_segments(prices, &labels)
}

/// Greedy best-window-first search for disjoint extremum windows.
#[derive(bon::Builder)]
struct WindowSearch<'a> {
    prices: &'a [f64],

    /// Width of the windows being collected, in quarter-hours.
    window_size: usize,

    /// Width of the opposite window type: blocked around every selection so
    /// that charge and discharge windows cannot end up adjacent.
    guard_size: usize,

    /// Cheapest-first (charge) or most-expensive-first (discharge).
    find_cheap: bool,
}

impl WindowSearch<'_> {
    /// Whether extending over `value` moves away from the extremum.
    fn worse(&self, value: f64, price: f64) -> bool {
        if self.find_cheap { value < price } else { value > price }
    }

    fn select(&self) -> Vec<Vec<usize>> {
        if self.window_size == 0 {
            return Vec::new();
        }
        let Some(last_start) = self.prices.len().checked_sub(self.window_size) else {
            return Vec::new();
        };

        // Candidate windows by aggregate price. A window touching an
        // unquotable `+∞` price is never a candidate.
        let mut candidates: Vec<(f64, usize)> = (0..=last_start)
            .filter_map(|start| {
                let window = &self.prices[start..start + self.window_size];
                window
                    .iter()
                    .all(|value| value.is_finite())
                    .then(|| (window.iter().sum::<f64>(), start))
            })
            .collect();
        if self.find_cheap {
            candidates.sort_by(|a, b| OrderedFloat(a.0).cmp(&OrderedFloat(b.0)));
        } else {
            candidates.sort_by(|a, b| OrderedFloat(b.0).cmp(&OrderedFloat(a.0)));
        }

        let mut used: HashSet<usize> = HashSet::new();
        let mut anchors = Vec::new();
        for (_, start) in candidates {
            if (start..start + self.window_size).any(|index| used.contains(&index)) {
                continue;
            }
            self.expand_backward(&mut used, start);
            used.extend(
                start.saturating_sub(self.guard_size)
                    ..(start + self.window_size + self.guard_size).min(self.prices.len()),
            );
            self.expand_forward(&mut used, start);
            anchors.push(start);
        }
        anchors.into_iter().map(|anchor| self.refine(anchor)).collect()
    }

    /// Walk away from the window while prices keep the extremum's flank going,
    /// tolerating at most two unfavourable quarter-hours in a row.
    fn expand_backward(&self, used: &mut HashSet<usize>, start: usize) {
        let mut price = self.prices[start];
        let mut step = 0;
        loop {
            step += 1;
            if step > start {
                break;
            }
            let index = start - step;
            if self.worse(self.prices[index], price) {
                if index < 1 {
                    break;
                }
                if self.worse(self.prices[index - 1], price) {
                    if index < 2 {
                        break;
                    }
                    if self.worse(self.prices[index - 2], price) {
                        break;
                    }
                }
            }
            price = self.prices[index];
            used.insert(index);
        }
    }

    fn expand_forward(&self, used: &mut HashSet<usize>, start: usize) {
        let window_end = start + self.window_size;
        if window_end >= self.prices.len() {
            return;
        }
        let mut price = self.prices[window_end];
        let mut step = 0;
        loop {
            step += 1;
            let index = window_end + step;
            if index >= self.prices.len() {
                break;
            }
            if self.worse(self.prices[index], price) {
                if index + 1 >= self.prices.len() {
                    break;
                }
                if self.worse(self.prices[index + 1], price) {
                    if index + 2 >= self.prices.len() {
                        break;
                    }
                    if self.worse(self.prices[index + 2], price) {
                        break;
                    }
                }
            }
            price = self.prices[index];
            used.insert(index);
        }
    }

    /// Re-pick the window's quarter-hours as the best ones within half an
    /// hour of context around the anchor, to capture the true extremum span.
    fn refine(&self, anchor: usize) -> Vec<usize> {
        const CONTEXT: usize = 2;
        let low = anchor.saturating_sub(CONTEXT);
        let high = (anchor + self.window_size + CONTEXT).min(self.prices.len());
        let mut indices: Vec<usize> =
            (low..high).filter(|&index| self.prices[index].is_finite()).collect();
        if self.find_cheap {
            indices.sort_by(|&a, &b| {
                OrderedFloat(self.prices[a]).cmp(&OrderedFloat(self.prices[b]))
            });
        } else {
            indices.sort_by(|&a, &b| {
                OrderedFloat(self.prices[b]).cmp(&OrderedFloat(self.prices[a]))
            });
        }
        indices.truncate(self.window_size);
        indices.sort_unstable();
        indices
    }
}

/// Pair every discharge period with the best preceding charge period whose
/// average price beats it by at least the efficiency factor.
#[expect(clippy::cast_precision_loss)]
fn match_periods(
    prices: &[f64],
    mut charge_periods: Vec<Vec<usize>>,
    mut discharge_periods: Vec<Vec<usize>>,
    efficiency_factor: f64,
) -> Vec<(Vec<usize>, Vec<usize>)> {
    // Drop periods overlapping an earlier-ranked one, alternating between the
    // two kinds in selection order.
    let mut claimed = vec![false; prices.len()];
    for rank in 0..charge_periods.len().max(discharge_periods.len()) {
        if let Some(period) = charge_periods.get_mut(rank) {
            claim(&mut claimed, period);
        }
        if let Some(period) = discharge_periods.get_mut(rank) {
            claim(&mut claimed, period);
        }
    }
    charge_periods.retain(|period| !period.is_empty());
    discharge_periods.retain(|period| !period.is_empty());

    let average = |period: &[usize]| {
        period.iter().map(|&index| prices[index]).sum::<f64>() / period.len() as f64
    };

    // Candidate charge periods per discharge period: entirely before it and
    // cheap enough to be worth the round trip.
    let candidates: Vec<Vec<usize>> = discharge_periods
        .iter()
        .map(|discharge| {
            let discharge_average = average(discharge);
            charge_periods
                .iter()
                .enumerate()
                .filter(|(_, charge)| {
                    charge.last().unwrap() < discharge.first().unwrap()
                        && average(charge) * efficiency_factor <= discharge_average
                })
                .map(|(index, _)| index)
                .collect()
        })
        .collect();

    // Contested charge periods go to the discharge period with the fewest
    // alternatives, ties to the highest own average.
    let mut order: Vec<usize> = (0..discharge_periods.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[a].len().cmp(&candidates[b].len()).then_with(|| {
            OrderedFloat(average(&discharge_periods[b]))
                .cmp(&OrderedFloat(average(&discharge_periods[a])))
        })
    });

    let mut assigned = vec![false; charge_periods.len()];
    let mut pairs = Vec::new();
    for discharge_index in order {
        let best = candidates[discharge_index]
            .iter()
            .copied()
            .filter(|&charge_index| !assigned[charge_index])
            .min_by_key(|&charge_index| {
                (OrderedFloat(average(&charge_periods[charge_index])), charge_index)
            });
        if let Some(charge_index) = best {
            assigned[charge_index] = true;
            pairs.push((
                charge_periods[charge_index].clone(),
                discharge_periods[discharge_index].clone(),
            ));
        }
    }
    pairs.sort_by_key(|(charge, _)| charge[0]);
    pairs
}

/// Claim the period's indices, or empty the period when one of them is taken.
/// Indices claimed before the conflict stay claimed.
fn claim(claimed: &mut [bool], period: &mut Vec<usize>) {
    for position in 0..period.len() {
        let index = period[position];
        if claimed[index] {
            period.clear();
            return;
        }
        claimed[index] = true;
    }
}
