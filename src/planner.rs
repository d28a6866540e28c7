pub mod basic;
pub mod cheapest_hours;
pub mod dynamic;
pub mod price_peak;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{
    config::Config,
    prelude::*,
    prices::PricePoint,
    slots::SlotState,
    storage::Storage,
};

/// Interchangeable day-planning algorithm.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    Hash,
    PartialEq,
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Fixed charge/discharge windows around the configured times of day.
    #[default]
    #[display("basic")]
    Basic,

    /// Charge on the cheapest quarter-hours, self-use otherwise.
    #[display("cheapest-hours")]
    CheapestHours,

    /// Match price troughs against the peaks they should pay for.
    #[display("price-peak")]
    PricePeak,

    /// Exploratory consumption-history-driven planning.
    #[display("dynamic")]
    Dynamic,
}

/// One planned window: ephemeral strategy output, chronological and
/// non-overlapping. A gap before the next segment is legal — the positional
/// slot store stretches the earlier segment over it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduleSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub state: SlotState,
    pub soc: u8,
}

/// The day being planned.
#[derive(Clone, Copy, Debug)]
pub struct DayContext {
    /// Local midnight of the planned day.
    pub start_of_day: DateTime<Utc>,
    pub timezone: Tz,
    pub now: DateTime<Utc>,
}

/// Run the selected strategy over one day's prices.
#[instrument(skip_all, fields(%strategy, n_prices = prices.len()))]
pub fn plan_day(
    strategy: Strategy,
    prices: &[PricePoint],
    config: &Config,
    context: &DayContext,
    storage: &Storage,
) -> Vec<ScheduleSegment> {
    let segments = match strategy {
        Strategy::Basic => basic::plan_day(prices, config, context),
        Strategy::CheapestHours => cheapest_hours::plan_day(prices, config, context),
        Strategy::PricePeak => price_peak::plan_day(prices, config, context),
        Strategy::Dynamic => dynamic::plan_day(storage, prices, config, context),
    };
    let segments = drop_passed(segments, context.now);
    info!(n_segments = segments.len(), "planned");
    segments
}

/// Shared post-processing: segments fully in the past are of no use.
fn drop_passed(mut segments: Vec<ScheduleSegment>, now: DateTime<Utc>) -> Vec<ScheduleSegment> {
    segments.retain(|segment| segment.end > now);
    segments
}

/// Quarter-hours corresponding to the configured number of hours.
#[expect(clippy::cast_possible_truncation)]
#[expect(clippy::cast_sign_loss)]
pub(crate) fn quarter_count(hours: f64) -> usize {
    (hours * 4.0) as usize
}

/// Turn per-quarter-hour labels into coalesced segments.
///
/// Adjacent labelled points sharing a state merge into one segment; an
/// unlabelled point, or a discontinuity in the price grid, closes the open
/// segment.
pub(crate) fn build_segments(
    points: &[PricePoint],
    labels: &[Option<(SlotState, u8)>],
) -> Vec<ScheduleSegment> {
    let mut segments: Vec<ScheduleSegment> = Vec::new();
    for (point, label) in points.iter().zip(labels) {
        let Some((state, soc)) = *label else {
            continue;
        };
        match segments.last_mut() {
            Some(last) if last.state == state && last.soc == soc && last.end == point.start => {
                last.end = point.end;
            }
            _ => {
                segments.push(ScheduleSegment { start: point.start, end: point.end, state, soc });
            }
        }
    }
    segments
}
