use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{area::Area, error::PlannerError, prelude::*};

/// One delivery interval's wholesale price.
///
/// Intervals within a series are contiguous and non-overlapping; a price the
/// provider failed to quote as a number is `+∞` — never the cheapest.
#[derive(Clone, Copy, Debug, PartialEq, derive_more::Constructor, Serialize, Deserialize)]
pub struct PricePoint {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub value: f64,
}

/// A day-ahead auction price source, queried per calendar day per area.
#[async_trait]
pub trait DayAheadProvider: Sync {
    /// Fetch one delivery day's series, normalized to [`PricePoint`]s.
    async fn fetch_raw_day(
        &self,
        currency: &str,
        area: &Area,
        date: NaiveDate,
    ) -> Result<Vec<PricePoint>>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct CachedDay {
    date: NaiveDate,
    points: Vec<PricePoint>,
}

/// Per-`(area, date)` cache of normalized day series.
///
/// Rides in the persisted values document, so a restart does not re-query
/// days the auction already published. Ordered keys keep the serialized form
/// stable, which the write-on-change check depends on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceCache(BTreeMap<Area, Vec<CachedDay>>);

impl PriceCache {
    /// Drop entries older than two days.
    pub fn evict(&mut self, today: NaiveDate) {
        let horizon = today - Days::new(2);
        for days in self.0.values_mut() {
            days.retain(|day| day.date >= horizon);
        }
    }

    pub fn get(&self, area: &Area, date: NaiveDate) -> Option<&[PricePoint]> {
        self.0
            .get(area)?
            .iter()
            .find(|day| day.date == date)
            .map(|day| day.points.as_slice())
    }

    pub fn insert(&mut self, area: &Area, date: NaiveDate, points: Vec<PricePoint>) {
        let days = self.0.entry(area.clone()).or_default();
        days.retain(|day| day.date != date);
        days.push(CachedDay { date, points });
    }
}

/// Price series covering the planning horizon: the current local day and,
/// once the auction has published it, the next one.
#[derive(Debug)]
pub struct PriceWindow {
    pub today: Vec<PricePoint>,
    pub tomorrow: Option<Vec<PricePoint>>,
}

/// Concatenate up to three adjacent day series and keep the points whose
/// start falls within the target calendar day in the area's timezone.
///
/// Zero-length points are a spring-forward artefact and are dropped with a
/// notice.
pub fn join_and_slice(
    series: &[Option<&[PricePoint]>],
    target_date: NaiveDate,
    timezone: Tz,
) -> Vec<PricePoint> {
    let mut joined = Vec::new();
    for day in series.iter().flatten() {
        for point in *day {
            if point.start.with_timezone(&timezone).date_naive() != target_date {
                continue;
            }
            if point.start == point.end {
                info!(
                    start = %point.start,
                    "interval has the same start and end, most likely a DST change, excluded",
                );
                continue;
            }
            joined.push(*point);
        }
    }
    joined
}

/// Fetch one day through the cache. A provider failure yields `None` for the
/// day rather than an error; the second element tells whether the result came
/// from the cache.
async fn fetch_day<P: DayAheadProvider>(
    provider: &P,
    cache: &PriceCache,
    currency: &str,
    area: &Area,
    date: NaiveDate,
) -> (Option<Vec<PricePoint>>, bool) {
    if let Some(points) = cache.get(area, date) {
        debug!(%area, %date, "using the cached day-ahead series");
        return (Some(points.to_vec()), true);
    }
    match provider.fetch_raw_day(currency, area, date).await {
        Ok(points) => (Some(points), false),
        Err(error) => {
            warn!(%area, %date, "failed to fetch the day-ahead series: {error:#}");
            (None, false)
        }
    }
}

/// Fetch and normalize the planning horizon.
///
/// The four underlying day fetches run concurrently and all complete before
/// anything else proceeds. A missing series for the current day fails the
/// whole fetch; a missing series for the next day only drops `tomorrow`.
#[instrument(skip_all, fields(%area, %now))]
pub async fn fetch_planning_window<P: DayAheadProvider>(
    provider: &P,
    cache: &mut PriceCache,
    currency: &str,
    area: &Area,
    now: DateTime<Utc>,
) -> Result<PriceWindow, PlannerError> {
    let timezone = area.timezone()?;
    let today = now.with_timezone(&timezone).date_naive();
    cache.evict(today);

    let dates =
        [today - Days::new(1), today, today + Days::new(1), today + Days::new(2)];
    let fetched = tokio::join!(
        fetch_day(provider, cache, currency, area, dates[0]),
        fetch_day(provider, cache, currency, area, dates[1]),
        fetch_day(provider, cache, currency, area, dates[2]),
        fetch_day(provider, cache, currency, area, dates[3]),
    );
    let days = [fetched.0, fetched.1, fetched.2, fetched.3];
    let mut series: Vec<Option<Vec<PricePoint>>> = Vec::with_capacity(days.len());
    for (date, (points, was_cached)) in dates.into_iter().zip(days) {
        if let (Some(points), false) = (&points, was_cached) {
            cache.insert(area, date, points.clone());
        }
        series.push(points);
    }

    if series[1].is_none() {
        return Err(PlannerError::ProviderUnavailable { area: area.clone(), date: today });
    }

    let today_points = join_and_slice(
        &[series[0].as_deref(), series[1].as_deref(), series[2].as_deref()],
        today,
        timezone,
    );
    let tomorrow_points = series[2].as_deref().map(|_| {
        join_and_slice(
            &[series[1].as_deref(), series[2].as_deref(), series[3].as_deref()],
            today + Days::new(1),
            timezone,
        )
    });
    info!(
        n_today = today_points.len(),
        n_tomorrow = tomorrow_points.as_ref().map_or(0, Vec::len),
        "normalized the planning window",
    );
    Ok(PriceWindow { today: today_points, tomorrow: tomorrow_points })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn quarters(start: DateTime<Utc>, values: &[f64]) -> Vec<PricePoint> {
        values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let start = start + chrono::TimeDelta::minutes(15 * index as i64);
                PricePoint::new(start, start + chrono::TimeDelta::minutes(15), *value)
            })
            .collect()
    }

    #[test]
    fn test_join_and_slice_cuts_local_day() {
        let timezone = Tz::Europe__Stockholm;
        // 2025-06-01 in Stockholm runs 2025-05-31T22:00Z..2025-06-01T22:00Z.
        let yesterday = quarters(Utc.with_ymd_and_hms(2025, 5, 31, 21, 30, 0).unwrap(), &[
            1.0, 2.0, 3.0, 4.0,
        ]);
        let today = quarters(Utc.with_ymd_and_hms(2025, 6, 1, 21, 30, 0).unwrap(), &[
            5.0, 6.0, 7.0, 8.0,
        ]);
        let joined = join_and_slice(
            &[Some(&yesterday), Some(&today), None],
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            timezone,
        );
        // The first two of each series belong to the previous local day.
        assert_eq!(joined.len(), 4);
        assert_eq!(joined[0].value, 3.0);
        assert_eq!(joined[3].value, 6.0);
    }

    #[test]
    fn test_join_and_slice_drops_degenerate_points() {
        let timezone = Tz::Europe__Stockholm;
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let series = vec![
            PricePoint::new(start, start, 1.0),
            PricePoint::new(start, start + chrono::TimeDelta::minutes(15), 2.0),
        ];
        let joined = join_and_slice(
            &[Some(&series)],
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            timezone,
        );
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].value, 2.0);
    }

    #[test]
    fn test_cache_evicts_stale_days() {
        let area = Area::new("SE3");
        let mut cache = PriceCache::default();
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        cache.insert(&area, today - Days::new(3), Vec::new());
        cache.insert(&area, today - Days::new(2), Vec::new());
        cache.insert(&area, today, Vec::new());
        cache.evict(today);
        assert!(cache.get(&area, today - Days::new(3)).is_none());
        assert!(cache.get(&area, today - Days::new(2)).is_some());
        assert!(cache.get(&area, today).is_some());
    }
}
