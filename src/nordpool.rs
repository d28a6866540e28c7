//! Nord Pool day-ahead auction client.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    area::Area,
    prelude::*,
    prices::{DayAheadProvider, PricePoint},
};

const DAY_AHEAD_URL: &str = "https://dataportal-api.nordpoolgroup.com/api/DayAheadPrices";

pub struct Nordpool(Client);

impl Nordpool {
    pub fn try_new() -> Result<Self> {
        Ok(Self(Client::builder().timeout(Duration::from_secs(10)).build()?))
    }
}

#[async_trait]
impl DayAheadProvider for Nordpool {
    #[instrument(skip_all, fields(%area, date = %date), name = "Fetching day-ahead prices…")]
    async fn fetch_raw_day(
        &self,
        currency: &str,
        area: &Area,
        date: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        let date = date.to_string();
        let response: DayAheadResponse = self
            .0
            .get(DAY_AHEAD_URL)
            .query(&[
                ("market", "DayAhead"),
                ("date", date.as_str()),
                ("deliveryArea", area.as_str()),
                ("currency", currency),
            ])
            .send()
            .await
            .context("failed to call the day-ahead API")?
            .error_for_status()
            .context("day-ahead request failed")?
            .json()
            .await
            .context("failed to deserialize the day-ahead response")?;
        response.area_points(area)
    }
}

#[derive(Deserialize)]
pub struct DayAheadResponse {
    #[serde(rename = "multiAreaEntries")]
    entries: Vec<DayAheadEntry>,
}

#[derive(Deserialize)]
struct DayAheadEntry {
    #[serde(rename = "deliveryStart")]
    start: DateTime<Utc>,

    #[serde(rename = "deliveryEnd")]
    end: DateTime<Utc>,

    #[serde(rename = "entryPerArea")]
    entry_per_area: HashMap<String, Value>,
}

impl DayAheadResponse {
    /// Extract the delivery intervals of one area, in delivery order.
    pub fn area_points(&self, area: &Area) -> Result<Vec<PricePoint>> {
        ensure!(!self.entries.is_empty(), "the response contains no delivery intervals");
        let points: Vec<PricePoint> = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .entry_per_area
                    .get(area.as_str())
                    .map(|value| PricePoint::new(entry.start, entry.end, conv_to_float(value)))
            })
            .collect();
        ensure!(!points.is_empty(), "the response contains no entries for area {area}");
        Ok(points)
    }
}

/// Convert a price cell to a float, falling back to `+∞` so that an
/// unparseable price is never the cheapest.
fn conv_to_float(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(f64::INFINITY),
        Value::String(string) => {
            string.replace(',', ".").replace(' ', "").parse().unwrap_or(f64::INFINITY)
        }
        _ => f64::INFINITY,
    }
}
