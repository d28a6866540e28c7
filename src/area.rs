use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

/// Every area code with a known timezone.
pub const KNOWN_AREAS: [&str; 21] = [
    "AT", "BE", "DK1", "DK2", "EE", "FI", "FR", "GER", "LT", "LV", "NL", "NO1", "NO2",
    "NO3", "NO4", "NO5", "SE1", "SE2", "SE3", "SE4", "SYS",
];

/// Day-ahead price zone, for example `SE3` or `NL`.
///
/// The code doubles as the key into the delivery-area column of the provider
/// response and as the source of the local timezone in which calendar days
/// are cut.
#[derive(
    Clone,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct Area(String);

impl Area {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the zone's local timezone.
    ///
    /// Unknown codes abort the affected day's planning only, hence the typed
    /// error instead of a panic.
    pub fn timezone(&self) -> Result<Tz, PlannerError> {
        let timezone = match self.0.as_str() {
            "DK1" | "DK2" => Tz::Europe__Copenhagen,
            "FI" => Tz::Europe__Helsinki,
            "EE" => Tz::Europe__Tallinn,
            "LT" => Tz::Europe__Vilnius,
            "LV" => Tz::Europe__Riga,
            "NO1" | "NO2" | "NO3" | "NO4" | "NO5" => Tz::Europe__Oslo,
            // `SYS` is the unconstrained system price, quoted in Stockholm time.
            "SE1" | "SE2" | "SE3" | "SE4" | "SYS" => Tz::Europe__Stockholm,
            "FR" => Tz::Europe__Paris,
            "NL" => Tz::Europe__Amsterdam,
            "BE" => Tz::Europe__Brussels,
            "AT" => Tz::Europe__Vienna,
            "GER" => Tz::Europe__Berlin,
            _ => return Err(PlannerError::TimezoneResolution(self.0.clone())),
        };
        Ok(timezone)
    }
}

impl FromStr for Area {
    type Err = PlannerError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let area = Self::new(code);
        area.timezone()?;
        Ok(area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timezone_ok() {
        assert_eq!(Area::new("se3").timezone().unwrap(), Tz::Europe__Stockholm);
    }

    #[test]
    fn test_timezone_unknown() {
        assert!(matches!(
            Area::new("XX").timezone(),
            Err(PlannerError::TimezoneResolution(_)),
        ));
    }
}
