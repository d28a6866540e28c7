use chrono::NaiveDate;

use crate::area::Area;

/// Planner failure taxonomy.
///
/// Everything here is caught and logged at the orchestrator boundary: a failed
/// cycle leaves the previously published schedule intact and waits for the
/// next trigger.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// Bad caller input, nothing mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The price provider failed or returned a malformed payload for the day.
    #[error("no usable price data for {area} on {date}")]
    ProviderUnavailable { area: Area, date: NaiveDate },

    /// A required configuration value is not set.
    #[error("configuration value `{0}` is not set")]
    ConfigurationMissing(&'static str),

    /// The configured area does not resolve to a timezone.
    #[error("no timezone known for area {0}")]
    TimezoneResolution(String),
}
