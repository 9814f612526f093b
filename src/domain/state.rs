use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ephemeral snapshot of the installation at decision time, read from the
/// smart-home bridge. Not durably stored by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemState {
    pub battery_soc_percent: f64,
    pub solar_power_kw: f64,
    pub solar_remaining_today_kwh: f64,
    pub solar_next_hour_kwh: f64,
    pub timestamp: DateTime<Utc>,
    /// Set when one or more sensors were missing and safe defaults were used.
    pub degraded: bool,
}

impl SystemState {
    /// Conservative defaults used when no live or cached snapshot exists.
    pub fn conservative(timestamp: DateTime<Utc>) -> Self {
        Self {
            battery_soc_percent: 50.0,
            solar_power_kw: 0.0,
            solar_remaining_today_kwh: 0.0,
            solar_next_hour_kwh: 0.0,
            timestamp,
            degraded: true,
        }
    }
}
