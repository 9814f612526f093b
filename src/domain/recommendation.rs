use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PerDevice;

/// Inverter work mode emitted to the smart-home adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryMode {
    #[serde(rename = "Force Charge")]
    ForceCharge,
    #[serde(rename = "Force Discharge")]
    ForceDischarge,
    #[serde(rename = "Self Use")]
    SelfUse,
    #[serde(rename = "Feed-in First")]
    FeedInFirst,
}

impl BatteryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryMode::ForceCharge => "Force Charge",
            BatteryMode::ForceDischarge => "Force Discharge",
            BatteryMode::SelfUse => "Self Use",
            BatteryMode::FeedInFirst => "Feed-in First",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Force Charge" => Some(BatteryMode::ForceCharge),
            "Force Discharge" => Some(BatteryMode::ForceDischarge),
            "Self Use" => Some(BatteryMode::SelfUse),
            "Feed-in First" => Some(BatteryMode::FeedInFirst),
            _ => None,
        }
    }
}

/// Which tier of the priority resolver produced a device decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    ManualOverride,
    ScheduleOverride,
    Optimizer,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::ManualOverride => "manual_override",
            DecisionSource::ScheduleOverride => "schedule_override",
            DecisionSource::Optimizer => "optimizer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual_override" => Some(DecisionSource::ManualOverride),
            "schedule_override" => Some(DecisionSource::ScheduleOverride),
            "optimizer" => Some(DecisionSource::Optimizer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStatus {
    Optimal,
    Feasible,
    Fallback,
}

impl OptimizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationStatus::Optimal => "optimal",
            OptimizationStatus::Feasible => "feasible",
            OptimizationStatus::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "optimal" => Some(OptimizationStatus::Optimal),
            "feasible" => Some(OptimizationStatus::Feasible),
            "fallback" => Some(OptimizationStatus::Fallback),
            _ => None,
        }
    }
}

/// Final per-device decision, tagged with its source and a human-readable
/// reason so the dashboard can explain any surprise state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDecision {
    pub desired: bool,
    pub source: DecisionSource,
    pub reason: String,
}

/// The full output record of one decision cycle, persisted for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub timestamp: DateTime<Utc>,
    pub horizon_steps: usize,
    pub battery_mode: BatteryMode,
    pub discharge_current_amps: i64,
    pub devices: PerDevice<DeviceDecision>,
    pub manual_override_active: bool,
    pub schedule_override_active: bool,
    pub optimization_status: OptimizationStatus,
    pub optimization_time_ms: f64,
    pub expected_soc_percent: Option<f64>,
    pub reason: String,
}
