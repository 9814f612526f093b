use serde::{Deserialize, Serialize};

use crate::domain::{BatteryMode, OptimizationStatus, PerDevice, PriceClass};

/// Half-hour step length in hours.
pub const STEP_HOURS: f64 = 0.5;

/// Battery parameters as the solver sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryParams {
    pub capacity_kwh: f64,
    pub max_charge_kw: f64,
    pub max_discharge_kw: f64,
    /// Round-trip efficiency in (0, 1].
    pub efficiency: f64,
    pub min_soc_percent: f64,
    pub max_soc_percent: f64,
}

/// Everything the LP needs, with all per-step vectors of equal length H.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerInput {
    pub soc_percent: f64,
    /// Import unit price per step, pence/kWh. May be negative.
    pub prices_pence: Vec<f64>,
    /// Export unit price per step, pence/kWh.
    pub export_prices_pence: Vec<f64>,
    /// Classification of each step's price within its window.
    pub classes: Vec<PriceClass>,
    /// Solar forecast per step, kWh.
    pub solar_kwh: Vec<f64>,
    /// Load forecast per step, kWh.
    pub load_kwh: Vec<f64>,
    pub battery: BatteryParams,
    /// Grid envelope, kWh per step.
    pub max_import_kwh_per_step: f64,
    pub max_export_kwh_per_step: f64,
    /// End-of-horizon SoC floor.
    pub min_terminal_soc_percent: f64,
    /// Cheap threshold of the price window, when one could be computed.
    pub cheap_threshold_pence: Option<f64>,
    /// Instantaneous solar generation, kW (for the immersion rules and the
    /// discharge decode guard).
    pub solar_now_kw: f64,
}

impl OptimizerInput {
    pub fn horizon(&self) -> usize {
        self.prices_pence.len()
    }
}

/// One solved step of the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    pub charge_kwh: f64,
    pub discharge_kwh: f64,
    pub import_kwh: f64,
    pub export_kwh: f64,
    /// SoC at the end of the step, percent.
    pub soc_percent: f64,
    pub price_pence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolvedPlan {
    pub steps: Vec<StepPlan>,
    /// Net cost over the horizon, pence.
    pub objective_pence: f64,
}

/// What the optimiser says before overrides are applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImmersionSuggestion {
    pub on: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerOutput {
    pub mode: BatteryMode,
    pub discharge_current_amps: i64,
    pub expected_soc_percent: Option<f64>,
    pub status: OptimizationStatus,
    pub reason: String,
    pub immersion: PerDevice<ImmersionSuggestion>,
    pub elapsed_ms: f64,
    pub plan: Option<SolvedPlan>,
}
