pub mod lp;
pub mod rules;
pub mod types;

pub use types::{
    BatteryParams, ImmersionSuggestion, OptimizerInput, OptimizerOutput, SolvedPlan, StepPlan,
    STEP_HOURS,
};

use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use tracing::warn;

use crate::config::Config;
use crate::domain::{BatteryMode, OptimizationStatus, PerDevice, PriceClass, PricePoint, SystemState};
use crate::tariff::classify;

/// Hours treated as daylight when spreading the solar forecast.
const DAYLIGHT_HOURS: std::ops::RangeInclusive<u32> = 6..=18;

/// Scheduling front-end around the LP: input assembly, the blocking solve
/// under a wall-clock timeout, step-0 decode and the immersion rules. It
/// never fails; every degraded path yields a fallback recommendation.
pub struct Optimizer {
    cfg: Config,
}

impl Optimizer {
    pub fn new(cfg: Config) -> Self {
        Self { cfg }
    }

    /// Assemble LP inputs from the snapshot and the stored price window.
    /// Returns `None` when no price covers the current half hour; the
    /// caller then takes the fallback path.
    pub fn build_input(
        &self,
        state: &SystemState,
        window: &[PricePoint],
        now: DateTime<Utc>,
    ) -> Option<OptimizerInput> {
        let h = self.cfg.optimizer.horizon_steps;
        let (prices, classes) = align_prices(window, now, h)?;
        let solar_kwh = solar_profile(state, now, h, self.cfg.solar.capacity_kw);
        let export_prices = prices
            .iter()
            .map(|p| self.cfg.tariff.export_price_for(*p))
            .collect();
        // Thresholds come from the stored window, not the step array: the
        // carry-forward fill would skew the percentiles.
        let window_prices: Vec<f64> = window.iter().map(|p| p.unit_price_pence).collect();
        let cheap_threshold = classify::thresholds(&window_prices).map(|t| t.cheap_pence);
        let battery = &self.cfg.battery;

        Some(OptimizerInput {
            soc_percent: state.battery_soc_percent,
            export_prices_pence: export_prices,
            classes,
            solar_kwh,
            load_kwh: vec![self.cfg.optimizer.load_profile_kwh_per_step; h],
            battery: BatteryParams {
                capacity_kwh: battery.capacity_kwh,
                max_charge_kw: battery.max_charge_kw,
                max_discharge_kw: battery.max_discharge_kw,
                efficiency: battery.efficiency,
                min_soc_percent: battery.min_soc_percent,
                max_soc_percent: battery.max_soc_percent,
            },
            max_import_kwh_per_step: self.cfg.grid.max_import_kw * STEP_HOURS,
            max_export_kwh_per_step: self.cfg.grid.max_export_kw * STEP_HOURS,
            min_terminal_soc_percent: self
                .cfg
                .optimizer
                .terminal_soc_target_percent
                .unwrap_or(battery.min_soc_percent),
            cheap_threshold_pence: cheap_threshold,
            solar_now_kw: state.solar_power_kw,
            prices_pence: prices,
        })
    }

    /// Solve and decode. The solve is CPU-bound and runs on the blocking
    /// pool so request handlers are never starved; a hard timeout turns a
    /// slow solve into the fallback path.
    pub async fn recommend(&self, input: Option<OptimizerInput>) -> OptimizerOutput {
        let started = Instant::now();
        let Some(input) = input else {
            return self.fallback("fallback: no tariff data", started);
        };

        let timeout = Duration::from_millis(self.cfg.optimizer.solver_timeout_ms);
        let solve_input = input.clone();
        let solved = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || lp::solve(&solve_input)),
        )
        .await;

        match solved {
            Ok(Ok(Ok(plan))) => self.decode(&input, plan, started),
            Ok(Ok(Err(e))) => {
                warn!(error = %e, "LP solve failed");
                self.fallback(&format!("fallback: solver error: {e}"), started)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "solver task panicked");
                self.fallback("fallback: solver task failed", started)
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "solver timed out");
                self.fallback("fallback: solver timeout", started)
            }
        }
    }

    fn decode(&self, input: &OptimizerInput, plan: SolvedPlan, started: Instant) -> OptimizerOutput {
        let step0 = &plan.steps[0];
        let class0 = input.classes[0];
        let (mode, discharge_current_amps) = rules::decode_step0(
            step0,
            class0,
            input.solar_now_kw,
            self.cfg.immersion.high_solar_kw,
            &self.cfg.battery,
        );
        let reason = rules::mode_reason(mode, step0);

        let suggestion = rules::immersion_rule(
            input.prices_pence[0],
            input.cheap_threshold_pence,
            input.soc_percent,
            input.solar_now_kw,
            self.cfg.immersion.high_solar_kw,
        );

        OptimizerOutput {
            mode,
            discharge_current_amps,
            expected_soc_percent: Some(step0.soc_percent),
            status: OptimizationStatus::Optimal,
            reason,
            immersion: PerDevice {
                main: suggestion.clone(),
                lucy: suggestion,
            },
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            plan: Some(plan),
        }
    }

    fn fallback(&self, reason: &str, started: Instant) -> OptimizerOutput {
        let off = ImmersionSuggestion {
            on: false,
            reason: "Fallback mode, immersion control suspended".to_string(),
        };
        OptimizerOutput {
            mode: BatteryMode::SelfUse,
            discharge_current_amps: self.cfg.battery.default_discharge_current_amps,
            expected_soc_percent: None,
            status: OptimizationStatus::Fallback,
            reason: reason.to_string(),
            immersion: PerDevice {
                main: off.clone(),
                lucy: off,
            },
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            plan: None,
        }
    }

    /// Fallback recommendation for callers whose inputs are already known to
    /// be degraded (for example an unusable state snapshot).
    pub fn fallback_output(&self, reason: &str) -> OptimizerOutput {
        self.fallback(reason, Instant::now())
    }
}

/// Align the stored window onto H half-hour steps starting at `now`. Gaps
/// inside the horizon carry the last known price forward; an uncovered
/// first step means there is nothing to optimise against.
fn align_prices(
    window: &[PricePoint],
    now: DateTime<Utc>,
    h: usize,
) -> Option<(Vec<f64>, Vec<PriceClass>)> {
    let mut prices = Vec::with_capacity(h);
    let mut classes = Vec::with_capacity(h);
    let mut last: Option<(f64, PriceClass)> = None;

    for t in 0..h {
        let at = now + chrono::Duration::minutes(30 * t as i64);
        let covering = window
            .iter()
            .find(|p| p.valid_from <= at && at < p.valid_to)
            .map(|p| (p.unit_price_pence, p.classification));
        match covering.or(last) {
            Some((price, class)) => {
                prices.push(price);
                classes.push(class);
                last = Some((price, class));
            }
            None => return None,
        }
    }

    Some((prices, classes))
}

/// Deterministic solar forecast per step from the snapshot: the next-hour
/// forecast covers the first two steps, current generation (with headroom,
/// capped by plant capacity) the remaining daylight steps, zero at night.
/// Today's daylight total is scaled down to the remaining-today forecast.
fn solar_profile(
    state: &SystemState,
    now: DateTime<Utc>,
    h: usize,
    capacity_kw: f64,
) -> Vec<f64> {
    let base_kw = (state.solar_power_kw * 1.2).min(capacity_kw);
    let mut per_step = Vec::with_capacity(h);

    for t in 0..h {
        let at = now + chrono::Duration::minutes(30 * t as i64);
        let kwh = if t < 2 && state.solar_next_hour_kwh > 0.0 {
            state.solar_next_hour_kwh / 2.0
        } else if DAYLIGHT_HOURS.contains(&at.hour()) {
            base_kw * STEP_HOURS
        } else {
            0.0
        };
        per_step.push(kwh);
    }

    if state.solar_remaining_today_kwh > 0.0 {
        let today = now.date_naive();
        let today_total: f64 = per_step
            .iter()
            .enumerate()
            .filter(|(t, _)| {
                (now + chrono::Duration::minutes(30 * *t as i64)).date_naive() == today
            })
            .map(|(_, kwh)| kwh)
            .sum();
        if today_total > state.solar_remaining_today_kwh {
            let scale = state.solar_remaining_today_kwh / today_total;
            for (t, kwh) in per_step.iter_mut().enumerate() {
                if (now + chrono::Duration::minutes(30 * t as i64)).date_naive() == today {
                    *kwh *= scale;
                }
            }
        }
    }

    per_step
}
