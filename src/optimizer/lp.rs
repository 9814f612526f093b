//! The battery scheduling linear program.
//!
//! One decision step is half an hour; all energy variables are kWh within
//! the step. The efficiency inverse is precomputed so no constraint ever
//! divides by a decision variable.

use anyhow::{Context, Result};
use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
    Variable,
};

use super::types::{OptimizerInput, SolvedPlan, StepPlan, STEP_HOURS};

pub fn solve(input: &OptimizerInput) -> Result<SolvedPlan> {
    let h = input.horizon();
    anyhow::ensure!(h > 0, "no price steps to optimise over");
    anyhow::ensure!(
        input.solar_kwh.len() == h && input.load_kwh.len() == h
            && input.export_prices_pence.len() == h,
        "per-step inputs must share the horizon length"
    );

    let battery = &input.battery;
    let eta = battery.efficiency.clamp(0.5, 1.0);
    let inv_eta = 1.0 / eta;
    let soc_per_kwh = 100.0 / battery.capacity_kwh;

    let charge_cap = battery.max_charge_kw * STEP_HOURS;
    let discharge_cap = battery.max_discharge_kw * STEP_HOURS;
    let envelope_cap = battery.max_charge_kw.max(battery.max_discharge_kw) * STEP_HOURS;

    let mut vars = ProblemVariables::new();
    let charge: Vec<Variable> = vars.add_vector(variable().min(0.0).max(charge_cap), h);
    let discharge: Vec<Variable> = vars.add_vector(variable().min(0.0).max(discharge_cap), h);
    let import: Vec<Variable> =
        vars.add_vector(variable().min(0.0).max(input.max_import_kwh_per_step), h);
    let export: Vec<Variable> =
        vars.add_vector(variable().min(0.0).max(input.max_export_kwh_per_step), h);
    // SoC bounds are imposed as constraints from step 1 on, so a measured
    // SoC just outside the band does not make the whole program infeasible.
    let soc: Vec<Variable> = vars.add_vector(variable().min(0.0).max(100.0), h + 1);

    let objective: Expression = (0..h)
        .map(|t| import[t] * input.prices_pence[t] - export[t] * input.export_prices_pence[t])
        .sum();

    let mut model = vars.minimise(objective).using(default_solver);

    model = model.with(constraint!(soc[0] == input.soc_percent));

    for t in 0..h {
        // Energy balance: solar + discharge + import = load + charge + export.
        model = model.with(constraint!(
            discharge[t] + import[t] - charge[t] - export[t]
                == input.load_kwh[t] - input.solar_kwh[t]
        ));

        // Battery dynamics.
        model = model.with(constraint!(
            soc[t + 1] == soc[t] + (charge[t] * eta - discharge[t] * inv_eta) * soc_per_kwh
        ));

        // Charging and discharging share the battery power envelope.
        model = model.with(constraint!(charge[t] + discharge[t] <= envelope_cap));

        model = model.with(constraint!(soc[t + 1] >= battery.min_soc_percent));
        model = model.with(constraint!(soc[t + 1] <= battery.max_soc_percent));
    }

    model = model.with(constraint!(soc[h] >= input.min_terminal_soc_percent));

    let solution = model.solve().context("LP solve failed")?;

    let steps: Vec<StepPlan> = (0..h)
        .map(|t| StepPlan {
            charge_kwh: solution.value(charge[t]),
            discharge_kwh: solution.value(discharge[t]),
            import_kwh: solution.value(import[t]),
            export_kwh: solution.value(export[t]),
            soc_percent: solution.value(soc[t + 1]),
            price_pence: input.prices_pence[t],
        })
        .collect();

    let objective_pence = steps
        .iter()
        .zip(&input.export_prices_pence)
        .map(|(s, export_price)| s.import_kwh * s.price_pence - s.export_kwh * export_price)
        .sum();

    Ok(SolvedPlan {
        steps,
        objective_pence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceClass;
    use crate::optimizer::types::BatteryParams;

    const TOLERANCE: f64 = 1e-6;

    fn battery() -> BatteryParams {
        BatteryParams {
            capacity_kwh: 10.0,
            max_charge_kw: 5.0,
            max_discharge_kw: 5.0,
            efficiency: 0.95,
            min_soc_percent: 10.0,
            max_soc_percent: 100.0,
        }
    }

    fn input(soc: f64, prices: Vec<f64>) -> OptimizerInput {
        let h = prices.len();
        OptimizerInput {
            soc_percent: soc,
            export_prices_pence: prices.iter().map(|p| p.max(0.0) * 0.15).collect(),
            classes: vec![PriceClass::Normal; h],
            solar_kwh: vec![0.0; h],
            load_kwh: vec![0.25; h],
            battery: battery(),
            max_import_kwh_per_step: 15.0 * STEP_HOURS,
            max_export_kwh_per_step: 5.0 * STEP_HOURS,
            min_terminal_soc_percent: 10.0,
            cheap_threshold_pence: None,
            solar_now_kw: 0.0,
            prices_pence: prices,
        }
    }

    #[test]
    fn charges_when_cheap_and_discharges_when_expensive() {
        let mut inp = input(50.0, vec![1.0, 1.0, 1.0, 1.0, 40.0, 40.0, 40.0, 40.0]);
        inp.min_terminal_soc_percent = 10.0;
        let plan = solve(&inp).unwrap();

        let early_charge: f64 = plan.steps[..4].iter().map(|s| s.charge_kwh).sum();
        let late_discharge: f64 = plan.steps[4..].iter().map(|s| s.discharge_kwh).sum();
        assert!(early_charge > 1.0, "should charge in the cheap half");
        assert!(late_discharge > 1.0, "should discharge in the expensive half");
    }

    #[test]
    fn soc_stays_within_bounds_and_meets_terminal_floor() {
        let inp = input(50.0, vec![5.0, -2.0, 30.0, 8.0, 2.0, 35.0, 12.0, 6.0]);
        let plan = solve(&inp).unwrap();

        for step in &plan.steps {
            assert!(step.soc_percent >= inp.battery.min_soc_percent - TOLERANCE);
            assert!(step.soc_percent <= inp.battery.max_soc_percent + TOLERANCE);
        }
        assert!(
            plan.steps.last().unwrap().soc_percent >= inp.min_terminal_soc_percent - TOLERANCE
        );
    }

    #[test]
    fn energy_balance_holds_at_every_step() {
        let mut inp = input(60.0, vec![3.0, 18.0, 25.0, 7.0]);
        inp.solar_kwh = vec![0.5, 1.0, 1.5, 0.2];
        let plan = solve(&inp).unwrap();

        for (t, step) in plan.steps.iter().enumerate() {
            let balance = inp.solar_kwh[t] + step.discharge_kwh + step.import_kwh
                - inp.load_kwh[t]
                - step.charge_kwh
                - step.export_kwh;
            assert!(
                balance.abs() < 1e-4,
                "step {t} violates energy balance by {balance}"
            );
        }
    }

    #[test]
    fn negative_prices_reward_importing() {
        let inp = input(20.0, vec![-5.0, -5.0, 20.0, 20.0]);
        let plan = solve(&inp).unwrap();
        let negative_import: f64 = plan.steps[..2].iter().map(|s| s.import_kwh).sum();
        assert!(negative_import > 2.0, "negative prices should pull imports");
        assert!(plan.steps[0].charge_kwh > 0.5);
    }

    #[test]
    fn power_envelope_caps_each_step() {
        let inp = input(50.0, vec![-10.0, 50.0]);
        let plan = solve(&inp).unwrap();
        for step in &plan.steps {
            assert!(step.charge_kwh <= 2.5 + TOLERANCE);
            assert!(step.discharge_kwh <= 2.5 + TOLERANCE);
            assert!(step.charge_kwh + step.discharge_kwh <= 2.5 + TOLERANCE);
        }
    }

    #[test]
    fn soc_below_band_recovers_instead_of_failing() {
        // Measured SoC below the configured minimum must still solve.
        let inp = input(5.0, vec![10.0, 10.0, 10.0, 10.0]);
        let plan = solve(&inp).unwrap();
        assert!(plan.steps.last().unwrap().soc_percent >= 10.0 - TOLERANCE);
    }

    #[test]
    fn empty_horizon_is_an_error() {
        assert!(solve(&input(50.0, vec![])).is_err());
    }
}
