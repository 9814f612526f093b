//! Deterministic decode of the solved step-0 decision and the immersion
//! rule set. The immersions are not LP variables; they are driven by rules
//! evaluated against the same forecast inputs.

use crate::config::BatteryConfig;
use crate::domain::{BatteryMode, PriceClass};

use super::types::{ImmersionSuggestion, StepPlan};

/// Below this the solved charge/discharge is treated as numerical noise.
const ACTION_EPSILON_KWH: f64 = 0.01;

/// SoC floor for the negative-price immersion rule.
const NEGATIVE_PRICE_SOC: f64 = 90.0;
/// SoC floor for the cheap-price and high-solar immersion rules.
const FULL_BATTERY_SOC: f64 = 95.0;

/// Map the solved first step onto an inverter mode and discharge current.
pub fn decode_step0(
    step0: &StepPlan,
    class0: PriceClass,
    solar_now_kw: f64,
    high_solar_kw: f64,
    battery: &BatteryConfig,
) -> (BatteryMode, i64) {
    if step0.charge_kwh > ACTION_EPSILON_KWH
        && matches!(class0, PriceClass::Negative | PriceClass::Cheap)
    {
        (BatteryMode::ForceCharge, 0)
    } else if step0.discharge_kwh > ACTION_EPSILON_KWH
        && class0 == PriceClass::Expensive
        && solar_now_kw < high_solar_kw
    {
        (BatteryMode::ForceDischarge, battery.max_discharge_current_amps)
    } else {
        (BatteryMode::SelfUse, battery.default_discharge_current_amps)
    }
}

/// Human-readable reason for the decoded battery decision.
pub fn mode_reason(mode: BatteryMode, step0: &StepPlan) -> String {
    let price = step0.price_pence;
    match mode {
        BatteryMode::ForceCharge if price < 0.0 => {
            format!("Negative pricing ({price:.1}p), charging at maximum rate")
        }
        BatteryMode::ForceCharge => format!("Cheap pricing ({price:.1}p), opportunity charging"),
        BatteryMode::ForceDischarge => {
            format!("Expensive price ({price:.1}p), discharging to avoid grid import")
        }
        _ => "Minimal battery use, preserving charge for better opportunities".to_string(),
    }
}

/// The immersion rule set: `on` iff any clause fires. Both devices follow
/// the same rules; the reason names the triggering clause.
pub fn immersion_rule(
    price0_pence: f64,
    cheap_threshold_pence: Option<f64>,
    soc_percent: f64,
    solar_now_kw: f64,
    high_solar_kw: f64,
) -> ImmersionSuggestion {
    if price0_pence < 0.0 && soc_percent >= NEGATIVE_PRICE_SOC {
        return ImmersionSuggestion {
            on: true,
            reason: format!(
                "Negative price ({price0_pence:.1}p) + high SoC ({soc_percent:.0}%)"
            ),
        };
    }
    if let Some(cheap) = cheap_threshold_pence {
        if price0_pence <= cheap && soc_percent >= FULL_BATTERY_SOC {
            return ImmersionSuggestion {
                on: true,
                reason: format!(
                    "Cheap price ({price0_pence:.1}p) + battery full ({soc_percent:.0}%)"
                ),
            };
        }
    }
    if solar_now_kw >= high_solar_kw && soc_percent >= FULL_BATTERY_SOC {
        return ImmersionSuggestion {
            on: true,
            reason: format!(
                "High solar ({solar_now_kw:.1}kW) + battery full ({soc_percent:.0}%)"
            ),
        };
    }
    ImmersionSuggestion {
        on: false,
        reason: format!(
            "Conditions not met (price {price0_pence:.1}p, SoC {soc_percent:.0}%)"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    fn step(charge: f64, discharge: f64, price: f64) -> StepPlan {
        StepPlan {
            charge_kwh: charge,
            discharge_kwh: discharge,
            import_kwh: 0.0,
            export_kwh: 0.0,
            soc_percent: 50.0,
            price_pence: price,
        }
    }

    #[test]
    fn charging_in_a_cheap_step_forces_charge() {
        let battery = test_config().battery;
        let (mode, amps) = decode_step0(&step(2.0, 0.0, 1.5), PriceClass::Cheap, 0.0, 5.0, &battery);
        assert_eq!(mode, BatteryMode::ForceCharge);
        assert_eq!(amps, 0);
    }

    #[test]
    fn charging_in_a_normal_step_stays_self_use() {
        let battery = test_config().battery;
        let (mode, amps) =
            decode_step0(&step(2.0, 0.0, 15.0), PriceClass::Normal, 0.0, 5.0, &battery);
        assert_eq!(mode, BatteryMode::SelfUse);
        assert_eq!(amps, battery.default_discharge_current_amps);
    }

    #[test]
    fn discharging_in_an_expensive_step_forces_discharge() {
        let battery = test_config().battery;
        let (mode, amps) =
            decode_step0(&step(0.0, 2.0, 35.0), PriceClass::Expensive, 1.0, 5.0, &battery);
        assert_eq!(mode, BatteryMode::ForceDischarge);
        assert_eq!(amps, battery.max_discharge_current_amps);
    }

    #[test]
    fn high_solar_blocks_force_discharge() {
        let battery = test_config().battery;
        let (mode, _) =
            decode_step0(&step(0.0, 2.0, 35.0), PriceClass::Expensive, 6.0, 5.0, &battery);
        assert_eq!(mode, BatteryMode::SelfUse);
    }

    #[test]
    fn negative_price_with_high_soc_turns_immersion_on() {
        let suggestion = immersion_rule(-2.0, Some(5.0), 92.0, 0.0, 5.0);
        assert!(suggestion.on);
        assert!(suggestion.reason.contains("Negative price (-2.0p)"));
        assert!(suggestion.reason.contains("92%"));
    }

    #[test]
    fn negative_price_with_low_soc_stays_off() {
        let suggestion = immersion_rule(-2.0, Some(5.0), 60.0, 0.0, 5.0);
        assert!(!suggestion.on);
        assert!(suggestion.reason.contains("Conditions not met"));
    }

    #[test]
    fn cheap_price_requires_nearly_full_battery() {
        assert!(immersion_rule(2.0, Some(3.0), 96.0, 0.0, 5.0).on);
        assert!(!immersion_rule(2.0, Some(3.0), 94.0, 0.0, 5.0).on);
        // Above the cheap threshold the clause never fires.
        assert!(!immersion_rule(4.0, Some(3.0), 96.0, 0.0, 5.0).on);
    }

    #[test]
    fn high_solar_with_full_battery_turns_immersion_on() {
        let suggestion = immersion_rule(12.0, Some(5.0), 97.0, 6.5, 5.0);
        assert!(suggestion.on);
        assert!(suggestion.reason.contains("High solar (6.5kW)"));
    }
}
