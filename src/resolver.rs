//! Three-tier priority resolver.
//!
//! Pure and synchronous: given the optimiser's per-device suggestions and
//! the override statuses it always produces a decision, device by device.
//! Precedence, highest first: manual override, schedule override, optimiser.
//! Battery mode and discharge current are never overridden here; they pass
//! through from the optimiser's step-0 decode.

use crate::domain::{DecisionSource, DeviceDecision, PerDevice};
use crate::optimizer::OptimizerOutput;
use crate::repo::{ManualStatus, ScheduleStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub devices: PerDevice<DeviceDecision>,
    pub manual_override_active: bool,
    pub schedule_override_active: bool,
}

pub fn resolve(
    optimizer: &OptimizerOutput,
    schedule: &PerDevice<ScheduleStatus>,
    manual: &PerDevice<ManualStatus>,
) -> Resolved {
    let devices = optimizer.immersion.map(|device, suggestion| {
        let manual = manual.get(device);
        let schedule = schedule.get(device);

        if manual.is_active {
            DeviceDecision {
                // A manual override always carries the requested switch
                // state; default off if the record is somehow incomplete.
                desired: manual.desired_state.unwrap_or(false),
                source: DecisionSource::ManualOverride,
                reason: format!(
                    "Manual override ({} min remaining)",
                    manual.time_remaining_minutes
                ),
            }
        } else if schedule.is_active {
            DeviceDecision {
                // A schedule report is an assertion of "heat now". A future
                // desired_state field on schedules would slot in here.
                desired: true,
                source: DecisionSource::ScheduleOverride,
                reason: schedule
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Schedule active".to_string()),
            }
        } else {
            DeviceDecision {
                desired: suggestion.on,
                source: DecisionSource::Optimizer,
                reason: suggestion.reason.clone(),
            }
        }
    });

    Resolved {
        manual_override_active: devices.any(|d| d.source == DecisionSource::ManualOverride),
        schedule_override_active: devices.any(|d| d.source == DecisionSource::ScheduleOverride),
        devices,
    }
}
