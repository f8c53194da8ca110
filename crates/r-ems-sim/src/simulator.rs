//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device request/response replay loop."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use r_ems_common::config::SimulationConfig;
use r_ems_logging::{ems_debug, ems_info, LogContext};
use serde::Serialize;

use crate::controller::{complete_device, Shared};
use crate::device::Device;
use crate::error::{ExchangeError, Result};
use crate::events::ExchangeEvent;
use crate::faults::DropPlan;

/// Fixed pacing of the exchange loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTiming {
    /// Pause between the start of one cycle and the next.
    pub cycle_interval: Duration,
    pub response_delay_min: Duration,
    pub response_delay_max: Duration,
    /// Cycles per device per run.
    pub max_cycles: u32,
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_millis(500),
            response_delay_min: Duration::from_millis(100),
            response_delay_max: Duration::from_millis(200),
            max_cycles: 100,
        }
    }
}

impl ExchangeTiming {
    pub fn validate(&self) -> Result<()> {
        if self.cycle_interval.is_zero() {
            return Err(ExchangeError::InvalidTiming(
                "cycle interval must be non-zero".into(),
            ));
        }
        if self.response_delay_min > self.response_delay_max {
            return Err(ExchangeError::InvalidTiming(format!(
                "response delay window is inverted ({:?} > {:?})",
                self.response_delay_min, self.response_delay_max
            )));
        }
        if self.response_delay_max >= self.cycle_interval {
            return Err(ExchangeError::InvalidTiming(format!(
                "response delay {:?} must stay below the cycle interval {:?}",
                self.response_delay_max, self.cycle_interval
            )));
        }
        if self.max_cycles == 0 {
            return Err(ExchangeError::InvalidTiming(
                "max cycles must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl TryFrom<&SimulationConfig> for ExchangeTiming {
    type Error = ExchangeError;

    fn try_from(config: &SimulationConfig) -> Result<Self> {
        let timing = Self {
            cycle_interval: config.cycle_interval,
            response_delay_min: config.response_delay_min,
            response_delay_max: config.response_delay_max,
            max_cycles: config.max_cycles,
        };
        timing.validate()?;
        Ok(timing)
    }
}

/// Replay position of the request sent in `cycle`.
pub fn request_position(cycle: u32, len: usize) -> usize {
    (2 * cycle as usize) % len
}

/// Replay position of the response paired with the request of `cycle`.
pub fn response_position(cycle: u32, len: usize) -> usize {
    (2 * cycle as usize + 1) % len
}

/// Cycle counter of one device loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopProgress {
    /// Next cycle to run; equals the bound once the loop is done.
    pub cycle: u32,
    /// Completion was reported for the current run.
    pub completed: bool,
}

enum StepOutcome {
    Continue,
    Finished,
    Cancelled,
}

/// Drives one device through request/response cycles for a single run.
pub(crate) struct ExchangeSimulator {
    device: Device,
    run: u64,
    lines: usize,
    plan: DropPlan,
    shared: Arc<Shared>,
}

impl ExchangeSimulator {
    /// Arm the loop of `device` for `run`. Devices without replay data are
    /// skipped and never complete.
    pub(crate) fn start(shared: &Arc<Shared>, device: Device, run: u64) -> Option<Self> {
        let ctx = LogContext::new().with_device(device.as_ref()).with_run(run);
        let lines = shared.replay.len(device);
        if lines == 0 {
            ems_debug!(context = ctx, "no replay data, device loop not started");
            return None;
        }

        if !shared.state.lock().is_active(run) {
            return None;
        }
        let plan = shared.faults.drop_plan(device, shared.timing.max_cycles);
        ems_info!(
            context = ctx,
            "device loop started with {} replay lines, planned drops {:?}",
            lines,
            plan.cycles().collect::<Vec<_>>()
        );

        Some(Self {
            device,
            run,
            lines,
            plan,
            shared: Arc::clone(shared),
        })
    }

    pub(crate) async fn run(self) {
        let interval = self.shared.timing.cycle_interval;
        loop {
            match self.step() {
                StepOutcome::Continue => tokio::time::sleep(interval).await,
                StepOutcome::Finished | StepOutcome::Cancelled => return,
            }
        }
    }

    fn step(&self) -> StepOutcome {
        let shared = &self.shared;
        let device = self.device;
        let now = shared.clock.now();

        let _delivery = shared.delivery.lock();
        let mut state = shared.state.lock();
        if !state.is_active(self.run) {
            return StepOutcome::Cancelled;
        }
        let cycle = state.progress[device].cycle;
        if cycle >= shared.timing.max_cycles {
            drop(state);
            complete_device(shared, device, self.run);
            return StepOutcome::Finished;
        }

        let payload = self.line(request_position(cycle, self.lines));
        let request = ExchangeEvent::request(device, cycle, payload, now);
        state.metrics.on_request(device, now);
        let after_request = state.metrics.update_for(device);
        let after_drop = if self.plan.contains(cycle) {
            state.metrics.on_drop(device);
            Some(state.metrics.update_for(device))
        } else {
            None
        };
        state.progress[device].cycle = cycle + 1;
        drop(state);

        shared.notify_event(&request, &after_request);
        match after_drop {
            Some(update) => shared.notify_drop(device, cycle, &update),
            None => self.schedule_response(cycle),
        }
        StepOutcome::Continue
    }

    fn schedule_response(&self, cycle: u32) {
        let shared = Arc::clone(&self.shared);
        let device = self.device;
        let run = self.run;
        let position = response_position(cycle, self.lines);
        let delay = shared.faults.response_delay(
            device,
            shared.timing.response_delay_min,
            shared.timing.response_delay_max,
        );
        self.shared.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            emit_response(&shared, device, run, cycle, position);
        });
    }

    fn line(&self, position: usize) -> &str {
        self.shared
            .replay
            .line(self.device, position)
            .unwrap_or_default()
    }
}

/// Emit the delayed response unless its run was stopped meanwhile. A
/// cancelled response is lost for good.
fn emit_response(shared: &Shared, device: Device, run: u64, cycle: u32, position: usize) {
    let now = shared.clock.now();
    let _delivery = shared.delivery.lock();
    let update = {
        let mut state = shared.state.lock();
        if !state.is_active(run) {
            let ctx = LogContext::new()
                .with_device(device.as_ref())
                .with_cycle(cycle)
                .with_run(run);
            ems_debug!(context = ctx, "pending response cancelled by stop");
            return;
        }
        state.metrics.on_response(device, now);
        state.metrics.update_for(device)
    };
    let payload = shared.replay.line(device, position).unwrap_or_default();
    let response = ExchangeEvent::response(device, cycle, payload, now);
    shared.notify_event(&response, &update);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_wrap_around_the_replay() {
        assert_eq!(request_position(5, 2), 0);
        assert_eq!(response_position(5, 2), 1);
        assert_eq!(request_position(3, 6), 0);
        assert_eq!(response_position(3, 6), 1);
        assert_eq!(request_position(4, 7), 1);
        assert_eq!(response_position(4, 7), 2);
    }

    #[test]
    fn single_line_replay_reuses_the_line() {
        assert_eq!(request_position(9, 1), 0);
        assert_eq!(response_position(9, 1), 0);
    }

    #[test]
    fn default_timing_is_valid() {
        let timing = ExchangeTiming::default();
        timing.validate().unwrap();
        assert_eq!(timing.max_cycles, 100);
    }

    #[test]
    fn delay_reaching_the_cycle_interval_is_rejected() {
        let timing = ExchangeTiming {
            response_delay_max: Duration::from_millis(500),
            ..ExchangeTiming::default()
        };
        assert!(matches!(
            timing.validate(),
            Err(ExchangeError::InvalidTiming(_))
        ));
        let timing = ExchangeTiming {
            response_delay_max: Duration::from_millis(499),
            ..ExchangeTiming::default()
        };
        timing.validate().unwrap();
    }

    #[test]
    fn timing_from_config_rejects_inverted_window() {
        let config = SimulationConfig {
            response_delay_min: Duration::from_millis(250),
            ..SimulationConfig::default()
        };
        let err = ExchangeTiming::try_from(&config).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidTiming(_)));
    }
}
