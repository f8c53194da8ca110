//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Run lifecycle and completion detection across device loops."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! The controller owns one [`SimulationState`] behind a single mutex. Every
//! device step and every delayed response mutates it in one critical section,
//! so interleaved device timers never observe partial updates on a
//! multi-threaded runtime.
//!
//! Cancellation is by run id: each `start` opens a new run, and a suspended
//! step that resumes after its run was stopped or superseded does nothing.
//!
//! Sink delivery is serialized by a second lock, always taken before the
//! state lock. A step holds it from its mutation until its sinks returned,
//! and `clear` holds it around the reset, so no sink sees an event of a run
//! after the `on_reset` that discarded it. Sinks must not call back into the
//! controller.

use std::sync::Arc;

use parking_lot::Mutex;
use r_ems_logging::{ems_info, log_system_event, LogContext, SystemEventOutcome};
use serde::Serialize;
use strum::Display;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::aggregator::{DeviceReport, MetricsAggregator, MetricsUpdate, SummaryReport};
use crate::clock::{Clock, RuntimeClock};
use crate::device::{Device, DeviceMap};
use crate::error::Result;
use crate::events::ExchangeEvent;
use crate::faults::{FaultSource, RandomFaults};
use crate::replay::ReplaySource;
use crate::simulator::{ExchangeSimulator, ExchangeTiming, LoopProgress};
use crate::sink::ExchangeSink;

/// Lifecycle phase of the simulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// All mutable simulation state: run flag, counters, and loop progress.
#[derive(Debug, Default)]
pub struct SimulationState {
    running: bool,
    run_id: u64,
    phase: RunPhase,
    pub(crate) metrics: MetricsAggregator,
    pub(crate) progress: DeviceMap<LoopProgress>,
}

impl SimulationState {
    /// Whether steps scheduled by `run` may still execute.
    pub(crate) fn is_active(&self, run: u64) -> bool {
        self.running && self.run_id == run
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn progress(&self, device: Device) -> LoopProgress {
        self.progress[device]
    }
}

pub(crate) struct Shared {
    pub(crate) replay: Arc<dyn ReplaySource>,
    pub(crate) faults: Arc<dyn FaultSource>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) timing: ExchangeTiming,
    pub(crate) runtime: Handle,
    pub(crate) state: Mutex<SimulationState>,
    pub(crate) delivery: Mutex<()>,
    sinks: Vec<Arc<dyn ExchangeSink>>,
    phase_tx: watch::Sender<RunPhase>,
}

impl Shared {
    /// Phase changes are published while the state lock is held so watchers
    /// observe them in the order they happened.
    fn set_phase(&self, state: &mut SimulationState, phase: RunPhase) {
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    pub(crate) fn notify_event(&self, event: &ExchangeEvent, update: &MetricsUpdate) {
        for sink in &self.sinks {
            sink.on_event(event);
            sink.on_metrics(update);
        }
    }

    pub(crate) fn notify_drop(&self, device: Device, cycle: u32, update: &MetricsUpdate) {
        for sink in &self.sinks {
            sink.on_drop(device, cycle);
            sink.on_metrics(update);
        }
    }
}

/// Record that `device` finished `run`. Repeated or stale completions are
/// ignored; the last device to finish stops the run.
pub(crate) fn complete_device(shared: &Shared, device: Device, run: u64) {
    let max_cycles = shared.timing.max_cycles;
    let all_done = {
        let mut state = shared.state.lock();
        if state.run_id != run || state.progress[device].completed {
            return;
        }
        let progress = &mut state.progress[device];
        progress.completed = true;
        progress.cycle = max_cycles;
        let all_done = state.progress.values().all(|p| p.completed);
        all_done
    };

    let ctx = LogContext::new().with_device(device.as_ref()).with_run(run);
    ems_info!(context = ctx, "device reached {} cycles", max_cycles);
    if all_done {
        log_system_event(
            Some(&LogContext::new().with_run(run)),
            "communication.complete",
            "all devices reached the cycle bound",
            SystemEventOutcome::Success,
        );
        halt(shared);
    }
}

fn halt(shared: &Shared) -> bool {
    let run = {
        let mut state = shared.state.lock();
        if !state.running {
            return false;
        }
        state.running = false;
        shared.set_phase(&mut state, RunPhase::Stopped);
        state.run_id
    };
    log_system_event(
        Some(&LogContext::new().with_run(run)),
        "communication.stop",
        "Communication: STOP",
        SystemEventOutcome::Success,
    );
    true
}

/// Coordinates the three device loops as one run.
///
/// Cloning yields another handle to the same simulation.
#[derive(Clone)]
pub struct SimulationController {
    shared: Arc<Shared>,
}

impl SimulationController {
    pub fn builder(replay: Arc<dyn ReplaySource>) -> SimulationControllerBuilder {
        SimulationControllerBuilder::new(replay)
    }

    /// Begin a run. Ignored while a run is active. Loop progress restarts at
    /// cycle 0; counters keep accumulating until [`clear`](Self::clear).
    pub fn start(&self) {
        let run = {
            let mut state = self.shared.state.lock();
            if state.running {
                return;
            }
            state.running = true;
            state.run_id += 1;
            state.progress = DeviceMap::default();
            self.shared.set_phase(&mut state, RunPhase::Running);
            state.run_id
        };
        log_system_event(
            Some(&LogContext::new().with_run(run)),
            "communication.start",
            "Communication: START",
            SystemEventOutcome::Success,
        );

        for device in Device::ALL {
            if let Some(simulator) = ExchangeSimulator::start(&self.shared, device, run) {
                self.shared.runtime.spawn(simulator.run());
            }
        }
    }

    /// Halt the run. Pending responses are cancelled; counters are kept.
    pub fn stop(&self) {
        halt(&self.shared);
    }

    /// Stop, then reset counters, timing, and loop progress.
    pub fn clear(&self) {
        let _delivery = self.shared.delivery.lock();
        let run = {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.metrics.reset();
            state.progress = DeviceMap::default();
            self.shared.set_phase(&mut state, RunPhase::Idle);
            state.run_id
        };
        for sink in &self.shared.sinks {
            sink.on_reset();
        }
        log_system_event(
            Some(&LogContext::new().with_run(run)),
            "communication.clear",
            "Communication: CLEAR",
            SystemEventOutcome::Success,
        );
    }

    /// Mark `device` as having reached the cycle bound in the current run.
    /// Idempotent; stops the run once every device has reached it.
    pub fn on_device_complete(&self, device: Device) {
        let run = self.shared.state.lock().run_id;
        complete_device(&self.shared, device, run);
    }

    pub fn phase(&self) -> RunPhase {
        self.shared.state.lock().phase
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    pub fn timing(&self) -> ExchangeTiming {
        self.shared.timing
    }

    pub fn progress(&self, device: Device) -> LoopProgress {
        self.shared.state.lock().progress[device]
    }

    pub fn device_report(&self, device: Device) -> DeviceReport {
        self.shared.state.lock().metrics.device_report(device)
    }

    pub fn summary(&self) -> SummaryReport {
        self.shared.state.lock().metrics.summary()
    }

    /// Read the state under the simulation lock. Keep `f` short.
    pub fn with_state<R>(&self, f: impl FnOnce(&SimulationState) -> R) -> R {
        f(&self.shared.state.lock())
    }

    pub fn watch_phase(&self) -> watch::Receiver<RunPhase> {
        self.shared.phase_tx.subscribe()
    }

    /// Resolve once the run is no longer running (stopped, completed, or cleared).
    pub async fn wait_until_stopped(&self) {
        let mut phase = self.watch_phase();
        let _ = phase.wait_for(|phase| *phase != RunPhase::Running).await;
    }
}

impl std::fmt::Debug for SimulationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationController")
            .field("timing", &self.shared.timing)
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

/// Wires replay data, randomness, clock, and sinks into a controller.
pub struct SimulationControllerBuilder {
    replay: Arc<dyn ReplaySource>,
    timing: ExchangeTiming,
    faults: Option<Arc<dyn FaultSource>>,
    clock: Option<Arc<dyn Clock>>,
    sinks: Vec<Arc<dyn ExchangeSink>>,
    runtime: Option<Handle>,
}

impl SimulationControllerBuilder {
    pub fn new(replay: Arc<dyn ReplaySource>) -> Self {
        Self {
            replay,
            timing: ExchangeTiming::default(),
            faults: None,
            clock: None,
            sinks: Vec::new(),
            runtime: None,
        }
    }

    pub fn timing(mut self, timing: ExchangeTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn faults(mut self, faults: Arc<dyn FaultSource>) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ExchangeSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Runtime used for device loops; defaults to the current one.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<SimulationController> {
        self.timing.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current()?,
        };
        let (phase_tx, _) = watch::channel(RunPhase::Idle);
        let shared = Shared {
            replay: self.replay,
            faults: self
                .faults
                .unwrap_or_else(|| Arc::new(RandomFaults::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(RuntimeClock::new())),
            timing: self.timing,
            runtime,
            state: Mutex::new(SimulationState::default()),
            delivery: Mutex::new(()),
            sinks: self.sinks,
            phase_tx,
        };
        Ok(SimulationController {
            shared: Arc::new(shared),
        })
    }
}
