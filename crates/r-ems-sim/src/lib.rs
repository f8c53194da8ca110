//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulated exchange engine module exports and shared types."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Simulated request/response exchange between the monitoring console and the
//! inverter, battery-management unit, and sensor.
//!
//! Recorded lines are replayed as live traffic: each device loop sends a
//! request, answers it after a randomized delay or drops the answer, and feeds
//! the [`MetricsAggregator`]. The [`SimulationController`] runs the three
//! loops together and stops once all of them reached the cycle bound.

pub mod aggregator;
pub mod clock;
pub mod controller;
pub mod device;
pub mod error;
pub mod events;
pub mod faults;
pub mod replay;
pub mod simulator;
pub mod sink;

pub use aggregator::{
    DeviceCounters, DeviceReport, DeviceTiming, LinkStatus, MetricsAggregator, MetricsUpdate,
    SummaryReport, TotalsReport,
};
pub use clock::{Clock, RuntimeClock};
pub use controller::{RunPhase, SimulationController, SimulationControllerBuilder, SimulationState};
pub use device::{Device, DeviceMap};
pub use error::{ExchangeError, Result};
pub use events::{Direction, ExchangeEvent};
pub use faults::{DropPlan, FaultSource, RandomFaults, ScriptedFaults};
pub use replay::{ReplayLibrary, ReplaySource};
pub use simulator::{request_position, response_position, ExchangeTiming, LoopProgress};
pub use sink::{ExchangeLog, ExchangeSink, TracingSink};
