//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the data response monitor."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Core shared primitives for the R-EMS data response monitor.
//! This crate exposes configuration loading, tracing initialisation, and the
//! time helpers consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{LoadedMonitorConfig, LoggingConfig, MonitorConfig, ReplayConfig, SimulationConfig};
pub use logging::{init_tracing, LogFormat};
