//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Structured logging adapters for the exchange monitor."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

/// Initialize a baseline tracing subscriber suitable for development and tests.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Device identifier associated with the log event.
    pub device: Option<&'a str>,
    /// Exchange cycle index within the current run.
    pub cycle: Option<u32>,
    /// Transmission direction (request or response).
    pub direction: Option<&'a str>,
    /// Run identifier; increments on every start.
    pub run: Option<u64>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device identifier.
    pub fn with_device(mut self, device: &'a str) -> Self {
        self.device = Some(device);
        self
    }

    /// Attach a cycle index.
    pub fn with_cycle(mut self, cycle: u32) -> Self {
        self.cycle = Some(cycle);
        self
    }

    /// Attach a direction label.
    pub fn with_direction(mut self, direction: &'a str) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Attach a run identifier.
    pub fn with_run(mut self, run: u64) -> Self {
        self.run = Some(run);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized system event with a success/fault outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default = LogContext::default();
    let ctx = context.unwrap_or(&default);
    // `tracing::event!` needs a constant level per call site.
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            run = ctx.run.unwrap_or_default(),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            device = ctx.device.unwrap_or(""),
            run = ctx.run.unwrap_or_default(),
            message = %message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = LogContext::new()
            .with_device("inverter")
            .with_cycle(3)
            .with_direction("request");
        ems_info!(context = ctx.clone(), "exchange online");
        ems_debug!("debug message");
        ems_error!(context = ctx, "drop at cycle {}", 3);
    }

    #[test]
    fn init_does_not_panic() {
        init();
    }

    #[test]
    fn system_event_helper_emits() {
        init();
        let ctx = LogContext::new().with_run(2);
        log_system_event(
            Some(&ctx),
            "communication.start",
            "communication started",
            SystemEventOutcome::Success,
        );
        log_system_event(
            None,
            "communication.start",
            "communication failed",
            SystemEventOutcome::Fault,
        );
    }
}
