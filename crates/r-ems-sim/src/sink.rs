//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Presentation-facing notifications for exchange activity."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::collections::VecDeque;

use parking_lot::Mutex;
use r_ems_logging::{ems_debug, ems_warn, LogContext};

use crate::aggregator::MetricsUpdate;
use crate::device::{Device, DeviceMap};
use crate::events::ExchangeEvent;

/// Receives exchange activity synchronously from the emitting step.
///
/// Implementations run on the step's task and must return promptly.
pub trait ExchangeSink: Send + Sync {
    fn on_event(&self, _event: &ExchangeEvent) {}

    /// A planned drop suppressed the response of `cycle`.
    fn on_drop(&self, _device: Device, _cycle: u32) {}

    /// Device row and totals after a counter mutation.
    fn on_metrics(&self, _update: &MetricsUpdate) {}

    /// Counters and logs were cleared.
    fn on_reset(&self) {}
}

/// Writes every transmission to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ExchangeSink for TracingSink {
    fn on_event(&self, event: &ExchangeEvent) {
        let ctx = LogContext::new()
            .with_device(event.device.as_ref())
            .with_cycle(event.cycle)
            .with_direction(event.direction.as_ref());
        ems_debug!(context = ctx, "{}", event.console_line());
    }

    fn on_drop(&self, device: Device, cycle: u32) {
        let ctx = LogContext::new()
            .with_device(device.as_ref())
            .with_cycle(cycle);
        ems_warn!(context = ctx, "{} response dropped", device.label());
    }
}

/// Per-device in-memory exchange log, newest entries last.
///
/// Each device keeps at most `capacity` events; older ones are discarded.
#[derive(Debug)]
pub struct ExchangeLog {
    capacity: usize,
    entries: Mutex<DeviceMap<VecDeque<ExchangeEvent>>>,
}

impl ExchangeLog {
    pub const DEFAULT_CAPACITY: usize = 4_096;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(DeviceMap::default()),
        }
    }

    /// Events recorded for `device`, oldest first.
    pub fn events(&self, device: Device) -> Vec<ExchangeEvent> {
        self.entries.lock()[device].iter().cloned().collect()
    }

    /// Rendered console lines for `device`, oldest first.
    pub fn lines(&self, device: Device) -> Vec<String> {
        self.entries.lock()[device]
            .iter()
            .map(ExchangeEvent::console_line)
            .collect()
    }

    pub fn len(&self, device: Device) -> usize {
        self.entries.lock()[device].len()
    }

    pub fn is_empty(&self, device: Device) -> bool {
        self.len(device) == 0
    }
}

impl Default for ExchangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeSink for ExchangeLog {
    fn on_event(&self, event: &ExchangeEvent) {
        let mut entries = self.entries.lock();
        let log = &mut entries[event.device];
        if log.len() == self.capacity {
            log.pop_front();
        }
        log.push_back(event.clone());
    }

    fn on_reset(&self) {
        let mut entries = self.entries.lock();
        for log in entries.values_mut() {
            log.clear();
        }
    }
}
