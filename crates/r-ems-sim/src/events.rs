//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Exchange events emitted by the replay loop."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::device::Device;

/// Which half of an exchange a transmission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Console to device poll.
    Request,
    /// Device reply to the poll of the same cycle.
    Response,
}

/// One simulated transmission. Produced exactly once per request or response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeEvent {
    pub device: Device,
    pub direction: Direction,
    pub cycle: u32,
    pub payload: Arc<str>,
    pub timestamp: DateTime<Utc>,
}

impl ExchangeEvent {
    pub fn request(device: Device, cycle: u32, payload: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            device,
            direction: Direction::Request,
            cycle,
            payload: Arc::from(payload),
            timestamp,
        }
    }

    pub fn response(device: Device, cycle: u32, payload: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            device,
            direction: Direction::Response,
            cycle,
            payload: Arc::from(payload),
            timestamp,
        }
    }

    pub fn is_request(&self) -> bool {
        self.direction == Direction::Request
    }

    /// Console line in the `>> DEVICE(Direction): payload` layout.
    pub fn console_line(&self) -> String {
        format!(
            ">> {}({}): {}",
            self.device.label(),
            self.direction,
            self.payload
        )
    }
}
