//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Timestamp sources for exchange events."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Wall-clock source used to stamp exchange events.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock anchored once and advanced by the Tokio clock.
///
/// Under a paused Tokio runtime the timestamps follow virtual time, so the
/// request/response interval equals the injected delay.
#[derive(Debug, Clone)]
pub struct RuntimeClock {
    wall_anchor: DateTime<Utc>,
    instant_anchor: Instant,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self {
            wall_anchor: Utc::now(),
            instant_anchor: Instant::now(),
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.instant_anchor);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.wall_anchor + elapsed,
            Err(_) => Utc::now(),
        }
    }
}
