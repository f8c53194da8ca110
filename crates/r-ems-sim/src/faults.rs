//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Response loss and latency injection for the exchange loop."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Randomness consumed by the exchange loop lives behind [`FaultSource`] so
//! tests can pin drop cycles and latency without waiting on real time.

use std::collections::BTreeSet;
use std::time::Duration;

use parking_lot::Mutex;
use rand::prelude::*;
use serde::Serialize;

use crate::device::{Device, DeviceMap};

/// Cycle indices whose response is suppressed during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropPlan {
    cycles: BTreeSet<u32>,
}

impl DropPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_cycles(cycles: impl IntoIterator<Item = u32>) -> Self {
        Self {
            cycles: cycles.into_iter().collect(),
        }
    }

    /// Draw a plan: zero or one drop for inverter and sensor, none for bms,
    /// each at a distinct cycle in `[0, max_cycles)`.
    pub fn random<R: Rng + ?Sized>(device: Device, max_cycles: u32, rng: &mut R) -> Self {
        let count = if device.drops_responses() && max_cycles > 0 {
            rng.gen_range(0..=1usize)
        } else {
            0
        };
        let mut cycles = BTreeSet::new();
        while cycles.len() < count {
            cycles.insert(rng.gen_range(0..max_cycles));
        }
        Self { cycles }
    }

    pub fn contains(&self, cycle: u32) -> bool {
        self.cycles.contains(&cycle)
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }

    pub fn cycles(&self) -> impl Iterator<Item = u32> + '_ {
        self.cycles.iter().copied()
    }
}

/// Source of injected response loss and latency.
pub trait FaultSource: Send + Sync {
    /// Drop plan for one device loop; called once per device per run.
    fn drop_plan(&self, device: Device, max_cycles: u32) -> DropPlan;

    /// Delay before the response of one cycle, within `[min, max]`.
    fn response_delay(&self, device: Device, min: Duration, max: Duration) -> Duration;
}

/// Production fault source backed by a standard RNG.
#[derive(Debug)]
pub struct RandomFaults {
    rng: Mutex<StdRng>,
}

impl RandomFaults {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible variant for demos and soak runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomFaults {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultSource for RandomFaults {
    fn drop_plan(&self, device: Device, max_cycles: u32) -> DropPlan {
        DropPlan::random(device, max_cycles, &mut *self.rng.lock())
    }

    fn response_delay(&self, _device: Device, min: Duration, max: Duration) -> Duration {
        let low = min.as_millis() as u64;
        let high = max.as_millis() as u64;
        if low >= high {
            return min;
        }
        Duration::from_millis(self.rng.lock().gen_range(low..=high))
    }
}

/// Deterministic fault source: fixed plans and a constant delay.
#[derive(Debug, Clone)]
pub struct ScriptedFaults {
    plans: DeviceMap<DropPlan>,
    delay: Duration,
}

impl ScriptedFaults {
    /// No drops, every response after `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            plans: DeviceMap::default(),
            delay,
        }
    }

    pub fn with_drops(mut self, device: Device, cycles: impl IntoIterator<Item = u32>) -> Self {
        self.plans[device] = DropPlan::from_cycles(cycles);
        self
    }
}

impl FaultSource for ScriptedFaults {
    fn drop_plan(&self, device: Device, max_cycles: u32) -> DropPlan {
        DropPlan::from_cycles(self.plans[device].cycles().filter(|cycle| *cycle < max_cycles))
    }

    fn response_delay(&self, _device: Device, _min: Duration, _max: Duration) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bms_plan_is_always_empty() {
        let faults = RandomFaults::seeded(7);
        for _ in 0..200 {
            assert!(faults.drop_plan(Device::Bms, 100).is_empty());
        }
    }

    #[test]
    fn random_plans_hold_at_most_one_cycle_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut saw_drop = false;
        let mut saw_clean = false;
        for _ in 0..500 {
            for device in [Device::Inverter, Device::Sensor] {
                let plan = DropPlan::random(device, 100, &mut rng);
                assert!(plan.len() <= 1);
                assert!(plan.cycles().all(|cycle| cycle < 100));
                saw_drop |= plan.len() == 1;
                saw_clean |= plan.is_empty();
            }
        }
        assert!(saw_drop && saw_clean);
    }

    #[test]
    fn zero_cycles_never_plan_drops() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(DropPlan::random(Device::Inverter, 0, &mut rng).is_empty());
    }

    #[test]
    fn random_delay_stays_in_window() {
        let faults = RandomFaults::seeded(9);
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(200);
        for _ in 0..1_000 {
            let delay = faults.response_delay(Device::Sensor, min, max);
            assert!(delay >= min && delay <= max, "{delay:?} outside window");
        }
        assert_eq!(faults.response_delay(Device::Sensor, max, max), max);
    }

    #[test]
    fn scripted_plan_ignores_cycles_past_the_bound() {
        let faults = ScriptedFaults::new(Duration::from_millis(150))
            .with_drops(Device::Inverter, [3, 250]);
        let plan = faults.drop_plan(Device::Inverter, 100);
        assert_eq!(plan.cycles().collect::<Vec<_>>(), vec![3]);
        assert!(faults.drop_plan(Device::Sensor, 100).is_empty());
        assert_eq!(
            faults.response_delay(Device::Inverter, Duration::ZERO, Duration::from_secs(1)),
            Duration::from_millis(150)
        );
    }
}
