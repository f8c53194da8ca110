//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Field device identities and per-device storage."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::ExchangeError;

/// Field device classes polled by the monitoring console.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Device {
    Inverter,
    Bms,
    Sensor,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Inverter, Device::Bms, Device::Sensor];

    const fn slot(self) -> usize {
        match self {
            Device::Inverter => 0,
            Device::Bms => 1,
            Device::Sensor => 2,
        }
    }

    /// Whether the exchange loop may suppress responses for this device.
    ///
    /// The battery-management unit never loses responses.
    pub fn drops_responses(self) -> bool {
        matches!(self, Device::Inverter | Device::Sensor)
    }

    /// Upper-case label used in exchange log lines.
    pub fn label(self) -> &'static str {
        match self {
            Device::Inverter => "INVERTER",
            Device::Bms => "BMS",
            Device::Sensor => "SENSOR",
        }
    }

    /// Parse a device identifier, rejecting anything outside the fixed set.
    pub fn parse(raw: &str) -> Result<Self, ExchangeError> {
        Device::from_str(raw.trim()).map_err(|_| ExchangeError::UnknownDevice(raw.to_owned()))
    }
}

/// Fixed-size table holding one value per [`Device`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMap<T> {
    slots: [T; 3],
}

impl<T> DeviceMap<T> {
    pub fn from_fn(mut f: impl FnMut(Device) -> T) -> Self {
        Self {
            slots: Device::ALL.map(&mut f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Device, &T)> {
        Device::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut()
    }
}

impl<T> Index<Device> for DeviceMap<T> {
    type Output = T;

    fn index(&self, device: Device) -> &T {
        &self.slots[device.slot()]
    }
}

impl<T> IndexMut<Device> for DeviceMap<T> {
    fn index_mut(&mut self, device: Device) -> &mut T {
        &mut self.slots[device.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parses_known_identifiers_case_insensitively() {
        assert_eq!(Device::parse("inverter").unwrap(), Device::Inverter);
        assert_eq!(Device::parse("BMS").unwrap(), Device::Bms);
        assert_eq!(Device::parse(" Sensor ").unwrap(), Device::Sensor);
    }

    #[test]
    fn rejects_unknown_identifiers() {
        let err = Device::parse("pump").unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownDevice(ref id) if id == "pump"));
    }

    #[test]
    fn only_bms_keeps_every_response() {
        let droppers: Vec<_> = Device::iter().filter(|d| d.drops_responses()).collect();
        assert_eq!(droppers, vec![Device::Inverter, Device::Sensor]);
    }

    #[test]
    fn device_map_indexes_by_device() {
        let mut map = DeviceMap::from_fn(|device| device.to_string());
        map[Device::Bms].push('!');
        assert_eq!(map[Device::Inverter], "inverter");
        assert_eq!(map[Device::Bms], "bms!");
        let devices: Vec<_> = map.iter().map(|(device, _)| device).collect();
        assert_eq!(devices, Device::ALL.to_vec());
    }
}
