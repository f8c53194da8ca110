//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Per-device delivery statistics for the exchange loop."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use r_ems_common::time::{interval_seconds, round_to};
use serde::Serialize;
use strum::Display;

use crate::device::{Device, DeviceMap};

const CRITICAL_BELOW: f64 = 80.0;
const DEGRADED_BELOW: f64 = 90.0;

/// Request/response/drop counts for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCounters {
    pub requests: u64,
    pub responses: u64,
    pub drops: u64,
}

impl DeviceCounters {
    /// Explicit drops when any were recorded, otherwise the number of
    /// requests still lacking a response.
    ///
    /// The fallback also counts responses cancelled by a stop, so one figure
    /// covers both injected loss and loss on termination.
    pub fn error_count(&self) -> u64 {
        if self.drops > 0 {
            self.drops
        } else {
            self.requests.saturating_sub(self.responses)
        }
    }

    pub fn delivery_rate(&self) -> f64 {
        delivery_rate(self.requests, self.responses)
    }
}

/// Percentage of requests answered, one decimal place; zero before any request.
pub fn delivery_rate(requests: u64, responses: u64) -> f64 {
    if requests == 0 {
        return 0.0;
    }
    round_to(responses as f64 * 100.0 / requests as f64, 1)
}

/// Link health derived from the delivery rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkStatus {
    Healthy,
    Degraded,
    Critical,
}

impl LinkStatus {
    pub fn from_rate(rate: f64) -> Self {
        if rate < CRITICAL_BELOW {
            LinkStatus::Critical
        } else if rate < DEGRADED_BELOW {
            LinkStatus::Degraded
        } else {
            LinkStatus::Healthy
        }
    }
}

/// Last observed exchange timestamps for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DeviceTiming {
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub last_received_at: Option<DateTime<Utc>>,
    /// Response minus request, in seconds with two decimals.
    pub last_interval_seconds: Option<f64>,
}

/// Snapshot of one device row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReport {
    pub device: Device,
    pub counters: DeviceCounters,
    pub errors: u64,
    pub delivery_rate: f64,
    pub status: LinkStatus,
    pub timing: DeviceTiming,
}

/// Snapshot of the cross-device totals row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TotalsReport {
    pub requests: u64,
    pub responses: u64,
    pub drops: u64,
    pub errors: u64,
    pub delivery_rate: f64,
    pub status: LinkStatus,
}

/// Full table: every device row plus totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub devices: Vec<DeviceReport>,
    pub totals: TotalsReport,
}

impl SummaryReport {
    pub fn device(&self, device: Device) -> Option<&DeviceReport> {
        self.devices.iter().find(|report| report.device == device)
    }
}

/// State handed to sinks after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsUpdate {
    pub report: DeviceReport,
    pub totals: TotalsReport,
}

/// Running delivery statistics for every device.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    counters: DeviceMap<DeviceCounters>,
    timing: DeviceMap<DeviceTiming>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(&mut self, device: Device, at: DateTime<Utc>) {
        self.counters[device].requests += 1;
        self.timing[device].last_request_at = Some(at);
    }

    pub fn on_response(&mut self, device: Device, at: DateTime<Utc>) {
        self.counters[device].responses += 1;
        let timing = &mut self.timing[device];
        timing.last_response_at = Some(at);
        timing.last_received_at = Some(at);
        if let Some(requested) = timing.last_request_at {
            timing.last_interval_seconds = Some(interval_seconds(requested, at));
        }
    }

    pub fn on_drop(&mut self, device: Device) {
        self.counters[device].drops += 1;
    }

    pub fn counters(&self, device: Device) -> DeviceCounters {
        self.counters[device]
    }

    pub fn timing(&self, device: Device) -> DeviceTiming {
        self.timing[device]
    }

    pub fn error_count(&self, device: Device) -> u64 {
        self.counters[device].error_count()
    }

    pub fn delivery_rate(&self, device: Device) -> f64 {
        self.counters[device].delivery_rate()
    }

    pub fn status(&self, device: Device) -> LinkStatus {
        LinkStatus::from_rate(self.delivery_rate(device))
    }

    pub fn device_report(&self, device: Device) -> DeviceReport {
        let counters = self.counters[device];
        let delivery_rate = counters.delivery_rate();
        DeviceReport {
            device,
            counters,
            errors: counters.error_count(),
            delivery_rate,
            status: LinkStatus::from_rate(delivery_rate),
            timing: self.timing[device],
        }
    }

    /// Totals sum the counters; the rate is computed from the sums, not
    /// averaged across devices.
    pub fn totals(&self) -> TotalsReport {
        let mut totals = DeviceCounters::default();
        let mut errors = 0;
        for counters in self.counters.values() {
            totals.requests += counters.requests;
            totals.responses += counters.responses;
            totals.drops += counters.drops;
            errors += counters.error_count();
        }
        let rate = totals.delivery_rate();
        TotalsReport {
            requests: totals.requests,
            responses: totals.responses,
            drops: totals.drops,
            errors,
            delivery_rate: rate,
            status: LinkStatus::from_rate(rate),
        }
    }

    pub fn update_for(&self, device: Device) -> MetricsUpdate {
        MetricsUpdate {
            report: self.device_report(device),
            totals: self.totals(),
        }
    }

    pub fn summary(&self) -> SummaryReport {
        SummaryReport {
            devices: Device::ALL
                .iter()
                .map(|device| self.device_report(*device))
                .collect(),
            totals: self.totals(),
        }
    }

    /// `responses + drops <= requests` for every device.
    pub fn is_consistent(&self) -> bool {
        self.counters
            .values()
            .all(|c| c.responses + c.drops <= c.requests)
    }

    pub fn reset(&mut self) {
        self.counters = DeviceMap::default();
        self.timing = DeviceMap::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_cycles(agg: &mut MetricsAggregator, device: Device, answered: u64, dropped: u64) {
        let start = Utc::now();
        for _ in 0..answered {
            agg.on_request(device, start);
            agg.on_response(device, start + Duration::milliseconds(120));
        }
        for _ in 0..dropped {
            agg.on_request(device, start);
            agg.on_drop(device);
        }
    }

    #[test]
    fn empty_device_reports_zero_rate() {
        let agg = MetricsAggregator::new();
        assert_eq!(agg.delivery_rate(Device::Inverter), 0.0);
        assert_eq!(agg.error_count(Device::Inverter), 0);
        assert_eq!(agg.timing(Device::Inverter).last_interval_seconds, None);
        assert_eq!(agg.totals().delivery_rate, 0.0);
    }

    #[test]
    fn response_records_interval_and_receive_time() {
        let mut agg = MetricsAggregator::new();
        let requested = Utc::now();
        let answered = requested + Duration::milliseconds(187);
        agg.on_request(Device::Sensor, requested);
        agg.on_response(Device::Sensor, answered);
        let timing = agg.timing(Device::Sensor);
        assert_eq!(timing.last_request_at, Some(requested));
        assert_eq!(timing.last_response_at, Some(answered));
        assert_eq!(timing.last_received_at, Some(answered));
        assert_eq!(timing.last_interval_seconds, Some(0.19));
    }

    #[test]
    fn response_without_request_leaves_interval_unset() {
        let mut agg = MetricsAggregator::new();
        agg.on_response(Device::Bms, Utc::now());
        assert_eq!(agg.counters(Device::Bms).responses, 1);
        assert_eq!(agg.timing(Device::Bms).last_interval_seconds, None);
    }

    #[test]
    fn error_count_prefers_explicit_drops() {
        let mut agg = MetricsAggregator::new();
        record_cycles(&mut agg, Device::Inverter, 98, 1);
        // An unanswered request on top of the drop stays hidden behind it.
        agg.on_request(Device::Inverter, Utc::now());
        assert_eq!(agg.error_count(Device::Inverter), 1);
    }

    #[test]
    fn error_count_falls_back_to_missing_responses() {
        let mut agg = MetricsAggregator::new();
        record_cycles(&mut agg, Device::Bms, 5, 0);
        agg.on_request(Device::Bms, Utc::now());
        agg.on_request(Device::Bms, Utc::now());
        assert_eq!(agg.error_count(Device::Bms), 2);
    }

    #[test]
    fn single_drop_in_hundred_is_healthy() {
        let mut agg = MetricsAggregator::new();
        record_cycles(&mut agg, Device::Inverter, 99, 1);
        let report = agg.device_report(Device::Inverter);
        assert_eq!(report.counters.requests, 100);
        assert_eq!(report.counters.responses, 99);
        assert_eq!(report.errors, 1);
        assert_eq!(report.delivery_rate, 99.0);
        assert_eq!(report.status, LinkStatus::Healthy);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(LinkStatus::from_rate(0.0), LinkStatus::Critical);
        assert_eq!(LinkStatus::from_rate(79.9), LinkStatus::Critical);
        assert_eq!(LinkStatus::from_rate(80.0), LinkStatus::Degraded);
        assert_eq!(LinkStatus::from_rate(89.9), LinkStatus::Degraded);
        assert_eq!(LinkStatus::from_rate(90.0), LinkStatus::Healthy);
        assert_eq!(LinkStatus::from_rate(100.0), LinkStatus::Healthy);
    }

    #[test]
    fn rate_is_rounded_to_one_decimal() {
        assert_eq!(delivery_rate(3, 2), 66.7);
        assert_eq!(delivery_rate(7, 6), 85.7);
    }

    #[test]
    fn totals_use_summed_counts() {
        let mut agg = MetricsAggregator::new();
        record_cycles(&mut agg, Device::Inverter, 10, 0);
        record_cycles(&mut agg, Device::Bms, 1, 1);
        let totals = agg.totals();
        assert_eq!(totals.requests, 12);
        assert_eq!(totals.responses, 11);
        assert_eq!(totals.errors, 1);
        // Averaging the per-device rates (100 and 50) would give 75.
        assert_eq!(totals.delivery_rate, 91.7);
        assert_eq!(totals.status, LinkStatus::Healthy);
        assert_eq!(agg.status(Device::Bms), LinkStatus::Critical);
    }

    #[test]
    fn reset_clears_counters_and_timing() {
        let mut agg = MetricsAggregator::new();
        record_cycles(&mut agg, Device::Sensor, 4, 1);
        agg.reset();
        for device in Device::ALL {
            assert_eq!(agg.counters(device), DeviceCounters::default());
            assert_eq!(agg.timing(device), DeviceTiming::default());
        }
        assert!(agg.is_consistent());
    }

    #[test]
    fn summary_lists_every_device() {
        let mut agg = MetricsAggregator::new();
        record_cycles(&mut agg, Device::Bms, 2, 0);
        let summary = agg.summary();
        assert_eq!(summary.devices.len(), 3);
        assert_eq!(summary.device(Device::Bms).unwrap().counters.responses, 2);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totals"]["status"], "healthy");
        assert_eq!(json["devices"][0]["status"], "critical");
    }
}
