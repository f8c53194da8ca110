//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Prometheus collectors fed by the simulated exchange."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use r_ems_logging::{ems_error, LogContext};
use r_ems_sim::{Device, DeviceMap, Direction, ExchangeEvent, ExchangeSink, MetricsUpdate};
use tracing::debug;

/// Shared registry type used across the monitor.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Encode every family in `registry` in the Prometheus text format.
pub fn render_text(registry: &Registry) -> Result<String> {
    let families = registry.gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .context("failed to encode metrics")
}

/// Write the text exposition of `registry` to `path`, replacing any previous snapshot.
pub fn write_text_file(registry: &Registry, path: &Path) -> Result<()> {
    let body = render_text(registry)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create metrics directory {}", parent.display()))?;
    }
    fs::write(path, body)
        .with_context(|| format!("failed to write metrics snapshot {}", path.display()))?;
    debug!(path = %path.display(), "metrics snapshot written");
    Ok(())
}

/// Exchange collectors, registered once and updated as a sink of the controller.
#[derive(Clone)]
pub struct ExchangeMetrics {
    registry: SharedRegistry,
    requests: IntCounterVec,
    responses: IntCounterVec,
    drops: IntCounterVec,
    delivery_rate: GaugeVec,
    total_delivery_rate: Gauge,
    response_interval: HistogramVec,
    last_request: Arc<Mutex<DeviceMap<Option<DateTime<Utc>>>>>,
}

impl ExchangeMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new(
                "r_ems_exchange_requests_total",
                "Requests sent to each simulated device",
            ),
            &["device"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let responses = IntCounterVec::new(
            Opts::new(
                "r_ems_exchange_responses_total",
                "Responses received from each simulated device",
            ),
            &["device"],
        )?;
        registry.register(Box::new(responses.clone()))?;

        let drops = IntCounterVec::new(
            Opts::new(
                "r_ems_exchange_drops_total",
                "Responses suppressed by the fault plan",
            ),
            &["device"],
        )?;
        registry.register(Box::new(drops.clone()))?;

        let delivery_rate = GaugeVec::new(
            Opts::new(
                "r_ems_exchange_delivery_rate_percent",
                "Share of requests answered per device",
            ),
            &["device"],
        )?;
        registry.register(Box::new(delivery_rate.clone()))?;

        let total_delivery_rate = Gauge::with_opts(Opts::new(
            "r_ems_exchange_total_delivery_rate_percent",
            "Share of requests answered across all devices",
        ))?;
        registry.register(Box::new(total_delivery_rate.clone()))?;

        let buckets = prometheus::linear_buckets(0.05, 0.025, 10)
            .context("failed to construct histogram buckets")?;
        let response_interval = HistogramVec::new(
            HistogramOpts::new(
                "r_ems_exchange_response_interval_seconds",
                "Time between the latest request and the response that followed it",
            )
            .buckets(buckets),
            &["device"],
        )?;
        registry.register(Box::new(response_interval.clone()))?;

        Ok(Self {
            registry,
            requests,
            responses,
            drops,
            delivery_rate,
            total_delivery_rate,
            response_interval,
            last_request: Arc::new(Mutex::new(DeviceMap::default())),
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn render(&self) -> Result<String> {
        render_text(&self.registry)
    }

    fn observe_response(&self, event: &ExchangeEvent) {
        let Some(sent) = self.last_request.lock()[event.device] else {
            return;
        };
        match (event.timestamp - sent).to_std() {
            Ok(elapsed) => self
                .response_interval
                .with_label_values(&[event.device.as_ref()])
                .observe(elapsed.as_secs_f64()),
            Err(_) => {
                let ctx = LogContext::new()
                    .with_device(event.device.as_ref())
                    .with_cycle(event.cycle)
                    .with_direction(event.direction.as_ref());
                ems_error!(context = ctx, "response timestamp precedes its request");
            }
        }
    }
}

impl std::fmt::Debug for ExchangeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeMetrics").finish_non_exhaustive()
    }
}

impl ExchangeSink for ExchangeMetrics {
    fn on_event(&self, event: &ExchangeEvent) {
        let device = event.device.as_ref();
        match event.direction {
            Direction::Request => {
                self.requests.with_label_values(&[device]).inc();
                self.last_request.lock()[event.device] = Some(event.timestamp);
            }
            Direction::Response => {
                self.responses.with_label_values(&[device]).inc();
                self.observe_response(event);
            }
        }
    }

    fn on_drop(&self, device: Device, _cycle: u32) {
        self.drops.with_label_values(&[device.as_ref()]).inc();
    }

    fn on_metrics(&self, update: &MetricsUpdate) {
        self.delivery_rate
            .with_label_values(&[update.report.device.as_ref()])
            .set(update.report.delivery_rate);
        self.total_delivery_rate.set(update.totals.delivery_rate);
    }

    fn on_reset(&self) {
        self.requests.reset();
        self.responses.reset();
        self.drops.reset();
        self.delivery_rate.reset();
        self.total_delivery_rate.set(0.0);
        self.response_interval.reset();
        *self.last_request.lock() = DeviceMap::default();
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use r_ems_sim::MetricsAggregator;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::milliseconds(ms)
    }

    fn counter(vec: &IntCounterVec, device: Device) -> u64 {
        vec.with_label_values(&[device.as_ref()]).get()
    }

    #[test]
    fn registers_exchange_families() {
        let registry = new_registry();
        let metrics = ExchangeMetrics::new(registry.clone()).unwrap();
        metrics.on_event(&ExchangeEvent::request(Device::Bms, 0, "a", at(0)));
        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"r_ems_exchange_total_delivery_rate_percent".to_string()));
        assert!(names.contains(&"r_ems_exchange_requests_total".to_string()));
    }

    #[test]
    fn double_registration_fails() {
        let registry = new_registry();
        ExchangeMetrics::new(registry.clone()).unwrap();
        assert!(ExchangeMetrics::new(registry).is_err());
    }

    #[test]
    fn events_drive_counters_and_latency() {
        let metrics = ExchangeMetrics::new(new_registry()).unwrap();
        let mut aggregator = MetricsAggregator::new();

        let request = ExchangeEvent::request(Device::Inverter, 0, "a", at(0));
        aggregator.on_request(Device::Inverter, request.timestamp);
        metrics.on_event(&request);
        metrics.on_metrics(&aggregator.update_for(Device::Inverter));

        let response = ExchangeEvent::response(Device::Inverter, 0, "b", at(150));
        aggregator.on_response(Device::Inverter, response.timestamp);
        metrics.on_event(&response);
        metrics.on_metrics(&aggregator.update_for(Device::Inverter));

        metrics.on_event(&ExchangeEvent::request(Device::Inverter, 1, "c", at(500)));
        metrics.on_drop(Device::Inverter, 1);

        assert_eq!(counter(&metrics.requests, Device::Inverter), 2);
        assert_eq!(counter(&metrics.responses, Device::Inverter), 1);
        assert_eq!(counter(&metrics.drops, Device::Inverter), 1);
        assert_eq!(
            metrics
                .delivery_rate
                .with_label_values(&["inverter"])
                .get(),
            100.0
        );
        let histogram = metrics.response_interval.with_label_values(&["inverter"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert!((histogram.get_sample_sum() - 0.15).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_device_series() {
        let metrics = ExchangeMetrics::new(new_registry()).unwrap();
        metrics.on_event(&ExchangeEvent::request(Device::Sensor, 0, "a", at(0)));
        metrics.on_reset();

        let text = metrics.render().unwrap();
        assert!(!text.contains("r_ems_exchange_requests_total{device=\"sensor\"}"));

        // A response without a fresh request records no latency sample.
        metrics.on_event(&ExchangeEvent::response(Device::Sensor, 0, "b", at(100)));
        assert_eq!(
            metrics
                .response_interval
                .with_label_values(&["sensor"])
                .get_sample_count(),
            0
        );
    }

    #[test]
    fn response_before_request_records_no_interval() {
        let metrics = ExchangeMetrics::new(new_registry()).unwrap();
        metrics.on_event(&ExchangeEvent::request(Device::Inverter, 0, "a", at(500)));
        metrics.on_event(&ExchangeEvent::response(Device::Inverter, 0, "b", at(100)));

        assert_eq!(counter(&metrics.responses, Device::Inverter), 1);
        let histogram = metrics.response_interval.with_label_values(&["inverter"]);
        assert_eq!(histogram.get_sample_count(), 0);
    }

    #[test]
    fn snapshot_file_contains_text_exposition() {
        let metrics = ExchangeMetrics::new(new_registry()).unwrap();
        metrics.on_event(&ExchangeEvent::request(Device::Bms, 0, "a", at(0)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("exchange.prom");
        write_text_file(&metrics.registry(), &path).unwrap();

        let body = fs::read_to_string(path).unwrap();
        assert!(body.contains("r_ems_exchange_requests_total{device=\"bms\"} 1"));
    }
}
