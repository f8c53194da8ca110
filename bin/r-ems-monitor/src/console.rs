//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Console rendering of the followed device log and the summary table."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fmt::Write as _;
use std::io::{self, Write};

use parking_lot::Mutex;
use r_ems_common::time::display_timestamp;
use r_ems_sim::{Device, ExchangeEvent, ExchangeSink, LinkStatus, SummaryReport};
use tracing::debug;

/// Prints the exchange of one selected device, one line per transmission.
pub struct FollowSink<W> {
    device: Device,
    out: Mutex<W>,
}

impl FollowSink<io::Stdout> {
    pub fn stdout(device: Device) -> Self {
        Self::new(device, io::stdout())
    }
}

impl<W: Write + Send> FollowSink<W> {
    pub fn new(device: Device, out: W) -> Self {
        Self {
            device,
            out: Mutex::new(out),
        }
    }

    fn emit(&self, line: std::fmt::Arguments<'_>) {
        let mut out = self.out.lock();
        if let Err(err) = out.write_fmt(line).and_then(|_| out.write_all(b"\n")) {
            debug!(error = %err, "follow output unavailable");
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> ExchangeSink for FollowSink<W> {
    fn on_event(&self, event: &ExchangeEvent) {
        if event.device == self.device {
            self.emit(format_args!(
                "[{}] {}",
                display_timestamp(event.timestamp),
                event.console_line()
            ));
        }
    }

    fn on_drop(&self, device: Device, cycle: u32) {
        if device == self.device {
            self.emit(format_args!(
                "!! {}: response of cycle {} dropped",
                device.label(),
                cycle
            ));
        }
    }

    fn on_reset(&self) {
        self.emit(format_args!("-- {} log cleared", self.device.label()));
    }
}

fn status_marker(status: LinkStatus) -> &'static str {
    match status {
        LinkStatus::Healthy => "ok",
        LinkStatus::Degraded => "!",
        LinkStatus::Critical => "!!",
    }
}

/// Render the per-device rows and the totals row as a fixed-width table.
pub fn render_summary(summary: &SummaryReport) -> String {
    let mut table = String::new();
    let _ = writeln!(
        table,
        "{:<10} {:>9} {:>9} {:>6} {:>6} {:>7} {:<12} {:>9}",
        "DEVICE", "REQUESTS", "RESPONSES", "DROPS", "ERRORS", "RATE%", "STATUS", "INTERVAL"
    );
    for report in &summary.devices {
        let interval = report
            .timing
            .last_interval_seconds
            .map(|seconds| format!("{:.2}s", seconds))
            .unwrap_or_else(|| "-".to_owned());
        let _ = writeln!(
            table,
            "{:<10} {:>9} {:>9} {:>6} {:>6} {:>7.1} {:<12} {:>9}",
            report.device.label(),
            report.counters.requests,
            report.counters.responses,
            report.counters.drops,
            report.errors,
            report.delivery_rate,
            format!("{} {}", report.status, status_marker(report.status)),
            interval
        );
    }
    let totals = &summary.totals;
    let _ = writeln!(
        table,
        "{:<10} {:>9} {:>9} {:>6} {:>6} {:>7.1} {:<12} {:>9}",
        "TOTAL",
        totals.requests,
        totals.responses,
        totals.drops,
        totals.errors,
        totals.delivery_rate,
        format!("{} {}", totals.status, status_marker(totals.status)),
        ""
    );
    table
}
