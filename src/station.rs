// src/station.rs
//
// Station controller: power on/off and read accessors over the link sinks,
// link state, station telemetry and the measurement log.
// Any front end (console runner, GUI, kiosk) drives the core only through
// StationControl and renders StationView.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::io::{
    serial_transport_factory, LinkSession, LinkState, PerformanceStatus, SessionState,
    TransportFactory,
};
use crate::monitor::{
    MeasurementLog, MeasurementRecord, MetricsSource, StationMetrics, SysinfoMonitor,
};
use crate::settings::StationSettings;
use crate::sinks::LinkSinks;

// ============================================================================
// Control Seam
// ============================================================================

/// Commands and read accessors available to a station front end
#[async_trait]
pub trait StationControl: Send {
    /// Clear the sinks and start the link. No-op when already on.
    async fn power_on(&mut self) -> Result<(), String>;

    /// Stop the link and close the transport. No-op when already off.
    async fn power_off(&mut self) -> Result<(), String>;

    fn is_powered(&self) -> bool;

    fn motion_history(&self) -> Vec<i64>;

    fn log_history(&self) -> Vec<String>;

    fn transmitter_status(&self) -> Option<PerformanceStatus>;

    fn link_state(&self) -> LinkState;

    fn station_metrics(&self) -> Option<StationMetrics>;

    fn measurements(&self) -> &[MeasurementRecord];
}

/// Renders one StationView per display tick
pub trait StationDisplay {
    fn render(&mut self, view: &StationView);
}

/// Everything a front end shows, captured at one instant
#[derive(Clone, Debug, Serialize)]
pub struct StationView {
    pub powered: bool,
    pub link_state: LinkState,
    pub session: SessionState,
    pub motion: Vec<i64>,
    pub motion_detected: bool,
    pub logs: Vec<String>,
    /// Log lines pushed since the station was built, including evicted ones
    pub logs_total: u64,
    pub transmitter: Option<PerformanceStatus>,
    pub station: Option<StationMetrics>,
    pub measurements_recorded: usize,
}

// ============================================================================
// Station
// ============================================================================

pub struct Station {
    settings: StationSettings,
    sinks: Arc<LinkSinks>,
    session: LinkSession,
    metrics: Box<dyn MetricsSource>,
    last_metrics: Option<StationMetrics>,
    measurements: MeasurementLog,
    powered: bool,
}

impl Station {
    /// Station on the configured serial port with OS telemetry
    pub fn new(settings: StationSettings) -> Self {
        let sinks = Arc::new(LinkSinks::new(
            settings.motion_history_length,
            settings.logs_history_length,
        ));
        let session = LinkSession::new(&settings, sinks.clone(), serial_transport_factory());

        Station {
            settings,
            sinks,
            session,
            metrics: Box::new(SysinfoMonitor::new()),
            last_metrics: None,
            measurements: MeasurementLog::default(),
            powered: false,
        }
    }

    /// Replace the transport used by future power-ons
    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.session = LinkSession::new(&self.settings, self.sinks.clone(), factory);
        self
    }

    pub fn with_metrics_source(mut self, source: Box<dyn MetricsSource>) -> Self {
        self.metrics = source;
        self
    }

    pub fn settings(&self) -> &StationSettings {
        &self.settings
    }

    pub fn sinks(&self) -> &Arc<LinkSinks> {
        &self.sinks
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// One display tick: sample telemetry and record a measurement while
    /// powered on, then hand the current view to the display.
    pub fn tick(&mut self, display: &mut dyn StationDisplay) {
        if self.powered {
            let metrics = self.metrics.sample();
            let motion = self.sinks.motion().latest();
            self.measurements
                .push(MeasurementRecord::from_metrics(&metrics, motion));
            self.last_metrics = Some(metrics);
        }

        display.render(&self.view());
    }

    pub fn view(&self) -> StationView {
        let motion = self.sinks.motion().snapshot();
        let motion_detected = motion.last().map(|v| *v != 0).unwrap_or(false);
        let (logs, logs_total) = self.sinks.logs().snapshot_with_total();

        StationView {
            powered: self.powered,
            link_state: self.session.link_state(),
            session: self.session.state(),
            motion,
            motion_detected,
            logs,
            logs_total,
            transmitter: self.sinks.status().get(),
            station: self.last_metrics.clone(),
            measurements_recorded: self.measurements.len(),
        }
    }
}

#[async_trait]
impl StationControl for Station {
    async fn power_on(&mut self) -> Result<(), String> {
        if self.powered {
            return Ok(());
        }

        self.sinks.reset();
        self.measurements.clear();
        self.last_metrics = None;

        self.session.start().await?;
        self.powered = true;
        tlog!(
            "[station] Powered on ({} @ {} baud, {})",
            self.settings.serial_port,
            self.settings.baud_rate,
            self.settings.serial().line_format()
        );
        Ok(())
    }

    async fn power_off(&mut self) -> Result<(), String> {
        if !self.powered {
            return Ok(());
        }

        let result = self.session.stop().await;
        self.powered = false;
        tlog!("[station] Powered off");
        result
    }

    fn is_powered(&self) -> bool {
        self.powered
    }

    fn motion_history(&self) -> Vec<i64> {
        self.sinks.motion().snapshot()
    }

    fn log_history(&self) -> Vec<String> {
        self.sinks.logs().snapshot()
    }

    fn transmitter_status(&self) -> Option<PerformanceStatus> {
        self.sinks.status().get()
    }

    fn link_state(&self) -> LinkState {
        self.session.link_state()
    }

    fn station_metrics(&self) -> Option<StationMetrics> {
        self.last_metrics.clone()
    }

    fn measurements(&self) -> &[MeasurementRecord] {
        self.measurements.records()
    }
}

// ============================================================================
// Console Display
// ============================================================================

/// Plain-text display for headless stations
#[derive(Default)]
pub struct ConsoleDisplay {
    logs_printed: u64,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// One status line for the current view
    pub fn status_line(view: &StationView) -> String {
        if !view.powered {
            return "System OFF".to_string();
        }

        let motion = if view.motion_detected { "MOTION" } else { "Clear" };
        let mut line = format!("[{}] {}", view.link_state.as_str(), motion);

        if let Some(ref status) = view.transmitter {
            line.push_str(&format!(
                " | TX cpu {:.1}% ram {:.1}% disk {:.1}% up {:.1} kB/s down {:.1} kB/s {}",
                status.cpu,
                status.ram,
                status.disk,
                status.net_up_kbps,
                status.net_down_kbps,
                status.version
            ));
        }

        if let Some(ref station) = view.station {
            line.push_str(&format!(
                " | HMI cpu {:.1}% ram {:.2}/{:.2} GB disk {:.2}/{:.2} GB",
                station.cpu_percent,
                station.ram_used_gb,
                station.ram_total_gb,
                station.disk_used_gb,
                station.disk_total_gb
            ));
        }

        line
    }

    /// Log lines pushed since the last call. Lines evicted from the ring
    /// before they were seen are skipped.
    fn take_new_logs<'a>(&mut self, view: &'a StationView) -> &'a [String] {
        if view.logs_total < self.logs_printed {
            // Different station behind this display
            self.logs_printed = 0;
        }
        let fresh = (view.logs_total - self.logs_printed).min(view.logs.len() as u64) as usize;
        self.logs_printed = view.logs_total;
        &view.logs[view.logs.len() - fresh..]
    }
}

impl StationDisplay for ConsoleDisplay {
    fn render(&mut self, view: &StationView) {
        for log in self.take_new_logs(view) {
            println!("  log: {}", log);
        }

        println!("{}", Self::status_line(view));
    }
}

// ============================================================================
// Tests
// ============================================================================
