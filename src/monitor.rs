// src/monitor.rs
//
// Control station telemetry: CPU, RAM, disk and network throughput of the
// machine running the HMI, plus the per-tick measurement log.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::time::Instant;
use sysinfo::{Disks, Networks, System};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One sample of the control station's own resources
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StationMetrics {
    pub cpu_percent: f64,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    pub net_up_kbps: f64,
    pub net_down_kbps: f64,
    pub sampled_at: NaiveDateTime,
}

impl StationMetrics {
    pub fn ram_percent(&self) -> f64 {
        percent(self.ram_used_gb, self.ram_total_gb)
    }

    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used_gb, self.disk_total_gb)
    }
}

fn percent(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        used / total * 100.0
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Source of station metrics; swapped out in tests
pub trait MetricsSource: Send {
    fn sample(&mut self) -> StationMetrics;
}

// ============================================================================
// sysinfo
// ============================================================================

/// Metrics from the operating system via sysinfo.
/// CPU usage and network rates are deltas, so the first sample after
/// construction reports them against the construction-time baseline.
pub struct SysinfoMonitor {
    system: System,
    networks: Networks,
    last_rx: u64,
    last_tx: u64,
    last_sample: Instant,
}

impl Default for SysinfoMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();

        let networks = Networks::new_with_refreshed_list();
        let (last_rx, last_tx) = network_totals(&networks);

        SysinfoMonitor {
            system,
            networks,
            last_rx,
            last_tx,
            last_sample: Instant::now(),
        }
    }

    fn disk_usage() -> (u64, u64) {
        let disks = Disks::new_with_refreshed_list();

        // Prefer the root filesystem; otherwise sum everything mounted
        if let Some(root) = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
        {
            return (
                root.total_space().saturating_sub(root.available_space()),
                root.total_space(),
            );
        }

        disks.list().iter().fold((0, 0), |(used, total), d| {
            (
                used + d.total_space().saturating_sub(d.available_space()),
                total + d.total_space(),
            )
        })
    }
}

fn network_totals(networks: &Networks) -> (u64, u64) {
    networks.iter().fold((0, 0), |(rx, tx), (_name, data)| {
        (rx + data.total_received(), tx + data.total_transmitted())
    })
}

impl MetricsSource for SysinfoMonitor {
    fn sample(&mut self) -> StationMetrics {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.networks.refresh(true);

        let elapsed = self.last_sample.elapsed().as_secs_f64();
        self.last_sample = Instant::now();

        let (rx, tx) = network_totals(&self.networks);
        // Counters can go backwards when an interface disappears
        let rx_delta = rx.saturating_sub(self.last_rx);
        let tx_delta = tx.saturating_sub(self.last_tx);
        self.last_rx = rx;
        self.last_tx = tx;

        let rate = |bytes: u64| {
            if elapsed > 0.0 {
                round2(bytes as f64 / 1024.0 / elapsed)
            } else {
                0.0
            }
        };

        let (disk_used, disk_total) = Self::disk_usage();

        StationMetrics {
            cpu_percent: round2(self.system.global_cpu_usage() as f64),
            ram_used_gb: round2(self.system.used_memory() as f64 / BYTES_PER_GB),
            ram_total_gb: round2(self.system.total_memory() as f64 / BYTES_PER_GB),
            disk_used_gb: round2(disk_used as f64 / BYTES_PER_GB),
            disk_total_gb: round2(disk_total as f64 / BYTES_PER_GB),
            net_up_kbps: rate(tx_delta),
            net_down_kbps: rate(rx_delta),
            sampled_at: Local::now().naive_local(),
        }
    }
}

// ============================================================================
// Measurement Log
// ============================================================================

/// One row per display tick while the station is powered on
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeasurementRecord {
    #[serde(rename = "Timestamp")]
    pub timestamp: NaiveDateTime,
    #[serde(rename = "CPU")]
    pub cpu: f64,
    #[serde(rename = "RAM")]
    pub ram: f64,
    #[serde(rename = "DISK")]
    pub disk: f64,
    /// Latest motion reading, if any has arrived
    #[serde(rename = "Motion")]
    pub motion: Option<i64>,
}

impl MeasurementRecord {
    pub fn from_metrics(metrics: &StationMetrics, motion: Option<i64>) -> Self {
        MeasurementRecord {
            timestamp: metrics.sampled_at,
            cpu: metrics.cpu_percent,
            ram: metrics.ram_used_gb,
            disk: metrics.disk_used_gb,
            motion,
        }
    }
}

/// Measurements recorded since the last power-on
#[derive(Clone, Debug, Default, Serialize)]
pub struct MeasurementLog {
    records: Vec<MeasurementRecord>,
}

impl MeasurementLog {
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn push(&mut self, record: MeasurementRecord) {
        self.records.push(record);
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod tests {
    use super::testing::FixedMetrics;
    use super::*;

    #[test]
    fn test_percentages() {
        let metrics = FixedMetrics::new().sample();
        assert_eq!(metrics.ram_percent(), 37.5);
        assert_eq!(metrics.disk_percent(), 25.0);

        let empty = StationMetrics {
            ram_total_gb: 0.0,
            ..metrics
        };
        assert_eq!(empty.ram_percent(), 0.0);
    }

    #[test]
    fn test_sysinfo_sample_is_sane() {
        let mut monitor = SysinfoMonitor::new();
        let metrics = monitor.sample();

        assert!(metrics.cpu_percent >= 0.0);
        assert!(metrics.ram_total_gb > 0.0);
        assert!(metrics.ram_used_gb <= metrics.ram_total_gb);
        assert!(metrics.disk_used_gb <= metrics.disk_total_gb);
        assert!(metrics.net_up_kbps >= 0.0);
        assert!(metrics.net_down_kbps >= 0.0);
    }

    #[test]
    fn test_measurement_record_from_metrics() {
        let metrics = FixedMetrics::new().sample();
        let record = MeasurementRecord::from_metrics(&metrics, Some(1));

        assert_eq!(record.cpu, 12.5);
        assert_eq!(record.ram, 1.5);
        assert_eq!(record.disk, 10.0);
        assert_eq!(record.motion, Some(1));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["CPU"], 12.5);
        assert_eq!(json["Motion"], 1);
        assert_eq!(json["Timestamp"], "2025-01-01T12:00:00");
    }

    #[test]
    fn test_measurement_log_push_and_clear() {
        let metrics = FixedMetrics::new().sample();
        let mut log = MeasurementLog::default();

        log.push(MeasurementRecord::from_metrics(&metrics, None));
        log.push(MeasurementRecord::from_metrics(&metrics, Some(0)));
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].motion, None);

        log.clear();
        assert!(log.is_empty());
    }
}
