// src/settings.rs
//
// Station settings: serial line, link behaviour, history sizes, message tags
// and the log directory. Loaded from JSON or TOML; written by the external
// settings editor, never by this crate.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::{MessageCodec, MessageTypes, Parity, SerialSettings};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StationSettings {
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Pause between ingestion loop iterations
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Display refresh period
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_motion_history_length")]
    pub motion_history_length: usize,
    #[serde(default = "default_logs_history_length")]
    pub logs_history_length: usize,
    #[serde(default)]
    pub message_types: MessageTypes,
    /// Synthesize motion when the transmitter link is unavailable
    #[serde(default)]
    pub use_mock_data: bool,
    /// Accept plain-text `MOTION:<n>` frames from older transmitters
    #[serde(default)]
    pub legacy_text_frames: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Mirror the process log to a timestamped file in log_dir
    #[serde(default)]
    pub diagnostic_logging: bool,
}

fn default_serial_port() -> String {
    "/dev/ttyAMA0".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_update_interval_ms() -> u64 {
    1000 // 1 second GUI update
}
fn default_motion_history_length() -> usize {
    50
}
fn default_logs_history_length() -> usize {
    10
}
fn default_log_dir() -> String {
    dirs::document_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("MotionHMI")
        .join("Logs")
        .to_string_lossy()
        .to_string()
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: Parity::default(),
            read_timeout_ms: default_read_timeout_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            update_interval_ms: default_update_interval_ms(),
            motion_history_length: default_motion_history_length(),
            logs_history_length: default_logs_history_length(),
            message_types: MessageTypes::default(),
            use_mock_data: false,
            legacy_text_frames: false,
            log_dir: default_log_dir(),
            diagnostic_logging: false,
        }
    }
}

impl StationSettings {
    /// Serial line settings for the transport manager
    pub fn serial(&self) -> SerialSettings {
        SerialSettings {
            port: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    /// Codec configured with this station's message tags
    pub fn codec(&self) -> MessageCodec {
        MessageCodec::new(self.message_types.clone())
            .with_legacy_text_frames(self.legacy_text_frames)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.log_dir)
    }

    /// Reject values the link cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.serial_port.trim().is_empty() {
            return Err("serial_port must not be empty".to_string());
        }
        if self.baud_rate == 0 {
            return Err("baud_rate must be greater than zero".to_string());
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(format!("data_bits must be 5-8, got {}", self.data_bits));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(format!("stop_bits must be 1 or 2, got {}", self.stop_bits));
        }
        if self.read_timeout_ms == 0 || self.tick_interval_ms == 0 || self.update_interval_ms == 0 {
            return Err("timeouts and intervals must be greater than zero".to_string());
        }
        if self.motion_history_length == 0 || self.logs_history_length == 0 {
            return Err("history lengths must be greater than zero".to_string());
        }

        let types = &self.message_types;
        let tags = [&types.motion, &types.logs, &types.performance_status];
        if tags.iter().any(|t| t.trim().is_empty()) {
            return Err("message type tags must not be empty".to_string());
        }
        if types.motion == types.logs
            || types.motion == types.performance_status
            || types.logs == types.performance_status
        {
            return Err("message type tags must be distinct".to_string());
        }

        Ok(())
    }
}

/// Default settings file location: `<config dir>/MotionHMI/settings.json`
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("MotionHMI")
        .join("settings.json")
}

/// Load settings from a `.json` or `.toml` file.
/// A missing file yields defaults; a present but invalid file is an error.
pub fn load_settings(path: &Path) -> Result<StationSettings, String> {
    if !path.exists() {
        tlog!("[settings] {} not found, using defaults", path.display());
        return Ok(StationSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings: {}", e))?;

    let settings: StationSettings = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => {
            toml::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))?
        }
        _ => serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse settings: {}", e))?,
    };

    settings.validate()?;
    Ok(settings)
}
