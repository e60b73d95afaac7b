// src/lib.rs
//
// MotionHMI control station core.
// Transmitter link (serial transport, codec, ingestion loop), the sinks it
// feeds, station telemetry and the station controller used by front ends.

#[macro_use]
mod logging;

pub mod io;
pub mod monitor;
pub mod settings;
pub mod sinks;
pub mod station;

pub use logging::{init_file_logging, stop_file_logging, OperatorLog};
pub use settings::{default_settings_path, load_settings, StationSettings};
pub use station::{ConsoleDisplay, Station, StationControl, StationDisplay, StationView};

use std::path::PathBuf;

// ============================================================================
// Headless Runner
// ============================================================================

/// Run the station headless: power on, render to the console once per
/// update interval, power off on Ctrl-C.
/// The first argument, if given, is the settings file path.
pub fn run() {
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);

    let settings = match load_settings(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("[setup] {}: {}", settings_path.display(), e);
            std::process::exit(1);
        }
    };

    if settings.diagnostic_logging {
        if let Err(e) = init_file_logging(&settings.log_dir()) {
            eprintln!("[setup] {}", e);
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("[setup] Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(run_station(settings));
    stop_file_logging();

    if let Err(e) = result {
        eprintln!("[station] {}", e);
        std::process::exit(1);
    }
}

async fn run_station(settings: StationSettings) -> Result<(), String> {
    let update_interval = settings.update_interval();
    let mut station = Station::new(settings);
    let mut display = ConsoleDisplay::new();

    station.power_on().await?;

    let mut ticker = tokio::time::interval(update_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => station.tick(&mut display),
            _ = &mut shutdown => {
                tlog!("[station] Shutdown requested");
                break;
            }
        }
    }

    station.power_off().await
}
