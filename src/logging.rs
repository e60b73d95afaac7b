// src/logging.rs
//
// Process logging (tlog!) and the operator log file.
//
// tlog! is the diagnostic log for developers: stderr, optionally mirrored to
// a session file. OperatorLog is the persisted event log the station shows to
// the operator: one file per calendar day, "<timestamp>: <message>" lines.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};

use crate::io::codec::DISPLAY_TIME_FORMAT;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Initialise file logging to the given directory.
/// Creates a timestamped log file and a `MotionHMI.log` symlink (Unix only).
pub fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = Local::now().format("%Y%m%d-%H%M%S-MotionHMI.log").to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    // Windows symlinks require elevated privileges
    #[cfg(unix)]
    {
        let symlink_path = log_dir.join("MotionHMI.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create MotionHMI.log symlink: {}",
                Local::now().format("%H:%M:%S%.3f"),
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // Use eprintln directly here since tlog! would try to lock LOG_FILE (which we just set)
    eprintln!(
        "{} [logging] File logging started: {}",
        Local::now().format("%H:%M:%S%.3f"),
        log_path.display()
    );

    Ok(())
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!(
                "{} [logging] File logging stopped",
                Local::now().format("%H:%M:%S%.3f")
            );
        }
    }
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!(
            "{} {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            format_args!($($arg)*)
        );
        eprintln!("{}", msg);
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}

// ============================================================================
// Operator Log
// ============================================================================

/// Daily operator log: `<dir>/motion-<YYYY-MM-DD>.log`
#[derive(Clone, Debug)]
pub struct OperatorLog {
    dir: PathBuf,
}

impl OperatorLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        OperatorLog { dir: dir.into() }
    }

    /// File that receives lines written on `date`
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("motion-{}.log", date.format("%Y-%m-%d")))
    }

    /// Append one line stamped with the current local time.
    /// The file is reopened per line so a new day starts a new file.
    pub fn append(&self, message: &str) -> Result<(), String> {
        let now = Local::now();

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create log dir {}: {}", self.dir.display(), e))?;

        let path = self.path_for(now.date_naive());
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;

        writeln!(file, "{}: {}", now.format(DISPLAY_TIME_FORMAT), message)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }
}
