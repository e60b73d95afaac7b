// src/io/serial/transport.rs
//
// Transport manager for the transmitter link.
// Owns one serial connection: open to the configured port, read/write
// newline-delimited frames, close. No retries here; fallback policy lives in
// the ingestion loop.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serialport::SerialPort;

use super::framer::LineFramer;
use super::utils::{self, Parity};
use crate::io::error::LinkError;
use crate::io::LinkState;

// ============================================================================
// Configuration
// ============================================================================

/// Serial line settings for the transmitter link
#[derive(Clone, Debug, PartialEq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    /// Upper bound on a single `read_line` call
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// 8-N-1 with a one second read timeout
    pub fn new(port: &str, baud_rate: u32) -> Self {
        SerialSettings {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout: Duration::from_secs(1),
        }
    }

    /// Short "8-N-1" style summary for log lines
    pub fn line_format(&self) -> String {
        format!("{}-{}-{}", self.data_bits, self.parity.code(), self.stop_bits)
    }
}

// ============================================================================
// Line Transport Trait
// ============================================================================

/// A byte-line transport. Implemented by the serial port and by test doubles.
pub trait LineTransport: Send {
    /// Open the device. Opening an already-open transport reopens it.
    fn open(&mut self, settings: &SerialSettings) -> Result<(), LinkError>;

    /// Wait up to the read timeout for one frame (delimiter stripped).
    /// `Ok(None)` means the timeout elapsed with no complete frame.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, LinkError>;

    /// Write one frame followed by the line delimiter.
    fn write_line(&mut self, line: &[u8]) -> Result<(), LinkError>;

    /// Release the device. Must be safe to call repeatedly.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Builds a fresh transport for each activation of the link
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn LineTransport> + Send + Sync>;

/// Factory producing real serial port transports
pub fn serial_transport_factory() -> TransportFactory {
    Arc::new(|| Box::new(SerialTransport::new()) as Box<dyn LineTransport>)
}

// ============================================================================
// Serial Port Transport
// ============================================================================

/// Line transport over a serialport device
pub struct SerialTransport {
    device: String,
    port: Option<Box<dyn SerialPort>>,
    framer: LineFramer,
    pending: VecDeque<Vec<u8>>,
    read_timeout: Duration,
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport {
    pub fn new() -> Self {
        SerialTransport {
            device: String::new(),
            port: None,
            framer: LineFramer::default(),
            pending: VecDeque::new(),
            read_timeout: Duration::from_secs(1),
        }
    }
}

impl LineTransport for SerialTransport {
    fn open(&mut self, settings: &SerialSettings) -> Result<(), LinkError> {
        self.close();
        self.device = settings.port.clone();
        self.read_timeout = settings.read_timeout;

        // Short per-read timeout; read_line loops until its own deadline so a
        // partial frame keeps accumulating across reads.
        let port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(utils::to_serialport_data_bits(settings.data_bits))
            .stop_bits(utils::to_serialport_stop_bits(settings.stop_bits))
            .parity(utils::to_serialport_parity(&settings.parity))
            .timeout(settings.read_timeout.min(Duration::from_millis(50)))
            .open()
            .map_err(|e| LinkError::open(&settings.port, e.to_string()))?;

        self.port = Some(port);
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        if let Some(line) = self.pending.pop_front() {
            return Ok(Some(line));
        }

        let port = self
            .port
            .as_mut()
            .ok_or_else(|| LinkError::not_open(&self.device))?;

        let deadline = Instant::now() + self.read_timeout;
        let mut buf = [0u8; 256];

        loop {
            match port.read(&mut buf) {
                Ok(0) => {
                    // EOF - port closed/disconnected
                    return Err(LinkError::disconnected(&self.device));
                }
                Ok(n) => {
                    for frame in self.framer.feed(&buf[..n]) {
                        if frame.incomplete {
                            tlog!(
                                "[transport] Dropping oversized frame fragment ({} bytes) on {}",
                                frame.bytes.len(),
                                self.device
                            );
                            continue;
                        }
                        self.pending.push_back(frame.bytes);
                    }
                    if let Some(line) = self.pending.pop_front() {
                        return Ok(Some(line));
                    }
                }
                Err(ref e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut
                            | std::io::ErrorKind::WouldBlock
                            | std::io::ErrorKind::Interrupted
                    ) =>
                {
                    // Timeout is expected for serial reads
                }
                Err(e) => return Err(LinkError::read(&self.device, e.to_string())),
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn write_line(&mut self, line: &[u8]) -> Result<(), LinkError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| LinkError::not_open(&self.device))?;

        port.write_all(line)
            .and_then(|_| port.write_all(b"\n"))
            .and_then(|_| port.flush())
            .map_err(|e| LinkError::write(&self.device, e.to_string()))
    }

    fn close(&mut self) {
        // Dropping the handle releases the OS device
        self.port = None;
        self.framer.reset();
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

// ============================================================================
// Transport Manager
// ============================================================================

/// Owns the transport and the link state it drives.
pub struct TransportManager {
    transport: Box<dyn LineTransport>,
    state: Arc<RwLock<LinkState>>,
    diagnostic: Option<String>,
}

impl TransportManager {
    pub fn new(transport: Box<dyn LineTransport>) -> Self {
        Self::with_state(transport, Arc::new(RwLock::new(LinkState::Disconnected)))
    }

    /// Build a manager that publishes its state into an existing handle
    pub fn with_state(transport: Box<dyn LineTransport>, state: Arc<RwLock<LinkState>>) -> Self {
        let manager = TransportManager {
            transport,
            state,
            diagnostic: None,
        };
        manager.set_state(LinkState::Disconnected);
        manager
    }

    /// Open the configured device. On failure the diagnostic is kept for the
    /// caller to surface to the operator.
    pub fn open(&mut self, settings: &SerialSettings) -> Result<(), LinkError> {
        match self.transport.open(settings) {
            Ok(()) => {
                self.diagnostic = None;
                self.set_state(LinkState::Connected);
                tlog!(
                    "[transport] Opened {} at {} baud ({})",
                    settings.port,
                    settings.baud_rate,
                    settings.line_format()
                );
                Ok(())
            }
            Err(e) => {
                self.diagnostic = Some(format!("Host port communication failed: {}", e));
                self.set_state(LinkState::Disconnected);
                Err(e)
            }
        }
    }

    /// Read one frame. Errors are returned as-is; a failed read leaves the
    /// link marked Disconnected.
    pub fn read_line(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        match self.transport.read_line() {
            Ok(line) => Ok(line),
            Err(e) => {
                self.diagnostic = Some(format!("Transmitter link lost: {}", e));
                self.set_state(LinkState::Disconnected);
                Err(e)
            }
        }
    }

    pub fn write_line(&mut self, line: &[u8]) -> Result<(), LinkError> {
        self.transport.write_line(line)
    }

    /// Release the device. Idempotent.
    pub fn close(&mut self) {
        if self.transport.is_open() {
            tlog!("[transport] Closing link");
        }
        self.transport.close();
        self.set_state(LinkState::Disconnected);
    }

    /// Mark the link as running on synthetic data
    pub fn enter_mock_fallback(&mut self) {
        self.set_state(LinkState::MockFallback);
    }

    pub fn state(&self) -> LinkState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Shared handle so readers outside the worker can observe the state
    pub fn state_handle(&self) -> Arc<RwLock<LinkState>> {
        self.state.clone()
    }

    /// Human-readable description of the last open/read failure
    pub fn last_diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    fn set_state(&self, state: LinkState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = state;
    }
}

impl Drop for TransportManager {
    fn drop(&mut self) {
        self.transport.close();
    }
}

// ============================================================================
// Test Transport
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedTransport, TransportCounters};
    use super::*;

    fn settings() -> SerialSettings {
        SerialSettings::new("/dev/ttyAMA0", 9600)
    }

    #[test]
    fn test_serial_settings_defaults() {
        let s = settings();
        assert_eq!(s.line_format(), "8-N-1");
        assert_eq!(s.read_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut manager = TransportManager::new(Box::new(SerialTransport::new()));

        // Never opened
        manager.close();
        manager.close();
        assert_eq!(manager.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_close_twice_after_open() {
        let counters = Arc::new(TransportCounters::default());
        let mut manager = TransportManager::new(Box::new(ScriptedTransport::new(counters.clone())));

        manager.open(&settings()).unwrap();
        assert!(manager.is_connected());

        manager.close();
        manager.close();
        assert_eq!(counters.closes(), 1);
        assert_eq!(manager.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_open_missing_device_records_diagnostic() {
        let mut manager = TransportManager::new(Box::new(SerialTransport::new()));
        let s = SerialSettings::new("/dev/motion-hmi-no-such-port", 9600);

        let err = manager.open(&s).unwrap_err();

        assert!(matches!(err, LinkError::Open { .. }));
        assert_eq!(manager.state(), LinkState::Disconnected);
        let diag = manager.last_diagnostic().unwrap();
        assert!(diag.starts_with("Host port communication failed"));
        assert!(diag.contains("/dev/motion-hmi-no-such-port"));
    }

    #[test]
    fn test_read_without_open_is_error() {
        let mut transport = SerialTransport::new();
        assert!(matches!(transport.read_line(), Err(LinkError::NotOpen { .. })));
        assert!(matches!(transport.write_line(b"x"), Err(LinkError::NotOpen { .. })));
    }

    #[test]
    fn test_read_error_marks_disconnected() {
        let counters = Arc::new(TransportCounters::default());
        let transport = ScriptedTransport::new(counters)
            .with_result(Err(LinkError::disconnected("/dev/ttyAMA0")));
        let mut manager = TransportManager::new(Box::new(transport));
        manager.open(&settings()).unwrap();

        assert!(manager.read_line().is_err());
        assert_eq!(manager.state(), LinkState::Disconnected);
        assert!(manager.last_diagnostic().unwrap().contains("disconnected"));
    }

    #[test]
    fn test_state_handle_is_shared() {
        let counters = Arc::new(TransportCounters::default());
        let mut manager = TransportManager::new(Box::new(ScriptedTransport::new(counters)));
        let handle = manager.state_handle();

        manager.open(&settings()).unwrap();
        assert_eq!(*handle.read().unwrap(), LinkState::Connected);

        manager.close();
        manager.enter_mock_fallback();
        assert_eq!(*handle.read().unwrap(), LinkState::MockFallback);
    }

    /// Open the slave end of a pseudo-terminal through SerialTransport
    #[cfg(unix)]
    fn open_pty(read_timeout: Duration) -> (serialport::TTYPort, SerialTransport) {
        let (master, slave) = serialport::TTYPort::pair().unwrap();
        let path = slave.name().unwrap();

        let mut s = SerialSettings::new(&path, 9600);
        s.read_timeout = read_timeout;
        let mut transport = SerialTransport::new();
        transport.open(&s).unwrap();

        // The slave handle is only needed to keep the pair alive until open
        drop(slave);
        (master, transport)
    }

    #[cfg(unix)]
    #[test]
    fn test_serial_transport_reads_pty_frames() {
        let (mut master, mut transport) = open_pty(Duration::from_millis(300));

        master
            .write_all(b"{\"type\":\"MOTION\",\"data\":1}\r\n{\"type\":\"MOTION\",\"data\":0}\n{\"type\":")
            .unwrap();
        master.flush().unwrap();

        // Two frames from one write come back in order, CR stripped
        assert_eq!(
            transport.read_line().unwrap(),
            Some(b"{\"type\":\"MOTION\",\"data\":1}".to_vec())
        );
        assert_eq!(
            transport.read_line().unwrap(),
            Some(b"{\"type\":\"MOTION\",\"data\":0}".to_vec())
        );

        // A partial frame times out instead of blocking
        let started = Instant::now();
        assert_eq!(transport.read_line().unwrap(), None);
        assert!(started.elapsed() >= Duration::from_millis(250));

        // The rest of the partial frame completes it
        master.write_all(b"\"LOG\",\"data\":\"ok\"}\n").unwrap();
        master.flush().unwrap();
        let mut line = None;
        for _ in 0..5 {
            line = transport.read_line().unwrap();
            if line.is_some() {
                break;
            }
        }
        assert_eq!(line, Some(b"{\"type\":\"LOG\",\"data\":\"ok\"}".to_vec()));

        // Hanging up the other end surfaces as an error
        drop(master);
        let mut result = Ok(None);
        for _ in 0..5 {
            result = transport.read_line();
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_serial_transport_drops_oversized_line() {
        let (mut master, mut transport) = open_pty(Duration::from_millis(300));
        transport.framer = LineFramer::new(16);

        master.write_all(b"0123456789abcdefghijklmnop\nMOTION:1\n").unwrap();
        master.flush().unwrap();

        let mut line = None;
        for _ in 0..5 {
            line = transport.read_line().unwrap();
            if line.is_some() {
                break;
            }
        }
        assert_eq!(line, Some(b"MOTION:1".to_vec()));
    }

    #[test]
    fn test_write_line_reaches_transport() {
        let counters = Arc::new(TransportCounters::default());
        let mut manager = TransportManager::new(Box::new(ScriptedTransport::new(counters.clone())));
        manager.open(&settings()).unwrap();

        manager.write_line(b"{\"type\":\"MOTION\",\"data\":1}").unwrap();

        let written = counters.written.lock().unwrap();
        assert_eq!(written.len(), 1);
    }
}
