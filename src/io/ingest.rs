// src/io/ingest.rs
//
// Link ingestion loop.
// The only writer to the station sinks: pulls lines from the transport
// manager, decodes them, and routes each message to its sink. When the link
// is unavailable and mock fallback is enabled it synthesizes motion instead.
//
//   Starting ──open ok──▶ Streaming ──read error──┐
//      │                                          ▼
//      └──open failed──▶ MockStreaming (fallback on) / Stopped (fallback off)
//
// There is no automatic reconnect; power the station off and on to retry.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::io::codec::{Message, MessageCodec};
use crate::io::serial::{SerialSettings, TransportFactory, TransportManager};
use crate::io::{LinkState, SessionState};
use crate::logging::OperatorLog;
use crate::settings::StationSettings;
use crate::sinks::LinkSinks;

// ============================================================================
// Worker
// ============================================================================

/// Per-activation state of the ingestion loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestState {
    Starting,
    Streaming,
    MockStreaming,
    /// Terminal; no further sink writes
    Stopped,
}

/// One activation of the ingestion loop. Owns the transport for its lifetime,
/// so open and close happen on the same thread.
pub struct LinkWorker {
    manager: TransportManager,
    serial: SerialSettings,
    codec: MessageCodec,
    sinks: Arc<LinkSinks>,
    journal: Option<OperatorLog>,
    mock_fallback: bool,
    state: IngestState,
    rng: StdRng,
}

impl LinkWorker {
    pub fn new(
        manager: TransportManager,
        serial: SerialSettings,
        codec: MessageCodec,
        sinks: Arc<LinkSinks>,
        mock_fallback: bool,
    ) -> Self {
        LinkWorker {
            manager,
            serial,
            codec,
            sinks,
            journal: None,
            mock_fallback,
            state: IngestState::Starting,
            rng: StdRng::from_entropy(),
        }
    }

    /// Mirror log messages and link diagnostics to the daily operator log
    pub fn with_journal(mut self, journal: OperatorLog) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Deterministic mock values
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn link_state(&self) -> LinkState {
        self.manager.state()
    }

    /// Run one iteration of the loop and return the resulting state.
    pub fn step(&mut self) -> IngestState {
        match self.state {
            IngestState::Starting => self.start_link(),
            IngestState::Streaming => self.stream(),
            IngestState::MockStreaming => self.push_mock(),
            IngestState::Stopped => {}
        }
        self.state
    }

    /// Loop until cancelled or stopped, then close the transport.
    /// Returns why the loop ended: "stopped" (cancelled) or "error".
    pub fn run(mut self, cancel: &AtomicBool, tick: Duration) -> &'static str {
        tlog!(
            "[link] Worker started on {} (mock fallback: {})",
            self.serial.port,
            if self.mock_fallback { "enabled" } else { "disabled" }
        );

        let reason = loop {
            if cancel.load(Ordering::Relaxed) {
                break "stopped";
            }
            if self.step() == IngestState::Stopped {
                break "error";
            }
            std::thread::sleep(tick);
        };

        self.manager.close();
        tlog!("[link] Worker exited ({})", reason);
        reason
    }

    fn start_link(&mut self) {
        match self.manager.open(&self.serial) {
            Ok(()) => {
                tlog!(
                    "[link] Established connection with transmitter at {}",
                    self.serial.port
                );
                self.state = IngestState::Streaming;
            }
            Err(e) => {
                let diagnostic = self
                    .manager
                    .last_diagnostic()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string());
                self.fall_back(&diagnostic);
            }
        }
    }

    fn stream(&mut self) {
        match self.manager.read_line() {
            Ok(Some(line)) => self.ingest_line(&line),
            Ok(None) => {
                // Timeout with no data
            }
            Err(e) => {
                let diagnostic = self
                    .manager
                    .last_diagnostic()
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string());
                self.manager.close();
                self.fall_back(&diagnostic);
            }
        }
    }

    fn fall_back(&mut self, diagnostic: &str) {
        self.report(diagnostic);
        if self.mock_fallback {
            self.manager.enter_mock_fallback();
            self.report("Transmitter unavailable, showing simulated motion data");
            self.state = IngestState::MockStreaming;
        } else {
            self.state = IngestState::Stopped;
        }
    }

    fn ingest_line(&mut self, raw: &[u8]) {
        // Line noise between frames
        if raw.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        match self.codec.decode(raw) {
            Ok(Message::Motion { value }) => self.sinks.push_motion(value),
            Ok(Message::Log { payload }) => {
                self.journal(&payload);
                self.sinks.push_log(payload);
            }
            Ok(Message::PerformanceStatus(status)) => self.sinks.set_status(status),
            Err(e) if e.is_unknown_type() => {
                tlog!("[link] Ignoring frame: {}", e);
            }
            Err(e) => {
                tlog!("[link] Dropped frame: {}", e);
                self.sinks.push_log(format!("Dropped frame: {}", e));
            }
        }
    }

    fn push_mock(&mut self) {
        let value: i64 = self.rng.gen_range(0..=1);
        self.sinks.push_motion(value);
    }

    /// Operator-visible diagnostic: log history, daily log file and stderr
    fn report(&self, message: &str) {
        tlog!("[link] {}", message);
        self.journal(message);
        self.sinks.push_log(message);
    }

    fn journal(&self, message: &str) {
        if let Some(ref journal) = self.journal {
            if let Err(e) = journal.append(message) {
                tlog!("[link] {}", e);
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Starts and stops the ingestion worker for one station.
/// At most one worker runs at a time.
pub struct LinkSession {
    serial: SerialSettings,
    codec: MessageCodec,
    tick: Duration,
    mock_fallback: bool,
    journal: OperatorLog,
    sinks: Arc<LinkSinks>,
    factory: TransportFactory,
    link_state: Arc<RwLock<LinkState>>,
    cancel_flag: Arc<AtomicBool>,
    exit_reason: Arc<Mutex<Option<String>>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl LinkSession {
    pub fn new(
        settings: &StationSettings,
        sinks: Arc<LinkSinks>,
        factory: TransportFactory,
    ) -> Self {
        LinkSession {
            serial: settings.serial(),
            codec: settings.codec(),
            tick: settings.tick_interval(),
            mock_fallback: settings.use_mock_data,
            journal: OperatorLog::new(settings.log_dir()),
            sinks,
            factory,
            link_state: Arc::new(RwLock::new(LinkState::Disconnected)),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            exit_reason: Arc::new(Mutex::new(None)),
            task_handle: None,
        }
    }

    /// Spawn the worker. Starting a running session is a no-op.
    pub async fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Ok(());
        }

        // Reap a worker that ended on its own before starting a new one
        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tlog!("[link] Previous worker task failed: {:?}", e);
            }
        }

        self.cancel_flag.store(false, Ordering::Relaxed);
        *self.exit_reason.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let manager = TransportManager::with_state((self.factory)(), self.link_state.clone());
        let worker = LinkWorker::new(
            manager,
            self.serial.clone(),
            self.codec.clone(),
            self.sinks.clone(),
            self.mock_fallback,
        )
        .with_journal(self.journal.clone());

        let cancel_flag = self.cancel_flag.clone();
        let exit_reason = self.exit_reason.clone();
        let tick = self.tick;

        // Blocking serial I/O runs on the blocking pool
        let handle = tokio::task::spawn_blocking(move || {
            let reason = worker.run(&cancel_flag, tick);
            *exit_reason.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason.to_string());
        });
        self.task_handle = Some(handle);

        Ok(())
    }

    /// Ask the worker to stop and wait for it to close the transport.
    pub async fn stop(&mut self) -> Result<(), String> {
        self.cancel_flag.store(true, Ordering::Relaxed);

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                tlog!("[link] Worker task failed: {:?}", e);
                return Err(format!("Link worker failed: {}", e));
            }
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn state(&self) -> SessionState {
        if self.is_running() {
            return SessionState::Running;
        }
        if self.task_handle.is_some() {
            let reason = self
                .exit_reason
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .unwrap_or_else(|| "error".to_string());
            return SessionState::Ended(reason);
        }
        SessionState::Stopped
    }

    pub fn link_state(&self) -> LinkState {
        match self.link_state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn sinks(&self) -> &Arc<LinkSinks> {
        &self.sinks
    }
}

impl Drop for LinkSession {
    fn drop(&mut self) {
        // Worker notices within one tick and closes the port itself
        self.cancel_flag.store(true, Ordering::Relaxed);
    }
}

// ============================================================================
// Tests
// ============================================================================
