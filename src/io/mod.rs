// src/io/mod.rs
//
// Transmitter link: serial transport, message codec and the ingestion loop
// that feeds the station sinks.

pub mod codec; // Wire message codec
mod error;
pub mod ingest; // Ingestion loop and session lifecycle
pub mod serial; // Serial transport and line framing

pub use codec::{Message, MessageCodec, MessageTypes, PerformanceStatus};
pub use error::{DecodeError, LinkError};
pub use ingest::{IngestState, LinkSession, LinkWorker};
pub use serial::{
    list_serial_ports, serial_transport_factory, LineTransport, Parity, SerialPortInfo,
    SerialSettings, SerialTransport, TransportFactory, TransportManager,
};

use serde::{Deserialize, Serialize};

// ============================================================================
// Shared Types
// ============================================================================

/// Connectivity of the transmitter link, owned by the transport manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connected,
    /// Transport unavailable; motion values are synthetic
    MockFallback,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connected => "connected",
            LinkState::MockFallback => "mock",
        }
    }
}

/// Lifecycle of a link session (one activation of the ingestion worker)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SessionState {
    Stopped,
    Running,
    /// Worker exited on its own (open/read failure with fallback disabled)
    Ended(String),
}
