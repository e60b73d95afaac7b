// src/io/error.rs
//
// Typed errors for the transmitter link.
// LinkError covers the physical transport, DecodeError covers a single frame.
// Both convert to String at the controller boundary.

use std::fmt;

// ============================================================================
// Transport Errors
// ============================================================================

/// Error raised by a line transport.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkError {
    /// Device could not be opened (missing, permission denied, busy)
    Open { device: String, reason: String },
    /// I/O failure while reading a frame
    Read { device: String, reason: String },
    /// I/O failure while writing a frame
    Write { device: String, reason: String },
    /// Device returned EOF (cable pulled, device reset)
    Disconnected { device: String },
    /// Operation attempted on a transport that is not open
    NotOpen { device: String },
}

impl LinkError {
    pub fn open(device: &str, reason: impl Into<String>) -> Self {
        LinkError::Open {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    pub fn read(device: &str, reason: impl Into<String>) -> Self {
        LinkError::Read {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    pub fn write(device: &str, reason: impl Into<String>) -> Self {
        LinkError::Write {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    pub fn disconnected(device: &str) -> Self {
        LinkError::Disconnected {
            device: device.to_string(),
        }
    }

    pub fn not_open(device: &str) -> Self {
        LinkError::NotOpen {
            device: device.to_string(),
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Open { device, reason } => {
                write!(f, "failed to open {}: {}", device, reason)
            }
            LinkError::Read { device, reason } => write!(f, "read error on {}: {}", device, reason),
            LinkError::Write { device, reason } => {
                write!(f, "write error on {}: {}", device, reason)
            }
            LinkError::Disconnected { device } => write!(f, "{} disconnected", device),
            LinkError::NotOpen { device } => write!(f, "{} is not open", device),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<LinkError> for String {
    fn from(e: LinkError) -> Self {
        e.to_string()
    }
}

// ============================================================================
// Decode Errors
// ============================================================================

/// Error raised when a frame cannot be turned into a message.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeError {
    /// Frame is not a JSON object (or not a legacy text frame when enabled)
    Malformed(String),
    /// Required key missing from the frame or its payload
    MissingField(&'static str),
    /// Payload has the wrong shape for its message type
    InvalidData { kind: String, reason: String },
    /// Well-formed frame whose `type` matches no configured tag
    UnknownType(String),
}

impl DecodeError {
    pub fn invalid(kind: &str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidData {
            kind: kind.to_string(),
            reason: reason.into(),
        }
    }

    /// Unknown types are dropped quietly; everything else is operator-visible.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, DecodeError::UnknownType(_))
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(reason) => write!(f, "malformed frame: {}", reason),
            DecodeError::MissingField(field) => write!(f, "missing field '{}'", field),
            DecodeError::InvalidData { kind, reason } => {
                write!(f, "invalid {} payload: {}", kind, reason)
            }
            DecodeError::UnknownType(kind) => write!(f, "unknown message type '{}'", kind),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for String {
    fn from(e: DecodeError) -> Self {
        e.to_string()
    }
}
