// src/io/codec.rs
//
// Wire codec for transmitter messages.
//
// Frame format (one per line, UTF-8):
//   {"type": "<tag>", "data": <payload>}
//
// Tags are configurable (MessageTypes) so the remote node can relabel them
// without a code change. Payloads:
//   MOTION              integer 0/1 (or a small intensity level)
//   LOGS                string (other JSON payloads are kept as JSON text)
//   PERFORMANCE_STATUS  {cpu, ram, disk, net_up, net_down, timestamp, version}
//
// Decoding is pure: no I/O and no shared state.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::io::error::DecodeError;

/// Station display format, also accepted for incoming status timestamps
pub const DISPLAY_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

// ============================================================================
// Types
// ============================================================================

/// Health snapshot reported by the remote node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStatus {
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
    pub net_up_kbps: f64,
    pub net_down_kbps: f64,
    pub version: String,
    pub timestamp: NaiveDateTime,
}

/// One decoded frame
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Motion { value: i64 },
    Log { payload: String },
    PerformanceStatus(PerformanceStatus),
}

/// Kind of message a tag maps to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Motion,
    Log,
    PerformanceStatus,
}

/// Tag strings for each message kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageTypes {
    #[serde(default = "default_motion_tag")]
    pub motion: String,
    #[serde(default = "default_logs_tag")]
    pub logs: String,
    #[serde(default = "default_performance_status_tag")]
    pub performance_status: String,
}

fn default_motion_tag() -> String {
    "MOTION".to_string()
}
fn default_logs_tag() -> String {
    "LOGS".to_string()
}
fn default_performance_status_tag() -> String {
    "PERFORMANCE_STATUS".to_string()
}

impl Default for MessageTypes {
    fn default() -> Self {
        MessageTypes {
            motion: default_motion_tag(),
            logs: default_logs_tag(),
            performance_status: default_performance_status_tag(),
        }
    }
}

impl MessageTypes {
    /// Map a wire tag to its message kind
    pub fn classify(&self, tag: &str) -> Option<MessageKind> {
        if tag == self.motion {
            Some(MessageKind::Motion)
        } else if tag == self.logs {
            Some(MessageKind::Log)
        } else if tag == self.performance_status {
            Some(MessageKind::PerformanceStatus)
        } else {
            None
        }
    }

    pub fn tag(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Motion => &self.motion,
            MessageKind::Log => &self.logs,
            MessageKind::PerformanceStatus => &self.performance_status,
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Decodes frames into messages and encodes messages into frames
#[derive(Clone, Debug, Default)]
pub struct MessageCodec {
    types: MessageTypes,
    legacy_text_frames: bool,
}

impl MessageCodec {
    pub fn new(types: MessageTypes) -> Self {
        MessageCodec {
            types,
            legacy_text_frames: false,
        }
    }

    /// Also accept plain-text `MOTION:<n>` frames from older transmitters
    pub fn with_legacy_text_frames(mut self, enabled: bool) -> Self {
        self.legacy_text_frames = enabled;
        self
    }

    /// Decode one line (delimiter already stripped).
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected; the radio
    /// link is noisy.
    pub fn decode(&self, raw: &[u8]) -> Result<Message, DecodeError> {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim();
        if line.is_empty() {
            return Err(DecodeError::Malformed("empty frame".to_string()));
        }

        let frame: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                if self.legacy_text_frames {
                    if let Some(result) = self.decode_legacy(line) {
                        return result;
                    }
                }
                return Err(DecodeError::Malformed(e.to_string()));
            }
        };

        let obj = frame
            .as_object()
            .ok_or_else(|| DecodeError::Malformed("expected a JSON object".to_string()))?;

        let tag = obj
            .get("type")
            .ok_or(DecodeError::MissingField("type"))?
            .as_str()
            .ok_or_else(|| DecodeError::Malformed("'type' must be a string".to_string()))?;
        let data = obj.get("data").ok_or(DecodeError::MissingField("data"))?;

        let kind = self
            .types
            .classify(tag)
            .ok_or_else(|| DecodeError::UnknownType(tag.to_string()))?;

        let message = match kind {
            MessageKind::Motion => Message::Motion {
                value: motion_value(tag, data)?,
            },
            MessageKind::Log => Message::Log {
                payload: log_payload(data),
            },
            MessageKind::PerformanceStatus => {
                Message::PerformanceStatus(performance_status(tag, data)?)
            }
        };

        Ok(message)
    }

    /// Encode a message as a canonical JSON frame (no trailing newline)
    pub fn encode(&self, message: &Message) -> Vec<u8> {
        let frame = match message {
            Message::Motion { value } => json!({
                "type": self.types.tag(MessageKind::Motion),
                "data": value,
            }),
            Message::Log { payload } => json!({
                "type": self.types.tag(MessageKind::Log),
                "data": payload,
            }),
            Message::PerformanceStatus(status) => json!({
                "type": self.types.tag(MessageKind::PerformanceStatus),
                "data": {
                    "cpu": status.cpu,
                    "ram": status.ram,
                    "disk": status.disk,
                    "net_up": status.net_up_kbps,
                    "net_down": status.net_down_kbps,
                    "timestamp": status.timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
                    "version": status.version,
                },
            }),
        };
        frame.to_string().into_bytes()
    }

    /// `MOTION:1` / `MOTION: 1`. Returns None if the line is not a legacy frame.
    fn decode_legacy(&self, line: &str) -> Option<Result<Message, DecodeError>> {
        let prefix = format!("{}:", self.types.motion);
        let rest = line.strip_prefix(prefix.as_str())?;
        let value = Value::String(rest.trim().to_string());
        Some(motion_value(&self.types.motion, &value).map(|value| Message::Motion { value }))
    }
}

// ============================================================================
// Payload Validation
// ============================================================================

/// Coerce a motion payload to an integer.
/// Accepts integers, integral floats, booleans, numeric strings and
/// `{"value": n}` objects.
fn motion_value(tag: &str, data: &Value) -> Result<i64, DecodeError> {
    match data {
        Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            n.as_f64()
                .and_then(integral)
                .ok_or_else(|| DecodeError::invalid(tag, format!("expected an integer, got {}", n)))
        }
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| {
                    DecodeError::invalid(tag, format!("expected an integer, got '{}'", s))
                })
        }
        Value::Object(obj) => match obj.get("value") {
            Some(inner) if !inner.is_object() => motion_value(tag, inner),
            _ => Err(DecodeError::invalid(tag, "expected a scalar value")),
        },
        _ => Err(DecodeError::invalid(tag, "expected a scalar value")),
    }
}

fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn log_payload(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn performance_status(tag: &str, data: &Value) -> Result<PerformanceStatus, DecodeError> {
    let obj = data
        .as_object()
        .ok_or_else(|| DecodeError::invalid(tag, "expected an object"))?;

    let version = match obj.get("version") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => Local::now().naive_local(),
        Some(Value::String(s)) => parse_timestamp(s)
            .ok_or_else(|| DecodeError::invalid(tag, format!("unrecognised timestamp '{}'", s)))?,
        Some(other) => {
            return Err(DecodeError::invalid(
                tag,
                format!("timestamp must be a string, got {}", other),
            ))
        }
    };

    Ok(PerformanceStatus {
        cpu: number_field(tag, obj, "cpu")?,
        ram: number_field(tag, obj, "ram")?,
        disk: number_field(tag, obj, "disk")?,
        net_up_kbps: number_field(tag, obj, "net_up")?,
        net_down_kbps: number_field(tag, obj, "net_down")?,
        version,
        timestamp,
    })
}

fn number_field(
    tag: &str,
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<f64, DecodeError> {
    let value = obj.get(field).ok_or(DecodeError::MissingField(field))?;
    value
        .as_f64()
        .ok_or_else(|| {
            DecodeError::invalid(tag, format!("'{}' must be a number, got {}", field, value))
        })
}

/// Parse the timestamp formats seen from transmitters:
/// ISO 8601 without offset, RFC 3339, and the station display format.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<NaiveDateTime>() {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Local).naive_local());
    }
    NaiveDateTime::parse_from_str(s, DISPLAY_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn codec() -> MessageCodec {
        MessageCodec::default()
    }

    fn decode(line: &str) -> Result<Message, DecodeError> {
        codec().decode(line.as_bytes())
    }

    #[test]
    fn test_motion_frames() {
        assert_eq!(
            decode(r#"{"type": "MOTION", "data": 1}"#).unwrap(),
            Message::Motion { value: 1 }
        );
        assert_eq!(
            decode(r#"{"type": "MOTION", "data": 0}"#).unwrap(),
            Message::Motion { value: 0 }
        );
    }

    #[test]
    fn test_motion_coercion() {
        assert_eq!(
            decode(r#"{"type":"MOTION","data":1.0}"#).unwrap(),
            Message::Motion { value: 1 }
        );
        assert_eq!(
            decode(r#"{"type":"MOTION","data":true}"#).unwrap(),
            Message::Motion { value: 1 }
        );
        assert_eq!(
            decode(r#"{"type":"MOTION","data":" 7 "}"#).unwrap(),
            Message::Motion { value: 7 }
        );
        assert_eq!(
            decode(r#"{"type":"MOTION","data":{"value":1}}"#).unwrap(),
            Message::Motion { value: 1 }
        );
    }

    #[test]
    fn test_motion_rejects_non_integers() {
        assert!(matches!(
            decode(r#"{"type":"MOTION","data":0.5}"#),
            Err(DecodeError::InvalidData { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"MOTION","data":"high"}"#),
            Err(DecodeError::InvalidData { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"MOTION","data":[1]}"#),
            Err(DecodeError::InvalidData { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"MOTION","data":null}"#),
            Err(DecodeError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_blank_line_is_malformed() {
        assert!(matches!(decode(""), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("   \r"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(decode("hello"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode("[1, 2]"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"type": "MOTION"}"#),
            Err(DecodeError::MissingField("data"))
        ));
        assert!(matches!(
            decode(r#"{"data": 1}"#),
            Err(DecodeError::MissingField("type"))
        ));
        assert!(matches!(
            decode(r#"{"type": 3, "data": 1}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode(r#"{"type": "MOT"#), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_invalid_utf8_does_not_fail_decoding() {
        let mut raw = b"{\"type\":\"LOGS\",\"data\":\"sensor ".to_vec();
        raw.push(0xFF);
        raw.extend_from_slice(b" ok\"}");

        match codec().decode(&raw).unwrap() {
            Message::Log { payload } => {
                assert!(payload.starts_with("sensor "));
                assert!(payload.ends_with(" ok"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type() {
        let err = decode(r#"{"type": "PING", "data": 1}"#).unwrap_err();
        assert_eq!(err, DecodeError::UnknownType("PING".to_string()));
    }

    #[test]
    fn test_log_payloads() {
        assert_eq!(
            decode(r#"{"type": "LOGS", "data": "System is on"}"#).unwrap(),
            Message::Log {
                payload: "System is on".to_string()
            }
        );
        assert_eq!(
            decode(r#"{"type": "LOGS", "data": {"type": "info", "message": "up"}}"#).unwrap(),
            Message::Log {
                payload: r#"{"message":"up","type":"info"}"#.to_string()
            }
        );
    }

    #[test]
    fn test_performance_status() {
        let line = r#"{"type": "PERFORMANCE_STATUS", "data": {"cpu": 12.5, "ram": 40.0, "disk": 55.2, "net_up": 3.1, "net_down": 9.9, "timestamp": "2025-01-01T00:00:00", "version": "v1.2"}}"#;

        let expected = PerformanceStatus {
            cpu: 12.5,
            ram: 40.0,
            disk: 55.2,
            net_up_kbps: 3.1,
            net_down_kbps: 9.9,
            version: "v1.2".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        };
        assert_eq!(
            decode(line).unwrap(),
            Message::PerformanceStatus(expected)
        );
    }

    #[test]
    fn test_performance_status_integer_fields_and_optional_keys() {
        let line = r#"{"type":"PERFORMANCE_STATUS","data":{"cpu":12,"ram":40,"disk":55,"net_up":0,"net_down":1}}"#;
        match decode(line).unwrap() {
            Message::PerformanceStatus(status) => {
                assert_eq!(status.cpu, 12.0);
                assert_eq!(status.net_down_kbps, 1.0);
                assert_eq!(status.version, "");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_performance_status_validation() {
        assert_eq!(
            decode(r#"{"type":"PERFORMANCE_STATUS","data":{"cpu":1,"ram":2,"disk":3,"net_up":4}}"#)
                .unwrap_err(),
            DecodeError::MissingField("net_down")
        );
        assert!(matches!(
            decode(r#"{"type":"PERFORMANCE_STATUS","data":{"cpu":"hi","ram":2,"disk":3,"net_up":4,"net_down":5}}"#),
            Err(DecodeError::InvalidData { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"PERFORMANCE_STATUS","data":{"cpu":1,"ram":2,"disk":3,"net_up":4,"net_down":5,"timestamp":"yesterday"}}"#),
            Err(DecodeError::InvalidData { .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"PERFORMANCE_STATUS","data":"busy"}"#),
            Err(DecodeError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_custom_message_types() {
        let codec = MessageCodec::new(MessageTypes {
            motion: "PIR".to_string(),
            logs: "LOG".to_string(),
            performance_status: "HEALTH".to_string(),
        });

        assert_eq!(
            codec.decode(br#"{"type":"PIR","data":1}"#).unwrap(),
            Message::Motion { value: 1 }
        );
        assert_eq!(
            codec.decode(br#"{"type":"MOTION","data":1}"#).unwrap_err(),
            DecodeError::UnknownType("MOTION".to_string())
        );
    }

    #[test]
    fn test_legacy_text_frames_disabled_by_default() {
        assert!(matches!(decode("MOTION:1"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_legacy_text_frames_enabled() {
        let codec = MessageCodec::default().with_legacy_text_frames(true);

        assert_eq!(
            codec.decode(b"MOTION:1").unwrap(),
            Message::Motion { value: 1 }
        );
        assert_eq!(
            codec.decode(b"MOTION: 0\r").unwrap(),
            Message::Motion { value: 0 }
        );
        assert!(matches!(
            codec.decode(b"MOTION:x"),
            Err(DecodeError::InvalidData { .. })
        ));
        // JSON still works alongside the legacy path
        assert_eq!(
            codec.decode(br#"{"type":"MOTION","data":1}"#).unwrap(),
            Message::Motion { value: 1 }
        );
        assert!(matches!(codec.decode(b"garbage"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_encode_performance_status_decodes_back() {
        let codec = codec();
        let status = PerformanceStatus {
            cpu: 3.5,
            ram: 20.0,
            disk: 61.25,
            net_up_kbps: 1.5,
            net_down_kbps: 0.0,
            version: "Raspberypi 1b+ v1.2".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 12, 14)
                .unwrap()
                .and_hms_opt(9, 30, 5)
                .unwrap(),
        };
        let message = Message::PerformanceStatus(status);

        let frame = codec.encode(&message);

        assert_eq!(codec.decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(parse_timestamp("2025-01-02T03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("02-01-2025 03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02 03:04:05"), Some(expected));
        assert!(parse_timestamp("2025-01-02T03:04:05.250").is_some());
        assert!(parse_timestamp("2025-01-02T03:04:05+00:00").is_some());
        assert_eq!(parse_timestamp("soon"), None);
    }
}
