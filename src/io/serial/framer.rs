// src/io/serial/framer.rs
//
// Newline-delimited framing for the transmitter link.
// Bytes arrive in arbitrary chunks from the serial port; the framer
// reassembles them into complete lines.

/// Default delimiter: LF. A trailing CR is stripped so CRLF senders work too.
pub const LINE_DELIMITER: u8 = b'\n';

/// Longest frame kept before a forced split. A PERFORMANCE_STATUS frame is
/// ~200 bytes, so this only trips on a noisy line with no terminator.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4096;

/// A frame extracted from the serial stream
#[derive(Debug, Clone, PartialEq)]
pub struct LineFrame {
    /// Frame bytes without the delimiter
    pub bytes: Vec<u8>,
    /// True when the frame is part of a line longer than the maximum length
    pub incomplete: bool,
}

/// Reassembles newline-terminated frames from a byte stream.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_length: usize,
    /// Current line already exceeded max_length; its tail is incomplete too
    overflowed: bool,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl LineFramer {
    pub fn new(max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::new(),
            max_length: max_length.max(1),
            overflowed: false,
        }
    }

    /// Feed bytes into the framer, returning every frame completed by them.
    /// Empty lines are skipped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<LineFrame> {
        let mut frames = Vec::new();

        for &byte in data {
            if byte == LINE_DELIMITER {
                let mut frame: Vec<u8> = self.buffer.drain(..).collect();
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
                if !frame.is_empty() {
                    frames.push(LineFrame {
                        bytes: frame,
                        incomplete: self.overflowed,
                    });
                }
                self.overflowed = false;
                continue;
            }

            self.buffer.push(byte);

            // Force split on max length
            if self.buffer.len() >= self.max_length {
                frames.push(LineFrame {
                    bytes: self.buffer.drain(..).collect(),
                    incomplete: true,
                });
                self.overflowed = true;
            }
        }

        frames
    }

    /// Drop any buffered partial frame (used when the port is closed).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}
