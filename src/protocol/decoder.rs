//! Incremental frame decoding
//!
//! Network chunks need not line up with frames, lines, or even UTF-8
//! characters. Bytes are buffered until a `\n` arrives; only the
//! unterminated suffix survives between calls.

use super::frame::{WireFrame, DATA_PREFIX};
use serde_json::Value;
use thiserror::Error;

const KNOWN_TYPES: [&str; 6] = ["connected", "token", "tool_start", "tool_end", "error", "done"];

/// Byte buffer with a read cursor, yielding complete `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte
    start: usize,
    /// Bytes before this offset are known not to contain `\n`
    scanned: usize,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) {
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
            self.scanned = 0;
        } else if self.start > self.buf.len() / 2 {
            self.buf.drain(..self.start);
            self.scanned -= self.start;
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line without its terminator
    pub fn next_line(&mut self) -> Option<String> {
        let offset = self.buf[self.scanned..].iter().position(|&b| b == b'\n');
        let Some(offset) = offset else {
            self.scanned = self.buf.len();
            return None;
        };
        let end = self.scanned + offset;
        let line = String::from_utf8_lossy(&self.buf[self.start..end]).into_owned();
        self.start = end + 1;
        self.scanned = self.start;
        Some(line)
    }

    /// Drain a trailing line that never got its terminator
    pub fn take_remainder(&mut self) -> Option<String> {
        let rest = &self.buf[self.start..];
        let line = (!rest.is_empty()).then(|| String::from_utf8_lossy(rest).into_owned());
        self.buf.clear();
        self.start = 0;
        self.scanned = 0;
        line
    }

    pub fn pending(&self) -> usize {
        self.buf.len() - self.start
    }
}

/// A `data: ` line whose payload is not a frame
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolParseError {
    #[error("invalid frame JSON: {message}")]
    InvalidJson { line: String, message: String },

    #[error("unknown frame type: {0}")]
    UnknownType(String),

    #[error("invalid {frame_type} frame: {message}")]
    InvalidFrame { frame_type: String, message: String },
}

/// Turns a byte stream into wire frames
#[derive(Debug, Default)]
pub struct FrameDecoder {
    lines: LineBuffer,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; yields every frame completed by it, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<WireFrame, ProtocolParseError>> {
        self.lines.push(chunk);
        let mut frames = Vec::new();
        while let Some(line) = self.lines.next_line() {
            frames.extend(decode_line(&line));
        }
        frames
    }

    /// End of input: decode a final unterminated line, if any
    pub fn finish(&mut self) -> Vec<Result<WireFrame, ProtocolParseError>> {
        self.lines.take_remainder().and_then(|line| decode_line(&line)).into_iter().collect()
    }
}

/// Decode one line. Lines without the data prefix are skipped.
pub fn decode_line(line: &str) -> Option<Result<WireFrame, ProtocolParseError>> {
    let payload = line.strip_suffix('\r').unwrap_or(line).strip_prefix(DATA_PREFIX)?;
    let result = parse_payload(payload);
    if let Err(e) = &result {
        tracing::warn!(error = %e, "Skipping malformed frame");
    }
    Some(result)
}

fn parse_payload(payload: &str) -> Result<WireFrame, ProtocolParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ProtocolParseError::InvalidJson {
            line: payload.to_string(),
            message: e.to_string(),
        })?;

    let frame_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !KNOWN_TYPES.contains(&frame_type.as_str()) {
        return Err(ProtocolParseError::UnknownType(frame_type));
    }

    serde_json::from_value(value).map_err(|e| ProtocolParseError::InvalidFrame {
        frame_type,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok_frames(results: Vec<Result<WireFrame, ProtocolParseError>>) -> Vec<WireFrame> {
        results.into_iter().map(Result::unwrap).collect()
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":\"tok").is_empty());
        assert!(decoder.feed(b"en\",\"token\":\"Hel").is_empty());
        let frames = ok_frames(decoder.feed(b"lo\"}\n\ndata: {\"type\":\"done\"}\n\n"));
        assert_eq!(
            frames,
            vec![
                WireFrame::Token {
                    token: "Hello".to_string()
                },
                WireFrame::Done
            ]
        );
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let bytes = "data: {\"type\":\"token\",\"token\":\"héllo ✓\"}\n\n".as_bytes();
        let cut = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&bytes[..cut]).is_empty());
        let frames = ok_frames(decoder.feed(&bytes[cut..]));
        assert_eq!(
            frames,
            vec![WireFrame::Token {
                token: "héllo ✓".to_string()
            }]
        );
    }

    #[test]
    fn test_non_data_lines_are_skipped() {
        let mut decoder = FrameDecoder::new();
        let input = b": keep-alive\nevent: ping\n\ndata: {\"type\":\"connected\"}\r\n";
        assert_eq!(ok_frames(decoder.feed(input)), vec![WireFrame::Connected]);
    }

    #[test]
    fn test_malformed_payload_is_reported_and_decoding_continues() {
        let mut decoder = FrameDecoder::new();
        let results = decoder.feed(
            b"data: {oops\ndata: {\"type\":\"mystery\"}\ndata: {\"type\":\"token\"}\ndata: {\"type\":\"done\"}\n",
        );
        assert_eq!(results.len(), 4);
        assert!(matches!(results[0], Err(ProtocolParseError::InvalidJson { .. })));
        assert_eq!(
            results[1],
            Err(ProtocolParseError::UnknownType("mystery".to_string()))
        );
        assert!(matches!(results[2], Err(ProtocolParseError::InvalidFrame { .. })));
        assert_eq!(results[3], Ok(WireFrame::Done));
    }

    #[test]
    fn test_finish_drains_unterminated_line() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder
            .feed(b"data: {\"type\":\"tool_end\",\"tool\":\"calculator\",\"output\":4}")
            .is_empty());
        assert_eq!(
            ok_frames(decoder.finish()),
            vec![WireFrame::ToolEnd {
                tool: "calculator".to_string(),
                output: json!(4)
            }]
        );
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_line_buffer_retains_only_suffix() {
        let mut lines = LineBuffer::default();
        lines.push(b"first\nsecond\nthi");
        assert_eq!(lines.next_line().as_deref(), Some("first"));
        assert_eq!(lines.next_line().as_deref(), Some("second"));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.pending(), 3);

        lines.push(b"rd\n");
        assert_eq!(lines.next_line().as_deref(), Some("third"));
        assert_eq!(lines.pending(), 0);
        assert_eq!(lines.take_remainder(), None);
    }
}
