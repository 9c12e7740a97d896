//! Uniform SSE event protocol
//!
//! The event sink side of the gateway: every normalized event leaving the
//! process is one of the three frames built here, each terminated by a blank
//! line. Also provides a line buffer for watching SSE streams whose chunks
//! split mid-line.

pub mod json_buffer;

pub use json_buffer::{JsonStreamBuffer, MAX_RECOVERY_ATTEMPTS};

use bytes::Bytes;
use serde_json::json;

/// The unconditional end-of-stream marker, always the last frame of a request
pub const DONE_MARKER: &str = "data: [DONE]";

/// Format one content increment as a canonical delta frame.
///
/// Wire shape: `data: {"choices":[{"delta":{"content":"<text>"}}]}\n\n`
pub fn format_delta_frame(text: &str) -> Bytes {
    let payload = json!({"choices": [{"delta": {"content": text}}]});
    Bytes::from(format!("data: {}\n\n", payload))
}

/// Format an error frame. At most one is emitted per request, always before
/// the terminal frame and never instead of it.
pub fn format_error_frame(message: &str) -> Bytes {
    let payload = json!({"message": message});
    Bytes::from(format!("event: error\ndata: {}\n\n", payload))
}

/// Format the terminal frame: `data: [DONE]\n\n`
pub fn format_done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// Buffer for accumulating incomplete SSE lines across chunk boundaries.
///
/// Network chunks rarely align with line boundaries; this accumulates bytes
/// until complete `\n`-terminated lines are available. The passthrough
/// normalizer uses it as a tap (relaying the original bytes untouched) to
/// spot an upstream terminal marker.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the complete lines they finished, without
    /// trailing newlines. Blank separator lines are skipped; a trailing
    /// partial line is retained for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.truncate(line.trim_end_matches(['\n', '\r']).len());
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// True when any completed line is the upstream terminal marker.
    pub fn saw_done(lines: &[String]) -> bool {
        lines.iter().any(|l| l.trim() == DONE_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_frame_shape() {
        let frame = format_delta_frame("Hi");
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(text, "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n");
    }

    #[test]
    fn test_delta_frame_escapes_content() {
        let frame = format_delta_frame("line\n\"quoted\"");
        let text = std::str::from_utf8(&frame).unwrap();
        // serde_json handles escaping; the frame still ends with one blank line.
        assert!(text.starts_with("data: {"));
        assert!(text.ends_with("}\n\n"));
        let json_part = text.trim_start_matches("data: ").trim_end();
        let value: serde_json::Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(
            value["choices"][0]["delta"]["content"],
            "line\n\"quoted\""
        );
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = format_error_frame("bad key");
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(text, "event: error\ndata: {\"message\":\"bad key\"}\n\n");
    }

    #[test]
    fn test_done_frame_shape() {
        assert_eq!(&format_done_frame()[..], b"data: [DONE]\n\n");
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data: {\"content\":\"hel").is_empty());
        let lines = buffer.feed(b"lo\"}\n\ndata: next\n");
        assert_eq!(lines, vec!["data: {\"content\":\"hello\"}", "data: next"]);
    }

    #[test]
    fn test_line_buffer_strips_carriage_returns() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.feed(b"data: test\r\n");
        assert_eq!(lines, vec!["data: test"]);
    }

    #[test]
    fn test_saw_done_detects_marker_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.feed(b"data: [DO");
        assert!(!SseLineBuffer::saw_done(&lines));
        let lines = buffer.feed(b"NE]\n\n");
        assert!(SseLineBuffer::saw_done(&lines));
    }

    #[test]
    fn test_saw_done_ignores_content_lines() {
        let mut buffer = SseLineBuffer::new();
        let lines = buffer.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"[DONE]\"}}]}\n");
        assert!(!SseLineBuffer::saw_done(&lines));
    }
}
