//! Incremental reassembly for providers that stream JSON without framing
//!
//! Google's streaming endpoint delivers JSON values split at arbitrary byte
//! boundaries, and successive values can arrive back-to-back with no
//! separator. There is no reliable frame boundary to split on, so the buffer
//! speculatively re-parses its whole contents as bytes arrive and falls back
//! to a bounded adjacent-object recovery when a "complete looking" buffer
//! still refuses to parse.

use serde_json::Value;
use tracing::{debug, warn};

/// Cap on consecutive failed-parse recovery passes per incoming chunk.
/// Exceeding it discards the buffer: bounded data loss is preferred over
/// unbounded re-parsing of a poisoned buffer.
pub const MAX_RECOVERY_ATTEMPTS: usize = 3;

/// Mutable accumulator owned by exactly one normalizer for one upstream call.
///
/// Accumulates raw bytes, not decoded text: a chunk boundary can land inside
/// a multibyte UTF-8 sequence, and eagerly decoding each chunk would mangle
/// it. serde validates the encoding once a whole value parses.
#[derive(Debug, Default)]
pub struct JsonStreamBuffer {
    buf: Vec<u8>,
}

impl JsonStreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk and return every delta text that became extractable.
    ///
    /// Returns zero or more texts: zero while a value is still incomplete,
    /// several when an array value or concatenated objects complete at once.
    /// A parsed value without the candidate-text path contributes nothing and
    /// is not an error.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut deltas = Vec::new();
        let mut attempts = 0;

        loop {
            let trimmed = self.buf.trim_ascii();
            if trimmed.is_empty() {
                self.buf.clear();
                break;
            }

            match serde_json::from_slice::<Value>(trimmed) {
                Ok(value) => {
                    collect_deltas(&value, &mut deltas);
                    self.buf.clear();
                    break;
                }
                Err(_) => {
                    // A buffer that doesn't yet end in a closing brace or
                    // bracket is just an incomplete frame; wait for more bytes.
                    if !(trimmed.ends_with(b"}") || trimmed.ends_with(b"]")) {
                        break;
                    }

                    // No adjacent-object boundary to split on: the value was
                    // most likely cut right after a brace. Retain and await
                    // more bytes; anything left over at stream end is
                    // discarded with the buffer.
                    let Some(pos) = trimmed.windows(2).position(|w| w == b"}{") else {
                        break;
                    };

                    // Two JSON values concatenated with no separator: split
                    // at the first `}{`, salvage the left value, keep the
                    // right fragment for the next pass.
                    let (left, right) = trimmed.split_at(pos + 1);
                    match serde_json::from_slice::<Value>(left) {
                        Ok(value) => {
                            collect_deltas(&value, &mut deltas);
                            attempts = 0;
                        }
                        Err(_) => {
                            attempts += 1;
                            if attempts > MAX_RECOVERY_ATTEMPTS {
                                warn!(
                                    buffered = self.buf.len(),
                                    "Discarding stream buffer after {} failed recovery attempts",
                                    MAX_RECOVERY_ATTEMPTS
                                );
                                self.buf.clear();
                                break;
                            }
                            debug!("Dropping unparseable fragment during recovery");
                        }
                    }
                    self.buf = right.to_vec();
                    continue;
                }
            }
        }

        deltas
    }

    /// Whether undelivered bytes remain (discarded at stream end)
    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }
}

fn collect_deltas(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(text) = extract_candidate_text(item) {
                    out.push(text);
                }
            }
        }
        other => {
            if let Some(text) = extract_candidate_text(other) {
                out.push(text);
            }
        }
    }
}

/// Pull the generated text out of one parsed Google response value:
/// `candidates[0].content.parts[0].text`. Absence means no delta, not an error.
fn extract_candidate_text(value: &Value) -> Option<String> {
    value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANDIDATE: &str = r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}"#;

    fn candidate_with(text: &str) -> String {
        format!(
            r#"{{"candidates":[{{"content":{{"parts":[{{"text":"{}"}}]}}}}]}}"#,
            text
        )
    }

    #[test]
    fn test_complete_value_in_one_chunk() {
        let mut buffer = JsonStreamBuffer::new();
        let deltas = buffer.feed(CANDIDATE.as_bytes());
        assert_eq!(deltas, vec!["Hi"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_value_split_across_chunks_emits_nothing_until_complete() {
        let mut buffer = JsonStreamBuffer::new();
        let (left, right) = CANDIDATE.split_at(23);

        assert!(buffer.feed(left.as_bytes()).is_empty());
        assert!(buffer.has_pending());

        let deltas = buffer.feed(right.as_bytes());
        assert_eq!(deltas, vec!["Hi"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut buffer = JsonStreamBuffer::new();
        let mut all = Vec::new();
        for byte in CANDIDATE.as_bytes() {
            all.extend(buffer.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(all, vec!["Hi"]);
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        // The chunk boundary lands inside the two-byte encoding of 'é'; the
        // buffer must hold raw bytes until the value completes instead of
        // decoding each chunk on its own.
        let mut buffer = JsonStreamBuffer::new();
        let body = candidate_with("é");
        let raw = body.as_bytes();
        let mid = body.find('é').unwrap() + 1;

        assert!(buffer.feed(&raw[..mid]).is_empty());
        let deltas = buffer.feed(&raw[mid..]);
        assert_eq!(deltas, vec!["é"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_non_ascii_text_survives_byte_at_a_time_delivery() {
        let mut buffer = JsonStreamBuffer::new();
        let body = candidate_with("café ☕ 日本語");
        let mut all = Vec::new();
        for byte in body.as_bytes() {
            all.extend(buffer.feed(std::slice::from_ref(byte)));
        }
        assert_eq!(all, vec!["café ☕ 日本語"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_array_value_emits_delta_per_element() {
        let mut buffer = JsonStreamBuffer::new();
        let body = format!("[{},{}]", candidate_with("a"), candidate_with("b"));
        let deltas = buffer.feed(body.as_bytes());
        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[test]
    fn test_adjacent_objects_recovered_and_buffer_drained() {
        // Two objects with no separator: the first yields a delta, the second
        // has no candidate path and yields nothing, and the buffer empties.
        let mut buffer = JsonStreamBuffer::new();
        let body = format!("{}{}", candidate_with("Hi"), r#"{"usageMetadata":{"n":2}}"#);

        let deltas = buffer.feed(body.as_bytes());
        assert_eq!(deltas, vec!["Hi"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_three_adjacent_objects() {
        let mut buffer = JsonStreamBuffer::new();
        let body = format!(
            "{}{}{}",
            candidate_with("a"),
            candidate_with("b"),
            candidate_with("c")
        );
        let deltas = buffer.feed(body.as_bytes());
        assert_eq!(deltas, vec!["a", "b", "c"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_value_without_candidate_path_is_not_an_error() {
        let mut buffer = JsonStreamBuffer::new();
        let deltas = buffer.feed(br#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(deltas.is_empty());
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_closed_looking_garbage_recovers_at_next_boundary() {
        let mut buffer = JsonStreamBuffer::new();
        // Ends with '}' so it looks closed, but with no `}{` boundary it is
        // retained; it could be a value split right after a brace.
        let deltas = buffer.feed(b"not json at all}");
        assert!(deltas.is_empty());
        assert!(buffer.has_pending());

        // The next value creates a boundary; the garbage fragment is dropped
        // and the new value extracted.
        let deltas = buffer.feed(CANDIDATE.as_bytes());
        assert_eq!(deltas, vec!["Hi"]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_recovery_attempts_are_bounded() {
        let mut buffer = JsonStreamBuffer::new();
        // Each `}{` split peels off one garbage fragment; after
        // MAX_RECOVERY_ATTEMPTS passes the rest is discarded instead of
        // looping further.
        let poisoned = "x}{y}{z}{w}{v}";
        let deltas = buffer.feed(poisoned.as_bytes());
        assert!(deltas.is_empty());
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_incomplete_frame_is_retained_not_discarded() {
        let mut buffer = JsonStreamBuffer::new();
        assert!(buffer.feed(br#"{"candidates":[{"content""#).is_empty());
        assert!(buffer.has_pending());
        // Still pending after another incomplete chunk.
        assert!(buffer.feed(br#":{"parts":[{"text""#).is_empty());
        assert!(buffer.has_pending());
    }

    #[test]
    fn test_whitespace_between_values_is_tolerated() {
        let mut buffer = JsonStreamBuffer::new();
        let body = format!("  \n{}\n", candidate_with("Hi"));
        let deltas = buffer.feed(body.as_bytes());
        assert_eq!(deltas, vec!["Hi"]);
    }
}
