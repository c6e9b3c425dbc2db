//! Client side of the event stream.

use tracing::debug;

use crate::transport::events::StreamEvent;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Event(StreamEvent),
    Done,
}

/// Incremental decoder for `data: ` framed streams.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence; only
/// complete lines are decoded. Input after `[DONE]` is ignored.
#[derive(Debug, Default)]
pub struct EventStreamReader {
    buffer: Vec<u8>,
    done: bool,
}

impl EventStreamReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if self.done {
            return frames;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let Some(payload) = line.trim_end_matches(['\n', '\r']).strip_prefix(DATA_PREFIX)
            else {
                continue;
            };

            if payload.trim() == DONE_SENTINEL {
                self.done = true;
                self.buffer.clear();
                frames.push(StreamFrame::Done);
                break;
            }
            match serde_json::from_str::<StreamEvent>(payload) {
                Ok(event) => frames.push(StreamFrame::Event(event)),
                Err(e) => debug!("skipping undecodable stream line: {e}"),
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::sse::encode_event;

    fn wire() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode_event(&StreamEvent::Start));
        bytes.extend_from_slice(b": keep-alive comment\n\n");
        bytes.extend_from_slice(&encode_event(&StreamEvent::Complete {
            result: serde_json::json!({"name": "Müller GmbH"}),
            duration: 5,
        }));
        bytes.extend_from_slice(b"data: {\"type\":\"start\"}\n\n");
        bytes
    }

    #[test]
    fn test_byte_by_byte_feed_matches_single_push() {
        let mut whole = EventStreamReader::new();
        let expected = whole.push(&wire());
        assert_eq!(expected.len(), 3);
        assert_eq!(expected[2], StreamFrame::Done);

        let mut trickle = EventStreamReader::new();
        let mut frames = Vec::new();
        for byte in wire() {
            frames.extend(trickle.push(&[byte]));
        }
        assert_eq!(frames, expected);
        assert!(trickle.is_done());
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut reader = EventStreamReader::new();
        assert!(reader.push(b"data: {\"type\":\"er").is_empty());
        let frames = reader.push(b"ror\",\"message\":\"late\"}\n\n");
        assert_eq!(
            frames,
            vec![StreamFrame::Event(StreamEvent::Error {
                message: "late".into()
            })]
        );
    }

    #[test]
    fn test_non_data_lines_are_ignored() {
        let mut reader = EventStreamReader::new();
        assert!(reader.push(b"event: ping\nid: 4\n\r\n").is_empty());
        assert!(!reader.is_done());
    }
}
