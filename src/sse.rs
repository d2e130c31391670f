//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; [`SseDecoder::feed`] buffers partial
//! lines and returns the data of every event completed by the chunk. Only
//! the `data` field matters to this client: `event`, `id` and `retry` are
//! accepted and ignored, comment lines (leading `:`) are skipped.

/// Stateful line parser for one event stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line.
    line: Vec<u8>,
    /// `data` lines of the event being assembled.
    data: Vec<String>,
    /// Whether the last byte seen was a `\r` (so a following `\n` is part of
    /// the same terminator).
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return the payloads of all events it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for &byte in chunk {
            match byte {
                b'\n' if self.after_cr => {
                    self.after_cr = false;
                }
                b'\r' | b'\n' => {
                    self.after_cr = byte == b'\r';
                    let line = std::mem::take(&mut self.line);
                    if let Some(data) = self.process_line(&line) {
                        out.push(data);
                    }
                }
                _ => {
                    self.after_cr = false;
                    self.line.push(byte);
                }
            }
        }
        out
    }

    /// Flush an event that was terminated by end-of-stream instead of a
    /// blank line.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.line);
        if !line.is_empty() {
            // A trailing line without terminator still counts as a field.
            let _ = self.process_line(&line);
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        let text = String::from_utf8_lossy(line);
        if text.starts_with(':') {
            return None;
        }
        let (field, value) = match text.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (text.as_ref(), ""),
        };
        if field == "data" {
            self.data.push(value.to_owned());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"type\":\"game_started\"}\n\n");
        assert_eq!(events, vec![r#"{"type":"game_started"}"#.to_string()]);
    }

    #[test]
    fn event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":").is_empty());
        assert!(decoder.feed(b"\"move\"}\n").is_empty());
        let events = decoder.feed(b"\n");
        assert_eq!(events, vec![r#"{"type":"move"}"#.to_string()]);
    }

    #[test]
    fn crlf_terminators_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: a\r").is_empty());
        let events = decoder.feed(b"\n\r\n");
        assert_eq!(events, vec!["a".to_string()]);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: one\ndata:two\n\n");
        assert_eq!(events, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\n\nevent: move\nid: 7\nretry: 3000\ndata: x\n\n");
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn blank_lines_without_data_dispatch_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"\n\n\n").is_empty());
    }

    #[test]
    fn several_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: 1\n\ndata: 2\n\ndata: 3");
        assert_eq!(events, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(decoder.finish().as_deref(), Some("3"));
        assert!(decoder.finish().is_none());
    }
}
