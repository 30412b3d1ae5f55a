//! Record framing shared by the protocol adapters.
//!
//! Network deliveries split records at arbitrary byte offsets, including the
//! middle of a multi-byte UTF-8 sequence. Both framers here buffer raw bytes
//! and only decode once a record is complete.
//!
//! SSE lines are split here rather than with `eventsource-stream`: that
//! crate only adapts a `Stream`, and adapters decode synchronously, one
//! block at a time, with their framing state held in `StreamState`.

/// Splits a byte stream into `\n`-terminated lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completed, without the line
    /// terminator (`\n` or `\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// The unterminated tail, if it holds anything but whitespace
    pub fn take_remainder(&mut self) -> Option<String> {
        let tail = decode_line(&std::mem::take(&mut self.pending));
        if tail.trim().is_empty() { None } else { Some(tail) }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Payload of an SSE `data:` line. Other fields and comments yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Incremental scanner for a stream of top-level JSON objects, as found in
/// a JSON array response delivered piecemeal (`[{...},\n{...}]`).
///
/// Brackets, commas and whitespace between objects are skipped. Braces
/// inside string literals (escapes included) do not count toward depth.
#[derive(Debug, Default)]
pub struct JsonArrayScanner {
    current: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonArrayScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the raw text of every object it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut objects = Vec::new();

        for &byte in chunk {
            if self.depth == 0 {
                if byte == b'{' {
                    self.current.clear();
                    self.current.push(byte);
                    self.depth = 1;
                }
                continue;
            }

            self.current.push(byte);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        objects.push(std::mem::take(&mut self.current));
                    }
                }
                _ => {}
            }
        }

        objects
    }

    /// Whether an object has been started but not closed
    pub fn has_partial(&self) -> bool {
        self.depth > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.push(b": 1}\r\n\ndata: x"), vec!["data: {\"a\": 1}", ""]);
        assert_eq!(buffer.take_remainder().as_deref(), Some("data: x"));
        assert!(buffer.take_remainder().is_none());
    }

    #[test]
    fn test_split_utf8_sequence_survives() {
        let text = "data: héllo ✓\n".as_bytes();
        for split in 1..text.len() {
            let mut buffer = LineBuffer::new();
            let mut lines = buffer.push(&text[..split]);
            lines.extend(buffer.push(&text[split..]));
            assert_eq!(lines, vec!["data: héllo ✓"], "split at {}", split);
        }
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("event: message"), None);
    }

    #[test]
    fn test_scanner_ignores_braces_in_strings() {
        let body = br#"[{"text": "a } \" { b"},
{"nested": {"x": [1, {"y": 2}]}}]"#;
        let mut scanner = JsonArrayScanner::new();
        let objects = scanner.push(body);
        assert_eq!(objects.len(), 2);
        let first: serde_json::Value = serde_json::from_slice(&objects[0]).unwrap();
        assert_eq!(first["text"], "a } \" { b");
        assert!(!scanner.has_partial());
    }

    #[test]
    fn test_scanner_byte_at_a_time() {
        let body = br#"[{"a": "\\"}, {"b": "}"}]"#;
        let mut scanner = JsonArrayScanner::new();
        let mut objects = Vec::new();
        for byte in body.iter() {
            objects.extend(scanner.push(std::slice::from_ref(byte)));
        }
        assert_eq!(objects, vec![br#"{"a": "\\"}"#.to_vec(), br#"{"b": "}"}"#.to_vec()]);
    }

    #[test]
    fn test_scanner_holds_partial_object() {
        let mut scanner = JsonArrayScanner::new();
        assert!(scanner.push(br#"[{"a": {"b""#).is_empty());
        assert!(scanner.has_partial());
        assert_eq!(scanner.push(b": 1}}]").len(), 1);
    }
}
