//! Just enough JSON for the Firebase REST API
//!
//! Two shapes are read: the shallow listing of the record root
//! (`{"<key>":true,...}`, potentially thousands of keys, scanned as a stream)
//! and the small sign-up reply, from which single string fields are pulled.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Write;

use super::http::{BodySink, HttpError};

/// Keys found directly under a node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildSummary {
    pub count: usize,
    /// First key in serialisation order
    pub first_key: Option<String>,
    /// Lexicographically smallest key
    pub smallest_key: Option<String>,
}

/// Streaming scanner counting the immediate keys of a top-level object.
///
/// Nested values (for a non-shallow listing) are skipped over without being
/// stored. A top-level `null` or scalar counts as no children.
#[derive(Debug, Default)]
pub struct ShallowKeyScanner {
    depth: u32,
    in_string: bool,
    escaped: bool,
    expecting_key: bool,
    capture: Option<Vec<u8>>,
    summary: ChildSummary,
}

impl ShallowKeyScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.in_string {
                self.string_byte(byte);
                continue;
            }
            match byte {
                b'"' => {
                    self.in_string = true;
                    if self.depth == 1 && self.expecting_key {
                        self.capture = Some(Vec::new());
                    }
                }
                b'{' => {
                    self.depth += 1;
                    if self.depth == 1 {
                        self.expecting_key = true;
                    }
                }
                b'[' => self.depth += 1,
                b'}' | b']' => self.depth = self.depth.saturating_sub(1),
                b',' if self.depth == 1 => self.expecting_key = true,
                _ => {}
            }
        }
    }

    fn string_byte(&mut self, byte: u8) {
        if self.escaped {
            self.escaped = false;
        } else if byte == b'\\' {
            self.escaped = true;
            // Keep the escape sequence raw; Firebase keys cannot contain these.
        } else if byte == b'"' {
            self.in_string = false;
            if let Some(raw) = self.capture.take() {
                self.expecting_key = false;
                self.record_key(raw);
            }
            return;
        }
        if let Some(capture) = self.capture.as_mut() {
            capture.push(byte);
        }
    }

    fn record_key(&mut self, raw: Vec<u8>) {
        self.summary.count += 1;
        let Ok(key) = String::from_utf8(raw) else {
            return;
        };
        let smaller = match &self.summary.smallest_key {
            Some(smallest) => key < *smallest,
            None => true,
        };
        if smaller {
            self.summary.smallest_key = Some(key.clone());
        }
        if self.summary.first_key.is_none() {
            self.summary.first_key = Some(key);
        }
    }

    /// Summary of the scanned document, or `None` if it ended mid-structure.
    pub fn finish(self) -> Option<ChildSummary> {
        if self.depth != 0 || self.in_string {
            return None;
        }
        Some(self.summary)
    }
}

impl BodySink for ShallowKeyScanner {
    fn write(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        self.push(bytes);
        Ok(())
    }
}

/// Value of a top-level string field, escapes left as-is.
pub fn string_field<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let bytes = body.as_bytes();
    let mut depth = 0u32;
    let mut i = 0;
    let mut pending_key: Option<&str> = None;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let start = i + 1;
                let end = string_end(bytes, start)?;
                let text = &body[start..end];
                i = end + 1;
                if depth != 1 {
                    continue;
                }
                match pending_key.take() {
                    Some(key) if key == name => return Some(text),
                    Some(_) => {}
                    None => {
                        // A key is only a key when followed by ':'
                        let rest = body[i..].trim_start();
                        if rest.starts_with(':') {
                            pending_key = Some(text);
                        }
                    }
                }
                continue;
            }
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth = depth.saturating_sub(1),
            b':' | b' ' | b'\t' | b'\r' | b'\n' => {}
            _ => {
                // Non-string value for the pending key
                if depth == 1 {
                    pending_key = None;
                }
            }
        }
        if bytes[i] == b'{' || bytes[i] == b'[' {
            pending_key = None;
        }
        i += 1;
    }
    None
}

/// Index of the closing quote of a string starting at `start`
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Render a reading value as a JSON number with one decimal
pub fn number(value: f32) -> heapless::String<24> {
    let mut out = heapless::String::new();
    let _ = write!(out, "{:.1}", value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(chunks: &[&str]) -> Option<ChildSummary> {
        let mut scanner = ShallowKeyScanner::new();
        for chunk in chunks {
            scanner.push(chunk.as_bytes());
        }
        scanner.finish()
    }

    #[test]
    fn test_shallow_listing() {
        let summary = scan(&[
            "{\"2024-05-02T10:00:00\":true,",
            "\"2024-05-01T09:",
            "00:00\":true, \"2024-05-03T08:00:00\" : true}",
        ])
        .unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.first_key.as_deref(), Some("2024-05-02T10:00:00"));
        assert_eq!(summary.smallest_key.as_deref(), Some("2024-05-01T09:00:00"));
    }

    #[test]
    fn test_nested_values_are_skipped() {
        let summary = scan(&[
            r#"{"b":{"Moisture":40.0,"Temperature":15.0,"x":["\"}",{"y":1}]},"a":{"Moisture":1}}"#,
        ])
        .unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.first_key.as_deref(), Some("b"));
        assert_eq!(summary.smallest_key.as_deref(), Some("a"));
    }

    #[test]
    fn test_null_means_empty() {
        assert_eq!(scan(&["null"]), Some(ChildSummary::default()));
    }

    #[test]
    fn test_string_values_are_not_keys() {
        let summary = scan(&[r#"{"k1":"v1","k2":"v2"}"#]).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.smallest_key.as_deref(), Some("k1"));
    }

    #[test]
    fn test_truncated_document() {
        assert_eq!(scan(&["{\"a\":true,\"b"]), None);
    }

    #[test]
    fn test_string_field() {
        let body = r#"{
          "kind": "identitytoolkit#SignupNewUserResponse",
          "idToken": "eyJhbGciOi.abc-_123",
          "refreshToken": "AMf-vBx",
          "expiresIn": "3600",
          "localId": "Zx9"
        }"#;
        assert_eq!(string_field(body, "idToken"), Some("eyJhbGciOi.abc-_123"));
        assert_eq!(string_field(body, "expiresIn"), Some("3600"));
        assert_eq!(string_field(body, "missing"), None);
    }

    #[test]
    fn test_string_field_ignores_nested_and_values() {
        let body = r#"{"error":{"idToken":"nested"},"note":"idToken","n":5,"idToken":"top"}"#;
        assert_eq!(string_field(body, "idToken"), Some("top"));
    }

    #[test]
    fn test_number_format() {
        assert_eq!(number(40.0).as_str(), "40.0");
        assert_eq!(number(15.26).as_str(), "15.3");
        assert_eq!(number(1000.0).as_str(), "1000.0");
    }
}
