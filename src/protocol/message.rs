//! Wire message: header map plus raw payload.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing between the framer,
//! the router and the writer task.
//!
//! # Example
//!
//! ```
//! use devtools_remote::protocol::WireMessage;
//!
//! let message = WireMessage::from_payload(&b"{\"command\":\"ping\"}"[..])
//!     .with_header("Tool", "DevToolsService");
//!
//! assert_eq!(message.tool(), "DevToolsService");
//! assert_eq!(message.destination(), "");
//! assert_eq!(message.content_length(), 18);
//! ```

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::wire_format::{CONTENT_LENGTH, CRLF, DESTINATION, HEADER_SEPARATOR, TOOL};

/// A complete protocol message.
///
/// Only produced by the framer once a whole message has been read, or built
/// by a tool handler for an outbound reply. Immutable once handed off.
///
/// Equality compares the payload and every header except `Content-Length`,
/// which is derived from the payload on the wire.
#[derive(Debug, Clone, Default)]
pub struct WireMessage {
    headers: HashMap<String, String>,
    payload: Bytes,
}

impl WireMessage {
    /// Create a message from a header map and payload.
    pub fn new(headers: HashMap<String, String>, payload: Bytes) -> Self {
        Self { headers, payload }
    }

    /// Create a message with no headers.
    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            headers: HashMap::new(),
            payload: payload.into(),
        }
    }

    /// Return the message with `name` set to `value`.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// All headers as received (including `Content-Length` when present).
    #[inline]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Alias of [`payload`](Self::payload).
    #[inline]
    pub fn content(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Byte length of the payload.
    #[inline]
    pub fn content_length(&self) -> usize {
        self.payload.len()
    }

    /// Header value, or `default` when absent.
    pub fn get_header<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.headers.get(name).map(String::as_str).unwrap_or(default)
    }

    /// Value of the `Tool` header, or empty.
    #[inline]
    pub fn tool(&self) -> &str {
        self.get_header(TOOL, "")
    }

    /// Value of the `Destination` header, or empty.
    #[inline]
    pub fn destination(&self) -> &str {
        self.get_header(DESTINATION, "")
    }

    /// Encode the header block (header lines plus the blank line).
    ///
    /// `Content-Length` is always written from the actual payload size;
    /// a stale `Content-Length` entry in the header map is ignored.
    pub fn encode_head(&self) -> Bytes {
        let mut head = BytesMut::with_capacity(64 + self.headers.len() * 32);
        for (name, value) in &self.headers {
            if name == CONTENT_LENGTH {
                continue;
            }
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(&[HEADER_SEPARATOR]);
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(CRLF);
        }
        head.extend_from_slice(CONTENT_LENGTH.as_bytes());
        head.extend_from_slice(&[HEADER_SEPARATOR]);
        head.extend_from_slice(self.payload.len().to_string().as_bytes());
        head.extend_from_slice(CRLF);
        head.extend_from_slice(CRLF);
        head.freeze()
    }

    /// Header block and payload for scatter/gather writes.
    pub fn encode_parts(&self) -> (Bytes, Bytes) {
        (self.encode_head(), self.payload.clone())
    }

    /// Serialize the whole message as written on the wire.
    pub fn to_wire_string(&self) -> Vec<u8> {
        let head = self.encode_head();
        let mut buf = Vec::with_capacity(head.len() + self.payload.len());
        buf.extend_from_slice(&head);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Two messages are equal when their payloads and every header except
/// `Content-Length` match. The length is derived from the payload, and a
/// received message carries it while a locally built one may not.
impl PartialEq for WireMessage {
    fn eq(&self, other: &Self) -> bool {
        if self.payload != other.payload {
            return false;
        }
        let routed = |m: &'_ WireMessage| m.headers.keys().filter(|k| *k != CONTENT_LENGTH).count();
        routed(self) == routed(other)
            && self
                .headers
                .iter()
                .filter(|(name, _)| *name != CONTENT_LENGTH)
                .all(|(name, value)| other.headers.get(name) == Some(value))
    }
}

impl Eq for WireMessage {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_accessors() {
        let message = WireMessage::from_payload(&b"hello"[..])
            .with_header("Tool", "V8Debugger")
            .with_header("Destination", "7");

        assert_eq!(message.tool(), "V8Debugger");
        assert_eq!(message.destination(), "7");
        assert_eq!(message.payload(), b"hello");
        assert_eq!(message.content(), b"hello");
        assert_eq!(message.content_length(), 5);
    }

    #[test]
    fn test_missing_headers_default_to_empty() {
        let message = WireMessage::default();
        assert_eq!(message.tool(), "");
        assert_eq!(message.destination(), "");
        assert_eq!(message.get_header("X-Custom", "fallback"), "fallback");
        assert_eq!(message.content_length(), 0);
    }

    #[test]
    fn test_headers_are_case_sensitive() {
        let message = WireMessage::default().with_header("tool", "lower");
        assert_eq!(message.tool(), "");
        assert_eq!(message.get_header("tool", ""), "lower");
    }

    #[test]
    fn test_equality_ignores_content_length() {
        let plain = WireMessage::from_payload(&b"abc"[..]).with_header("Tool", "T");
        let received = plain.clone().with_header("Content-Length", "3");
        assert_eq!(plain, received);

        let other_tool = WireMessage::from_payload(&b"abc"[..]).with_header("Tool", "U");
        assert_ne!(plain, other_tool);

        let extra_header = plain.clone().with_header("Destination", "1");
        assert_ne!(plain, extra_header);
    }

    #[test]
    fn test_payload_bytes_zero_copy() {
        let original = Bytes::from_static(b"test data");
        let message = WireMessage::new(HashMap::new(), original.clone());

        let cloned = message.payload_bytes();
        assert_eq!(cloned.as_ptr(), original.as_ptr());
    }

    #[test]
    fn test_wire_string_layout() {
        let message = WireMessage::from_payload(&b"abc"[..]).with_header("Tool", "T");
        let wire = message.to_wire_string();

        assert_eq!(wire, b"Tool:T\r\nContent-Length:3\r\n\r\nabc".to_vec());
    }

    #[test]
    fn test_wire_string_recomputes_content_length() {
        let message = WireMessage::from_payload(&b"abcdef"[..]).with_header("Content-Length", "2");
        let wire = String::from_utf8(message.to_wire_string()).unwrap();

        assert!(wire.contains("Content-Length:6\r\n"));
        assert!(!wire.contains("Content-Length:2"));
        assert!(wire.ends_with("\r\n\r\nabcdef"));
    }

    #[test]
    fn test_empty_payload_still_has_blank_line() {
        let wire = WireMessage::default().to_wire_string();
        assert_eq!(wire, b"Content-Length:0\r\n\r\n".to_vec());
    }

    #[test]
    fn test_encode_parts_matches_wire_string() {
        let message = WireMessage::from_payload(&b"payload"[..]).with_header("Destination", "3");
        let (head, payload) = message.encode_parts();

        let mut joined = head.to_vec();
        joined.extend_from_slice(&payload);
        assert_eq!(joined, message.to_wire_string());
    }
}
