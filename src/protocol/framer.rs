//! Incremental message framer.
//!
//! Turns a byte stream delivered in arbitrary chunks into [`WireMessage`]s.
//! Implements a resumable state machine so that feeding one byte at a time
//! yields exactly the same messages as feeding the whole stream at once:
//! - `Handshake`: waiting for the `ChromeDevToolsHandshake` line
//! - `Headers`: reading `name:value` lines until an empty line
//! - `Payload`: reading exactly `Content-Length` raw bytes
//! - `Invalid`: absorbing error state, nothing more is emitted
//!
//! # Example
//!
//! ```
//! use devtools_remote::protocol::{FramerEvent, MessageFramer};
//!
//! let mut framer = MessageFramer::new();
//! let events = framer.feed(b"ChromeDevToolsHandshake\r\nTool:DevToolsService\r\n\r\n");
//!
//! assert!(matches!(events[0], FramerEvent::Handshake));
//! match &events[1] {
//!     FramerEvent::Message(message) => assert_eq!(message.tool(), "DevToolsService"),
//!     other => panic!("unexpected event: {other:?}"),
//! }
//! ```

use std::collections::HashMap;

use bytes::BytesMut;

use super::wire_format::{
    parse_content_length, split_header_line, CONTENT_LENGTH, DEFAULT_MAX_PAYLOAD_SIZE, HANDSHAKE,
    MAX_HEADER_COUNT, MAX_LINE_LENGTH,
};
use super::WireMessage;

/// Output of [`MessageFramer::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramerEvent {
    /// The handshake line was accepted; the transport must echo
    /// [`HANDSHAKE_LINE`](super::HANDSHAKE_LINE) back to the peer.
    Handshake,
    /// A complete message.
    Message(WireMessage),
}

/// Observable parse state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Handshake,
    Headers,
    Payload,
    Invalid,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Handshake,
    Headers,
    Payload { remaining: usize },
    Invalid,
}

/// Per-connection parser state.
///
/// Owned by the task servicing a single socket; never shared.
pub struct MessageFramer {
    state: State,
    /// Headers collected for the message being parsed.
    headers: HashMap<String, String>,
    /// Current handshake/header line.
    field: BytesMut,
    payload: BytesMut,
    /// A `\r` ended the previous field; a directly following `\n` is swallowed.
    cr_pending: bool,
    expect_handshake: bool,
    max_payload_size: usize,
}

impl MessageFramer {
    /// Create a framer that expects the handshake line first.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a framer with a custom maximum payload size.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            state: State::Handshake,
            headers: HashMap::new(),
            field: BytesMut::with_capacity(256),
            payload: BytesMut::new(),
            cr_pending: false,
            expect_handshake: true,
            max_payload_size,
        }
    }

    /// Create a framer that starts directly in the header state.
    pub fn without_handshake() -> Self {
        let mut framer = Self::new();
        framer.expect_handshake = false;
        framer.state = State::Headers;
        framer
    }

    /// Feed raw bytes and collect every event they complete.
    ///
    /// Partial lines and payloads are kept for the next call. Protocol
    /// violations never surface as errors: a bad handshake, an oversized
    /// payload, an overlong line or too many headers move the framer to
    /// [`ParseState::Invalid`], and malformed header lines are dropped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<FramerEvent> {
        let mut events = Vec::new();
        let mut pos = 0;

        while pos < data.len() {
            if self.cr_pending {
                self.cr_pending = false;
                if data[pos] == b'\n' {
                    pos += 1;
                    continue;
                }
            }

            match self.state {
                State::Invalid => break,

                State::Payload { remaining } => {
                    let take = remaining.min(data.len() - pos);
                    self.payload.extend_from_slice(&data[pos..pos + take]);
                    pos += take;

                    if remaining == take {
                        events.push(FramerEvent::Message(self.finish_message()));
                    } else {
                        self.state = State::Payload {
                            remaining: remaining - take,
                        };
                    }
                }

                State::Handshake | State::Headers => {
                    let rest = &data[pos..];
                    let terminator = rest.iter().position(|&b| b == b'\r');

                    // Checked before buffering so read boundaries cannot matter.
                    let line_bytes = terminator.unwrap_or(rest.len());
                    if self.field.len() + line_bytes > MAX_LINE_LENGTH {
                        tracing::warn!(
                            "Line exceeds {} bytes, rejecting connection input",
                            MAX_LINE_LENGTH
                        );
                        self.invalidate();
                        break;
                    }

                    match terminator {
                        Some(end) => {
                            self.field.extend_from_slice(&rest[..end]);
                            pos += end + 1;
                            self.cr_pending = true;
                            if let Some(event) = self.end_of_field() {
                                events.push(event);
                            }
                        }
                        None => {
                            self.field.extend_from_slice(rest);
                            pos = data.len();
                        }
                    }
                }
            }
        }

        events
    }

    /// Current parse state.
    pub fn state(&self) -> ParseState {
        match self.state {
            State::Handshake => ParseState::Handshake,
            State::Headers => ParseState::Headers,
            State::Payload { .. } => ParseState::Payload,
            State::Invalid => ParseState::Invalid,
        }
    }

    /// Whether the framer reached the absorbing error state.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        matches!(self.state, State::Invalid)
    }

    /// Discard all partial data and return to the initial state.
    pub fn reset(&mut self) {
        self.headers.clear();
        self.field.clear();
        self.payload.clear();
        self.cr_pending = false;
        self.state = if self.expect_handshake {
            State::Handshake
        } else {
            State::Headers
        };
    }

    /// A `\r` terminated the current field.
    fn end_of_field(&mut self) -> Option<FramerEvent> {
        let field = self.field.split();

        match self.state {
            State::Handshake => {
                if &field[..] == HANDSHAKE.as_bytes() {
                    tracing::debug!("Handshake accepted");
                    self.state = State::Headers;
                    Some(FramerEvent::Handshake)
                } else {
                    tracing::warn!(
                        "Bad handshake line: {:?}",
                        String::from_utf8_lossy(&field)
                    );
                    self.invalidate();
                    None
                }
            }
            State::Headers if field.is_empty() => self.end_of_headers(),
            State::Headers => {
                match split_header_line(&field) {
                    Some((name, value)) => {
                        self.headers.insert(name, value);
                        if self.headers.len() > MAX_HEADER_COUNT {
                            tracing::warn!(
                                "Message carries more than {} headers, rejecting connection input",
                                MAX_HEADER_COUNT
                            );
                            self.invalidate();
                        }
                    }
                    None => {
                        tracing::debug!(
                            "Dropping header line without colon: {:?}",
                            String::from_utf8_lossy(&field)
                        );
                    }
                }
                None
            }
            State::Payload { .. } | State::Invalid => None,
        }
    }

    fn end_of_headers(&mut self) -> Option<FramerEvent> {
        let length = parse_content_length(self.headers.get(CONTENT_LENGTH).map(String::as_str));

        if length > self.max_payload_size {
            tracing::warn!(
                "Payload size {} exceeds maximum {}",
                length,
                self.max_payload_size
            );
            self.invalidate();
            return None;
        }

        if length == 0 {
            return Some(FramerEvent::Message(self.finish_message()));
        }

        self.payload.reserve(length);
        self.state = State::Payload { remaining: length };
        None
    }

    fn finish_message(&mut self) -> WireMessage {
        let headers = std::mem::take(&mut self.headers);
        let payload = self.payload.split().freeze();
        self.state = State::Headers;
        WireMessage::new(headers, payload)
    }

    fn invalidate(&mut self) {
        self.headers.clear();
        self.field.clear();
        self.payload.clear();
        self.state = State::Invalid;
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}
