//! Protocol module - wire format, framing, and message types.
//!
//! This module implements the text-header protocol spoken by remote debuggers:
//! - Handshake line and header constants
//! - Incremental framer for accumulating partial reads
//! - WireMessage struct with typed accessors

mod framer;
mod message;
mod wire_format;

pub use framer::{FramerEvent, MessageFramer, ParseState};
pub use message::WireMessage;
pub use wire_format::{
    parse_content_length, split_header_line, CONTENT_LENGTH, CRLF, DEFAULT_MAX_PAYLOAD_SIZE,
    DESTINATION, HANDSHAKE, HANDSHAKE_LINE, HEADER_SEPARATOR, MAX_HEADER_COUNT, MAX_LINE_LENGTH,
    TOOL,
};
