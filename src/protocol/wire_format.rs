//! Wire format constants and line-level helpers.
//!
//! A connection starts with a handshake line and then carries messages:
//! ```text
//! ChromeDevToolsHandshake\r\n            (client -> server, echoed back)
//! Tool:V8Debugger\r\n                    ┐
//! Destination:7\r\n                      │ header lines, `name:value`
//! Content-Length:18\r\n                  ┘
//! \r\n                                     end of headers
//! {"command":"ping"}                       exactly Content-Length raw bytes
//! ```
//!
//! Header names are case-sensitive and values are taken verbatim
//! (everything after the first colon).

/// Handshake literal exchanged once per connection.
pub const HANDSHAKE: &str = "ChromeDevToolsHandshake";

/// Handshake line as written on the wire (also the server's acknowledgement).
pub const HANDSHAKE_LINE: &[u8] = b"ChromeDevToolsHandshake\r\n";

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Separator between header name and value.
pub const HEADER_SEPARATOR: u8 = b':';

/// Payload length header.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Routing header naming the tool that handles the message.
pub const TOOL: &str = "Tool";

/// Target entity inside a tool, typically a decimal tab id.
pub const DESTINATION: &str = "Destination";

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Maximum length of a single handshake or header line.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Maximum number of distinct headers in one message.
pub const MAX_HEADER_COUNT: usize = 256;

/// Parse a `Content-Length` value.
///
/// Anything that is not a non-negative decimal integer counts as zero,
/// meaning "no payload".
pub fn parse_content_length(value: Option<&str>) -> usize {
    value
        .map(|v| v.trim_matches(|c: char| c.is_ascii_whitespace()))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0)
}

/// Split a header line on its first colon.
///
/// Returns `None` when the line has no colon.
pub fn split_header_line(line: &[u8]) -> Option<(String, String)> {
    let colon = line.iter().position(|&b| b == HEADER_SEPARATOR)?;
    let name = String::from_utf8_lossy(&line[..colon]).into_owned();
    let value = String::from_utf8_lossy(&line[colon + 1..]).into_owned();
    Some((name, value))
}
