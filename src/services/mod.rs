//! Services module - the tools served over the remote debugging protocol.
//!
//! Provides:
//! - [`DevToolsRemoteService`] - `DevToolsService`: ping, version, tab listing
//! - [`DebuggerRemoteService`] - `V8Debugger`: per-tab debugger sessions
//! - [`InMemoryBrowser`] - in-process tab and debugger state
//!
//! The browser itself stays behind [`TabRegistry`] and [`DebuggerBackend`].

pub mod debugger;
pub mod devtools;
mod memory;

pub use debugger::DebuggerRemoteService;
pub use devtools::DevToolsRemoteService;
pub use memory::InMemoryBrowser;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::protocol::{WireMessage, DESTINATION, TOOL};

/// Browser-assigned tab identifier.
pub type TabId = i32;

/// A tab that a remote debugger may inspect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

/// Access to the browser's tabs.
pub trait TabRegistry: Send + Sync + 'static {
    /// Tabs with a committed navigation entry, ordered by id.
    fn inspectable_tabs(&self) -> Vec<TabInfo>;

    /// Whether a tab with this id exists.
    fn contains_tab(&self, id: TabId) -> bool;

    /// Run a script in the tab's main frame. Fire-and-forget.
    fn evaluate_javascript(&self, id: TabId, script: &str) -> Result<()>;
}

/// Attach/detach and command forwarding for the JavaScript debugger.
pub trait DebuggerBackend: Send + Sync + 'static {
    /// Whether some debugger client already holds the tab.
    fn has_client_host(&self, id: TabId) -> bool;

    fn attach(&self, id: TabId) -> Result<()>;

    fn detach(&self, id: TabId) -> Result<()>;

    /// Hand a JSON debugger request to the tab's debugger. Its response
    /// comes back through [`DebuggerRemoteService::debugger_output`].
    fn forward_command(&self, id: TabId, command: &str) -> Result<()>;
}

/// Reply body: `{"command":..,"result":..,"data":..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Reply {
    pub command: String,
    pub result: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reply {
    pub fn new(command: &str, result: i32) -> Self {
        Self {
            command: command.to_string(),
            result,
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Wrap the reply for `tool`, addressed to `destination` when non-empty.
    pub fn into_message(self, tool: &str, destination: &str) -> Result<WireMessage> {
        let mut message = WireMessage::from_payload(JsonCodec::encode(&self)?).with_header(TOOL, tool);
        if !destination.is_empty() {
            message = message.with_header(DESTINATION, destination);
        }
        Ok(message)
    }
}

/// A decoded request: the `command` field plus the rest of the object.
pub(crate) struct Request {
    pub command: String,
    pub fields: Map<String, Value>,
}

impl Request {
    /// Decode a request payload.
    ///
    /// `None`, with a warning, when the payload is not a JSON object with a
    /// string `command`.
    pub fn parse(tool: &str, message: &WireMessage) -> Option<Self> {
        let mut fields = match JsonCodec::decode::<Value>(message.payload()) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => {
                tracing::warn!("{}: payload is not a JSON object, dropping", tool);
                return None;
            }
            Err(e) => {
                tracing::warn!("{}: malformed JSON payload, dropping: {}", tool, e);
                return None;
            }
        };

        match fields.remove("command") {
            Some(Value::String(command)) => Some(Self { command, fields }),
            _ => {
                tracing::warn!("{}: request without a command, dropping", tool);
                None
            }
        }
    }

    /// The `data` field, if present.
    pub fn data(&self) -> Option<&Value> {
        self.fields.get("data")
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_field_order() {
        let reply = Reply::new("ping", 0).with_data("ok");
        let encoded = JsonCodec::encode(&reply).unwrap();
        assert_eq!(encoded, br#"{"command":"ping","result":0,"data":"ok"}"#);
    }

    #[test]
    fn test_reply_without_data() {
        let encoded = JsonCodec::encode(&Reply::new("attach", 2)).unwrap();
        assert_eq!(encoded, br#"{"command":"attach","result":2}"#);
    }

    #[test]
    fn test_reply_headers() {
        let message = Reply::new("ping", 0).into_message("DevToolsService", "").unwrap();
        assert_eq!(message.tool(), "DevToolsService");
        assert!(!message.headers().contains_key(DESTINATION));

        let message = Reply::new("attach", 0).into_message("V8Debugger", "7").unwrap();
        assert_eq!(message.destination(), "7");
    }

    #[test]
    fn test_request_parse() {
        let message = WireMessage::from_payload(
            json!({"command": "debugger_command", "data": {"seq": 1}}).to_string(),
        );
        let request = Request::parse("T", &message).unwrap();
        assert_eq!(request.command, "debugger_command");
        assert_eq!(request.data(), Some(&json!({"seq": 1})));
    }

    #[test]
    fn test_request_rejects_non_objects() {
        for payload in [&b"[1,2]"[..], b"\"ping\"", b"not json", b"{\"command\":5}", b""] {
            let message = WireMessage::from_payload(payload);
            assert!(Request::parse("T", &message).is_none());
        }
    }
}
