//! `V8Debugger`: per-tab JavaScript debugger sessions.
//!
//! Requests carry the tab id in the `Destination` header. Each tab is either
//! detached or attached; `attach` moves it to attached, and `detach`, a
//! closed tab or a lost connection move it back.
//!
//! `debugger_command` is answered asynchronously: the backend reports the
//! debugger's response through [`DebuggerRemoteService::debugger_output`].
//! Nothing here times out a command whose response never arrives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{DebuggerBackend, Reply, Request, TabId, TabRegistry};
use crate::error::Result;
use crate::handler::{BoxFuture, HandlerResult, ToolHandler};
use crate::protocol::WireMessage;
use crate::router::NamedTool;
use crate::transport::MessageSender;

/// Tool name served by [`DebuggerRemoteService`].
pub const TOOL_NAME: &str = "V8Debugger";

pub mod result {
    pub const OK: i32 = 0;
    /// Attach to an attached tab, or a command for a detached one.
    pub const ILLEGAL_TAB_STATE: i32 = 1;
    pub const UNKNOWN_TAB: i32 = 2;
    pub const DEBUGGER_ERROR: i32 = 3;
    pub const UNKNOWN_COMMAND: i32 = 4;
}

pub mod command {
    pub const ATTACH: &str = "attach";
    pub const DETACH: &str = "detach";
    pub const DEBUGGER_COMMAND: &str = "debugger_command";
    pub const EVALUATE_JAVASCRIPT: &str = "evaluate_javascript";

    // Unprompted events.
    pub const NAVIGATED: &str = "navigated";
    pub const CLOSED: &str = "closed";
}

/// Attaches remote debuggers to tabs and relays debugger traffic.
pub struct DebuggerRemoteService {
    sender: MessageSender,
    tabs: Arc<dyn TabRegistry>,
    backend: Arc<dyn DebuggerBackend>,
    attached: Mutex<HashSet<TabId>>,
}

impl DebuggerRemoteService {
    pub fn new(
        sender: MessageSender,
        tabs: Arc<dyn TabRegistry>,
        backend: Arc<dyn DebuggerBackend>,
    ) -> Self {
        Self {
            sender,
            tabs,
            backend,
            attached: Mutex::new(HashSet::new()),
        }
    }

    /// Whether this service holds a debugger session for `tab`.
    pub fn is_attached(&self, tab: TabId) -> bool {
        self.attached().contains(&tab)
    }

    /// Attached tabs, sorted.
    pub fn attached_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = self.attached().iter().copied().collect();
        tabs.sort_unstable();
        tabs
    }

    /// Relay a debugger response for `tab` to the remote debugger.
    ///
    /// `output` is embedded as JSON when it parses, as a string otherwise.
    pub async fn debugger_output(&self, tab: TabId, output: &str) -> Result<()> {
        let data = serde_json::from_str::<Value>(output)
            .unwrap_or_else(|_| Value::String(output.to_string()));
        self.send_event(tab, Reply::new(command::DEBUGGER_COMMAND, result::OK).with_data(data))
            .await
    }

    /// Tell the remote debugger that `tab` navigated to `url`.
    pub async fn frame_navigate(&self, tab: TabId, url: &str) -> Result<()> {
        self.send_event(tab, Reply::new(command::NAVIGATED, result::OK).with_data(url))
            .await
    }

    /// Tell the remote debugger that `tab` closed, ending its session.
    pub async fn tab_closed(&self, tab: TabId) -> Result<()> {
        if !self.attached().remove(&tab) {
            tracing::debug!("{}: tab {} closed while detached", TOOL_NAME, tab);
            return Ok(());
        }
        if let Err(e) = self.backend.detach(tab) {
            tracing::debug!("{}: detach of closed tab {} failed: {}", TOOL_NAME, tab, e);
        }
        self.send(tab, Reply::new(command::CLOSED, result::OK)).await
    }

    async fn send_event(&self, tab: TabId, reply: Reply) -> Result<()> {
        if !self.is_attached(tab) {
            tracing::debug!(
                "{}: dropping {:?} event for detached tab {}",
                TOOL_NAME,
                reply.command,
                tab
            );
            return Ok(());
        }
        self.send(tab, reply).await
    }

    async fn send(&self, tab: TabId, reply: Reply) -> Result<()> {
        let message = reply.into_message(TOOL_NAME, &tab.to_string())?;
        self.sender.send(message).await
    }

    /// Run one request. `None` means no synchronous reply.
    fn execute(&self, request: &Request, destination: &str) -> Option<Reply> {
        let name = request.command.as_str();
        let code = match name {
            command::ATTACH => self.attach(destination),
            command::DETACH => self.detach(destination),
            command::DEBUGGER_COMMAND => self.forward_command(destination, request.data()),
            command::EVALUATE_JAVASCRIPT => self.evaluate(destination, request.data()),
            other => {
                tracing::debug!("{}: unknown command {:?}", TOOL_NAME, other);
                Some(result::UNKNOWN_COMMAND)
            }
        };
        code.map(|code| Reply::new(name, code))
    }

    fn attach(&self, destination: &str) -> Option<i32> {
        let Some(tab) = self.known_tab(destination) else {
            return Some(result::UNKNOWN_TAB);
        };

        let mut attached = self.attached();
        if attached.contains(&tab) || self.backend.has_client_host(tab) {
            return Some(result::ILLEGAL_TAB_STATE);
        }

        match self.backend.attach(tab) {
            Ok(()) => {
                attached.insert(tab);
                tracing::info!("{}: attached to tab {}", TOOL_NAME, tab);
                Some(result::OK)
            }
            Err(e) => {
                tracing::warn!("{}: attach to tab {} failed: {}", TOOL_NAME, tab, e);
                Some(result::DEBUGGER_ERROR)
            }
        }
    }

    fn detach(&self, destination: &str) -> Option<i32> {
        let Some(tab) = self.known_tab(destination) else {
            return Some(result::UNKNOWN_TAB);
        };

        if !self.attached().remove(&tab) {
            return Some(result::ILLEGAL_TAB_STATE);
        }

        match self.backend.detach(tab) {
            Ok(()) => {
                tracing::info!("{}: detached from tab {}", TOOL_NAME, tab);
                Some(result::OK)
            }
            Err(e) => {
                tracing::warn!("{}: detach from tab {} failed: {}", TOOL_NAME, tab, e);
                Some(result::DEBUGGER_ERROR)
            }
        }
    }

    fn forward_command(&self, destination: &str, data: Option<&Value>) -> Option<i32> {
        let Some(tab) = self.known_tab(destination) else {
            return Some(result::UNKNOWN_TAB);
        };
        if !self.is_attached(tab) {
            return Some(result::ILLEGAL_TAB_STATE);
        }

        let command = match data {
            Some(Value::String(raw)) => raw.clone(),
            Some(value) => value.to_string(),
            None => return Some(result::DEBUGGER_ERROR),
        };

        match self.backend.forward_command(tab, &command) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("{}: forwarding to tab {} failed: {}", TOOL_NAME, tab, e);
                Some(result::DEBUGGER_ERROR)
            }
        }
    }

    fn evaluate(&self, destination: &str, data: Option<&Value>) -> Option<i32> {
        let Some(tab) = self.known_tab(destination) else {
            return Some(result::UNKNOWN_TAB);
        };
        let Some(script) = data.and_then(Value::as_str) else {
            return Some(result::DEBUGGER_ERROR);
        };

        match self.tabs.evaluate_javascript(tab, script) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("{}: evaluation in tab {} failed: {}", TOOL_NAME, tab, e);
                Some(result::DEBUGGER_ERROR)
            }
        }
    }

    /// Parse a destination into a tab id the browser knows.
    fn known_tab(&self, destination: &str) -> Option<TabId> {
        destination
            .parse::<TabId>()
            .ok()
            .filter(|&tab| self.tabs.contains_tab(tab))
    }

    fn attached(&self) -> MutexGuard<'_, HashSet<TabId>> {
        self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ToolHandler for DebuggerRemoteService {
    fn handle_message(&self, message: WireMessage) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            let Some(request) = Request::parse(TOOL_NAME, &message) else {
                return Ok(());
            };
            match self.execute(&request, message.destination()) {
                Some(reply) => {
                    let reply = reply.into_message(TOOL_NAME, message.destination())?;
                    self.sender.send(reply).await
                }
                None => Ok(()),
            }
        })
    }

    fn on_connection_lost(&self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async move {
            let tabs: Vec<TabId> = self.attached().drain().collect();
            for tab in tabs {
                match self.backend.detach(tab) {
                    Ok(()) => tracing::info!("{}: detached from tab {}", TOOL_NAME, tab),
                    Err(e) => {
                        tracing::warn!("{}: detach from tab {} failed: {}", TOOL_NAME, tab, e)
                    }
                }
            }
            Ok(())
        })
    }
}

impl NamedTool for DebuggerRemoteService {
    fn tool_name(&self) -> &str {
        TOOL_NAME
    }
}
