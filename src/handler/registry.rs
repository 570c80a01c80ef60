//! Tool registry for dispatching messages by tool name.
//!
//! Each registration owns an unbounded queue drained by a spawned task, the
//! handler's execution context. Posting never blocks, and events for a
//! single tool are handled strictly in the order they were posted.
//!
//! Registering spawns onto the current Tokio runtime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::ToolHandler;
use crate::error::{DevToolsError, Result};
use crate::protocol::WireMessage;

/// Work posted to a handler's task.
#[derive(Debug)]
pub enum ToolEvent {
    Message(WireMessage),
    ConnectionLost,
}

struct Registration {
    handler: Arc<dyn ToolHandler>,
    queue: mpsc::UnboundedSender<ToolEvent>,
}

/// Registry mapping tool names to handlers.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Registration>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `tool` and start its task.
    ///
    /// # Errors
    ///
    /// `ToolAlreadyRegistered` if the name is taken; the existing
    /// registration is left untouched.
    pub fn register(&mut self, tool: &str, handler: Arc<dyn ToolHandler>) -> Result<()> {
        if self.tools.contains_key(tool) {
            return Err(DevToolsError::ToolAlreadyRegistered(tool.to_string()));
        }

        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_tool(tool.to_string(), handler.clone(), rx));

        self.tools
            .insert(tool.to_string(), Registration { handler, queue });
        tracing::debug!("Registered tool {}", tool);
        Ok(())
    }

    /// Remove the registration of `tool`.
    ///
    /// Events already posted are still handled.
    ///
    /// # Errors
    ///
    /// `UnknownTool` if nothing is registered, `HandlerMismatch` if a
    /// different handler instance is registered under that name.
    pub fn unregister(&mut self, tool: &str, handler: &Arc<dyn ToolHandler>) -> Result<()> {
        let registered = self
            .tools
            .get(tool)
            .ok_or_else(|| DevToolsError::UnknownTool(tool.to_string()))?;

        if !same_handler(&registered.handler, handler) {
            return Err(DevToolsError::HandlerMismatch(tool.to_string()));
        }

        self.tools.remove(tool);
        tracing::debug!("Unregistered tool {}", tool);
        Ok(())
    }

    /// Check whether a handler is registered for `tool`.
    pub fn contains(&self, tool: &str) -> bool {
        self.tools.contains_key(tool)
    }

    /// Registered tool names, sorted.
    pub fn tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Post a message to the handler named by its `Tool` header.
    ///
    /// # Errors
    ///
    /// `UnknownTool` when no handler is registered for it.
    pub fn dispatch(&self, message: WireMessage) -> Result<()> {
        let registration = self
            .tools
            .get(message.tool())
            .ok_or_else(|| DevToolsError::UnknownTool(message.tool().to_string()))?;

        registration
            .queue
            .send(ToolEvent::Message(message))
            .map_err(|_| DevToolsError::ConnectionClosed)
    }

    /// Tell every registered handler the connection was lost.
    pub fn broadcast_connection_lost(&self) {
        for (tool, registration) in &self.tools {
            if registration.queue.send(ToolEvent::ConnectionLost).is_err() {
                tracing::warn!("Tool {} task is gone", tool);
            }
        }
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.tools.clear();
    }
}

fn same_handler(a: &Arc<dyn ToolHandler>, b: &Arc<dyn ToolHandler>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Handler execution context: drain the queue one event at a time.
async fn run_tool(
    tool: String,
    handler: Arc<dyn ToolHandler>,
    mut rx: mpsc::UnboundedReceiver<ToolEvent>,
) {
    while let Some(event) = rx.recv().await {
        let result = match event {
            ToolEvent::Message(message) => handler.handle_message(message).await,
            ToolEvent::ConnectionLost => handler.on_connection_lost().await,
        };

        if let Err(e) = result {
            tracing::error!("Handler error for tool {}: {}", tool, e);
        }
    }
    tracing::trace!("Tool {} task finished", tool);
}
