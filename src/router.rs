//! Protocol router and its builder.
//!
//! The [`ProtocolRouter`] owns the listener and the tool registry:
//! 1. Bind the loopback listener
//! 2. Accept one remote debugger at a time
//! 3. Dispatch each parsed message to the tool named by its `Tool` header
//! 4. Broadcast disconnects to every registered tool
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use devtools_remote::router::ProtocolRouter;
//! use devtools_remote::services::{DevToolsRemoteService, InMemoryBrowser};
//!
//! #[tokio::main]
//! async fn main() -> devtools_remote::Result<()> {
//!     let browser = Arc::new(InMemoryBrowser::new());
//!     let builder = ProtocolRouter::builder().port(9222);
//!     let devtools = DevToolsRemoteService::new(builder.sender(), browser.clone());
//!
//!     let router = builder.tool(Arc::new(devtools)).start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     router.stop();
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{ConnectionPolicy, ServerConfig};
use crate::error::{DevToolsError, Result};
use crate::handler::{ToolHandler, ToolRegistry};
use crate::protocol::WireMessage;
use crate::transport::{ConnectionDelegate, ConnectionListener, MessageSender};

/// A tool that knows the name it registers under.
pub trait NamedTool: ToolHandler {
    /// Value of the `Tool` header this handler serves.
    fn tool_name(&self) -> &str;
}

/// Builder for configuring and starting a [`ProtocolRouter`].
pub struct ProtocolRouterBuilder {
    config: ServerConfig,
    sender: MessageSender,
    tools: Vec<(String, Arc<dyn ToolHandler>)>,
}

impl ProtocolRouterBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            sender: MessageSender::new(),
            tools: Vec::new(),
        }
    }

    /// Replace the whole server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the listening port. `0` picks an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set what happens to a second client.
    pub fn connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.config.connection_policy = policy;
        self
    }

    /// Sender that the started router will use.
    ///
    /// Services need it at construction to send replies and events.
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Register a handler under an explicit tool name.
    pub fn handler(mut self, tool: &str, handler: Arc<dyn ToolHandler>) -> Self {
        self.tools.push((tool.to_string(), handler));
        self
    }

    /// Register a handler under its own tool name.
    pub fn tool<T: NamedTool>(self, tool: Arc<T>) -> Self {
        let name = tool.tool_name().to_string();
        self.handler(&name, tool)
    }

    /// Build the router, register the tools and start listening.
    pub async fn start(self) -> Result<ProtocolRouter> {
        let router = ProtocolRouter::with_sender(self.config, self.sender);
        for (tool, handler) in self.tools {
            router.register_destination(handler, &tool)?;
        }
        router.start().await?;
        Ok(router)
    }
}

impl Default for ProtocolRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared with the listener's connection tasks.
struct RouterCore {
    registry: Mutex<ToolRegistry>,
}

impl RouterCore {
    fn registry(&self) -> MutexGuard<'_, ToolRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConnectionDelegate for RouterCore {
    fn on_message(&self, message: WireMessage) {
        match self.registry().dispatch(message) {
            Ok(()) => {}
            Err(DevToolsError::UnknownTool(tool)) => {
                tracing::error!("No handler registered for tool {:?}, dropping message", tool);
            }
            Err(e) => {
                tracing::error!("Failed to dispatch message: {}", e);
            }
        }
    }

    fn on_connection_lost(&self) {
        self.registry().broadcast_connection_lost();
    }
}

/// Dispatches remote debugger messages to tool handlers.
///
/// Registration spawns a task per tool, so it must happen inside a Tokio
/// runtime.
pub struct ProtocolRouter {
    config: ServerConfig,
    sender: MessageSender,
    core: Arc<RouterCore>,
    listener: Mutex<Option<ConnectionListener>>,
}

impl ProtocolRouter {
    /// Create a router builder.
    pub fn builder() -> ProtocolRouterBuilder {
        ProtocolRouterBuilder::new()
    }

    /// Create a stopped router with no tools.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_sender(config, MessageSender::new())
    }

    fn with_sender(config: ServerConfig, sender: MessageSender) -> Self {
        Self {
            config,
            sender,
            core: Arc::new(RouterCore {
                registry: Mutex::new(ToolRegistry::new()),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Route messages for `tool` to `handler`.
    ///
    /// # Errors
    ///
    /// `ToolAlreadyRegistered` if another handler serves `tool`.
    pub fn register_destination(&self, handler: Arc<dyn ToolHandler>, tool: &str) -> Result<()> {
        self.core.registry().register(tool, handler)
    }

    /// Stop routing messages for `tool`.
    ///
    /// # Errors
    ///
    /// `HandlerMismatch` if `handler` is not the registered instance,
    /// `UnknownTool` if nothing is registered.
    pub fn unregister_destination(&self, handler: &Arc<dyn ToolHandler>, tool: &str) -> Result<()> {
        self.core.registry().unregister(tool, handler)
    }

    /// Whether a handler serves `tool`.
    pub fn is_registered(&self, tool: &str) -> bool {
        self.core.registry().contains(tool)
    }

    /// Registered tool names, sorted.
    pub fn tools(&self) -> Vec<String> {
        self.core.registry().tools()
    }

    /// Handle for sending to the connected remote debugger.
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Send a message to the connected remote debugger, if any.
    pub async fn send(&self, message: WireMessage) -> Result<()> {
        self.sender.send(message).await
    }

    /// Dispatch a message as if it arrived on the connection.
    pub fn handle_message(&self, message: WireMessage) {
        self.core.on_message(message);
    }

    /// Tell every registered tool the connection was lost.
    pub fn on_connection_lost(&self) {
        self.core.on_connection_lost();
    }

    /// Bind and start accepting remote debuggers.
    ///
    /// Starting a running router returns the bound address again.
    ///
    /// # Errors
    ///
    /// `Config` for invalid settings, `Bind` if the port is taken.
    pub async fn start(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }
        self.config.validate()?;

        let delegate: Arc<dyn ConnectionDelegate> = self.core.clone();
        let listener = ConnectionListener::listen(
            self.config.bind_address,
            self.config.port,
            self.sender.clone(),
            delegate,
            self.config.listener_options(),
        )
        .await?;

        let addr = listener.local_addr();
        let mut slot = self.listener();
        if let Some(existing) = slot.as_ref() {
            // Lost a race with a concurrent start; keep the first listener.
            listener.shutdown();
            return Ok(existing.local_addr());
        }
        *slot = Some(listener);
        Ok(addr)
    }

    /// Stop listening, close the connection and clear all registrations.
    ///
    /// Events already queued to a tool still run. Safe to call at any
    /// time, any number of times.
    pub fn stop(&self) {
        if let Some(listener) = self.listener().take() {
            listener.shutdown();
            tracing::info!("Remote debugging listener on {} stopped", listener.local_addr());
        }
        self.core.registry().clear();
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener().as_ref().map(ConnectionListener::local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.listener().is_some()
    }

    fn listener(&self) -> MutexGuard<'_, Option<ConnectionListener>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ProtocolRouter {
    fn drop(&mut self) {
        self.stop();
    }
}
